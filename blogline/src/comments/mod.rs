//! Threaded comments: tree construction, ownership rules, local mutations and rendering.

pub mod policy;
pub mod render;
pub mod thread;
pub mod tree;

pub use policy::{can_delete, can_manage_post, can_reply};
pub use render::{CommentVisitor, Controls, RenderContext, TextRenderer, walk};
pub use thread::{CommentThread, Composer, comment_text};
pub use tree::{CommentNode, CommentTree, NodeRef, Promotion};
