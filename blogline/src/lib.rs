//! Blogline core library.
//!
//! Posts, threaded comments and sessions on top of a hosted auth + records +
//! storage backend. The comment engine ([`comments`]) turns a post's flat
//! comment list into a reply forest, decides which controls a viewer gets and
//! keeps local state in step with confirmed backend mutations.

pub mod backend;
pub mod comments;
pub mod config;
pub mod errors;
pub mod models;
pub mod posts;
pub mod session;
pub mod slug;

pub use backend::{
    AuthApi, AuthEvent, Backend, BlobStorage, CommentDeletePolicy, HostedBackend, HostedConfig, MemoryBackend,
    RecordCommand, RecordStore, SortOrder, Subscription,
};
pub use comments::{CommentNode, CommentThread, CommentTree, CommentVisitor, Controls, TextRenderer};
pub use config::{BlogConfig, ConfigError};
pub use errors::{BackendError, BlogError, ValidationError, ValidationIssue};
pub use models::{Comment, CommentId, NewComment, NewPost, Post, PostChanges, PostId, Session, User, UserId};
pub use posts::{FeedItem, ImageUpload, PostDraft, PostRepo, PostSettings};
pub use session::{Credentials, SessionProvider, SignUpOutcome};
