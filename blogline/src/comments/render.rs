//! Recursive rendering contract for a comment forest.
//!
//! [`walk`] drives a [`CommentVisitor`] through the forest depth first, handing
//! every node its nesting depth and the controls the viewer may use on it.
//! Depth is unbounded and the walk does not recurse.

use std::fmt::Write;

use chrono::Local;

use super::{
    policy::{can_delete, can_reply},
    thread::Composer,
    tree::{CommentTree, NodeRef, Promotion},
};
use crate::models::UserId;

/// Controls shown next to a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controls {
    pub can_delete: bool,
    pub can_reply: bool,
    /// The inline reply form is open for this comment.
    pub replying: bool,
}

/// Who is looking, and at whose post.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub viewer: Option<&'a UserId>,
    pub post_owner: &'a UserId,
    pub composer: Option<&'a Composer>,
}

impl RenderContext<'_> {
    pub fn controls_for(&self, node: &NodeRef<'_>) -> Controls {
        let can_reply = can_reply(self.viewer);
        Controls {
            can_delete: can_delete(node.comment(), self.post_owner, self.viewer),
            can_reply,
            replying: can_reply && self.composer.is_some_and(|composer| composer.is_replying(node.id())),
        }
    }
}

pub trait CommentVisitor {
    /// Called before the node's replies.
    fn enter(&mut self, node: NodeRef<'_>, depth: usize, controls: Controls);

    /// Called after the node's replies.
    fn leave(&mut self, _node: NodeRef<'_>, _depth: usize) {}
}

enum Step<'a> {
    Enter(NodeRef<'a>, usize),
    Leave(NodeRef<'a>, usize),
}

pub fn walk<V: CommentVisitor>(tree: &CommentTree, context: &RenderContext<'_>, visitor: &mut V) {
    let mut stack: Vec<Step<'_>> = tree.roots().rev().map(|node| Step::Enter(node, 0)).collect();
    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(node, depth) => {
                visitor.enter(node, depth, context.controls_for(&node));
                stack.push(Step::Leave(node, depth));
                stack.extend(node.children().rev().map(|child| Step::Enter(child, depth + 1)));
            }
            Step::Leave(node, depth) => visitor.leave(node, depth),
        }
    }
}

/// Plain-text renderer: one indented block per comment.
#[derive(Debug)]
pub struct TextRenderer {
    indent: usize,
    output: String,
}

impl TextRenderer {
    pub fn new() -> Self {
        Self { indent: 2, output: String::new() }
    }

    pub fn with_indent(indent: usize) -> Self {
        Self { indent, output: String::new() }
    }

    pub fn render(tree: &CommentTree, context: &RenderContext<'_>) -> String {
        let mut renderer = Self::new();
        walk(tree, context, &mut renderer);
        renderer.finish()
    }

    pub fn finish(self) -> String {
        self.output
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommentVisitor for TextRenderer {
    fn enter(&mut self, node: NodeRef<'_>, depth: usize, controls: Controls) {
        let pad = " ".repeat(depth * self.indent);
        let comment = node.comment();
        let _ = writeln!(self.output, "{pad}#{} {}", comment.id, comment.content);
        let timestamp = comment.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        let _ = write!(self.output, "{pad}   By User: {}, at {timestamp}", comment.user_id);
        match node.promotion() {
            Some(Promotion::Orphan) => self.output.push_str(" (reply to a removed comment)"),
            Some(Promotion::BrokenCycle) => self.output.push_str(" (reply chain broken)"),
            None => {}
        }
        self.output.push('\n');

        let mut actions = Vec::new();
        if controls.can_delete {
            actions.push("[delete]");
        }
        if controls.can_reply {
            actions.push("[reply]");
        }
        if !actions.is_empty() {
            let _ = writeln!(self.output, "{pad}   {}", actions.join(" "));
        }
        if controls.replying {
            let _ = writeln!(self.output, "{pad}   > writing a reply...");
        }
    }
}
