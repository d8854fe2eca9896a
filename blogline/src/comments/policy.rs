//! Ownership predicates shared by rendering and mutation paths.
//!
//! These are advisory: the backend re-checks every mutation and its answer wins.

use crate::models::{Comment, Post, UserId};

/// The comment's author or the post's author may delete a comment.
pub fn can_delete(comment: &Comment, post_owner: &UserId, viewer: Option<&UserId>) -> bool {
    viewer.is_some_and(|viewer| *viewer == comment.user_id || viewer == post_owner)
}

/// Any signed-in user may reply to any comment.
pub fn can_reply(viewer: Option<&UserId>) -> bool {
    viewer.is_some()
}

/// Only the author may edit or delete a post.
pub fn can_manage_post(post: &Post, viewer: Option<&UserId>) -> bool {
    viewer.is_some_and(|viewer| *viewer == post.user_id)
}
