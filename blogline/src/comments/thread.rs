//! Local state of one post's comment section and the mutations on it.
//!
//! Mutations are confirmed before they touch local state: a comment is
//! appended only once the backend returns its canonical row, and removed only
//! once the backend reports the delete. Failures leave everything untouched.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{
    policy::can_delete,
    render::{CommentVisitor, RenderContext, walk},
    tree::CommentTree,
};
use crate::{
    backend::{RecordStore, SortOrder},
    errors::{BackendError, BlogError, ValidationError},
    models::{
        COMMENT_COLUMNS, Comment, CommentId, NewComment, Post, PostId, Record, UserId, decode_row, decode_rows,
        encode_row,
    },
};

/// Trimmed comment text, or the validation error for a blank submission.
pub fn comment_text(text: &str) -> Result<&str, BlogError> {
    let content = text.trim();
    if content.is_empty() {
        return Err(ValidationError::single("content", "validation.required", "Comment cannot be empty.").into());
    }
    Ok(content)
}

/// Drafts held by the comment section: the top-level box plus any open reply forms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    draft: String,
    replies: BTreeMap<CommentId, String>,
}

impl Composer {
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Opens or closes the reply form under `id`. Returns whether it is now open.
    pub fn toggle_reply(&mut self, id: CommentId) -> bool {
        if self.replies.remove(&id).is_some() {
            false
        } else {
            self.replies.insert(id, String::new());
            true
        }
    }

    /// Sets the reply draft under `id`, opening the form if needed.
    pub fn set_reply_draft(&mut self, id: CommentId, text: impl Into<String>) {
        self.replies.insert(id, text.into());
    }

    pub fn is_replying(&self, id: CommentId) -> bool {
        self.replies.contains_key(&id)
    }

    pub fn reply_draft(&self, id: CommentId) -> Option<&str> {
        self.replies.get(&id).map(String::as_str)
    }

    pub fn open_replies(&self) -> impl Iterator<Item = CommentId> + '_ {
        self.replies.keys().copied()
    }

    fn clear(&mut self, target: Option<CommentId>) {
        match target {
            Some(id) => {
                self.replies.remove(&id);
            }
            None => self.draft.clear(),
        }
    }
}

/// The comment section of one post.
#[derive(Debug, Clone)]
pub struct CommentThread {
    post_id: PostId,
    post_owner: UserId,
    comments: Vec<Comment>,
    tree: CommentTree,
    composer: Composer,
}

impl CommentThread {
    /// Wraps an already loaded list. Comments of other posts are dropped.
    pub fn new(post: &Post, comments: Vec<Comment>) -> Self {
        let total = comments.len();
        let comments: Vec<Comment> = comments.into_iter().filter(|c| c.post_id == post.id).collect();
        if comments.len() != total {
            log::warn!("dropped {} comment(s) not belonging to post {}", total - comments.len(), post.id);
        }
        let tree = CommentTree::build(&comments);
        Self {
            post_id: post.id,
            post_owner: post.user_id.clone(),
            comments,
            tree,
            composer: Composer::default(),
        }
    }

    /// Fetches the post's comments in arrival order.
    pub async fn load<S: RecordStore>(store: &S, post: &Post) -> Result<Self, BlogError> {
        let comments = fetch_comments(store, post.id).await?;
        Ok(Self::new(post, comments))
    }

    /// Replaces the local list with a fresh copy from the backend.
    pub async fn refresh<S: RecordStore>(&mut self, store: &S) -> Result<(), BlogError> {
        self.comments = fetch_comments(store, self.post_id).await?;
        self.rebuild();
        Ok(())
    }

    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub fn post_owner(&self) -> &UserId {
        &self.post_owner
    }

    /// The flat list in arrival order.
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn tree(&self) -> &CommentTree {
        &self.tree
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn find(&self, id: CommentId) -> Option<&Comment> {
        self.comments.iter().find(|comment| comment.id == id)
    }

    pub fn can_delete(&self, id: CommentId, viewer: Option<&UserId>) -> bool {
        self.find(id)
            .is_some_and(|comment| can_delete(comment, &self.post_owner, viewer))
    }

    pub fn render<V: CommentVisitor>(&self, viewer: Option<&UserId>, visitor: &mut V) {
        let context = RenderContext {
            viewer,
            post_owner: &self.post_owner,
            composer: Some(&self.composer),
        };
        walk(&self.tree, &context, visitor);
    }

    /// Submits the top-level draft.
    pub async fn submit_comment<S: RecordStore>(
        &mut self,
        store: &S,
        viewer: Option<&UserId>,
    ) -> Result<&Comment, BlogError> {
        let text = self.composer.draft.clone();
        self.post_comment(store, viewer, &text, None).await
    }

    /// Submits the reply draft open under `parent`.
    pub async fn submit_reply<S: RecordStore>(
        &mut self,
        store: &S,
        viewer: Option<&UserId>,
        parent: CommentId,
    ) -> Result<&Comment, BlogError> {
        let text = self.composer.reply_draft(parent).unwrap_or_default().to_string();
        self.post_comment(store, viewer, &text, Some(parent)).await
    }

    /// Creates a comment (or a reply when `parent` is set) and appends the
    /// backend's canonical row to the thread.
    pub async fn post_comment<S: RecordStore>(
        &mut self,
        store: &S,
        viewer: Option<&UserId>,
        text: &str,
        parent: Option<CommentId>,
    ) -> Result<&Comment, BlogError> {
        let content = comment_text(text)?;
        let user_id = viewer.ok_or(BlogError::Unauthenticated { action: "comment" })?;
        if let Some(parent) = parent
            && self.find(parent).is_none()
        {
            return Err(BlogError::NotFound {
                entity: Comment::ENTITY,
                key: parent.to_string(),
            });
        }

        let payload = NewComment {
            content: content.to_string(),
            post_id: self.post_id,
            user_id: user_id.clone(),
            parent_comment_id: parent,
        };
        let operation = if parent.is_some() { "add reply" } else { "add comment" };
        let rows = store
            .table(Comment::TABLE)
            .insert(vec![encode_row(&payload)?])
            .run()
            .await
            .map_err(|err| BlogError::backend(operation, err))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| BlogError::unexpected("no data returned from comment insert"))?;
        let created: Comment = decode_row(row)?;
        if created.post_id != self.post_id {
            return Err(BlogError::unexpected(format!(
                "backend returned comment {} for post {} instead of {}",
                created.id, created.post_id, self.post_id
            )));
        }

        log::info!("comment {} added to post {}", created.id, self.post_id);
        let position = self.comments.len();
        self.comments.push(created);
        self.rebuild();
        self.composer.clear(parent);
        Ok(&self.comments[position])
    }

    /// Deletes one comment. Replies are left in place; the tree promotes them.
    pub async fn delete_comment<S: RecordStore>(
        &mut self,
        store: &S,
        viewer: Option<&UserId>,
        id: CommentId,
    ) -> Result<Comment, BlogError> {
        if viewer.is_none() {
            return Err(BlogError::Unauthenticated { action: "delete comments" });
        }
        let Some(position) = self.comments.iter().position(|comment| comment.id == id) else {
            return Err(BlogError::NotFound {
                entity: Comment::ENTITY,
                key: id.to_string(),
            });
        };
        if !can_delete(&self.comments[position], &self.post_owner, viewer) {
            return Err(BlogError::Forbidden { action: "delete this comment" });
        }

        let deleted = store
            .table(Comment::TABLE)
            .delete()
            .eq("id", id.0)
            .run()
            .await
            .map_err(|err| BlogError::backend("delete comment", err))?;
        if deleted.is_empty() {
            return Err(BlogError::backend(
                "delete comment",
                BackendError::forbidden(format!("comment {id} was not deleted")),
            ));
        }

        log::info!("comment {id} deleted from post {}", self.post_id);
        let removed = self.comments.remove(position);
        self.composer.clear(Some(id));
        self.rebuild();
        Ok(removed)
    }

    fn rebuild(&mut self) {
        self.tree = CommentTree::build(&self.comments);
    }
}

async fn fetch_comments<S: RecordStore>(store: &S, post_id: PostId) -> Result<Vec<Comment>, BlogError> {
    let rows: Vec<Value> = store
        .table(Comment::TABLE)
        .select(COMMENT_COLUMNS)
        .eq("post_id", post_id.0)
        .order("id", SortOrder::Asc)
        .run()
        .await
        .map_err(|err| BlogError::backend("load comments", err))?;
    decode_rows(rows)
}
