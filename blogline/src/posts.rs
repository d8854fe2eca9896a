//! Feed, detail lookups and post authoring.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    backend::{Backend, RecordStore, SortOrder},
    comments::{CommentThread, can_manage_post},
    config::BlogConfig,
    errors::{BackendError, BlogError, ValidationError, ValidationIssue, require_non_blank},
    models::{FEED_COLUMNS, NewPost, Post, PostChanges, Record, UserId, decode_row, decode_rows, encode_row},
    slug::{excerpt, slugify, upload_path},
};

/// An image picked for upload alongside a new post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Form input for a new post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub image: Option<ImageUpload>,
}

/// One card in the feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedItem {
    pub post: Post,
    pub excerpt: String,
    /// The viewer owns the post and gets edit/delete controls.
    pub can_manage: bool,
}

/// Limits applied while listing and authoring posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSettings {
    pub image_bucket: String,
    pub max_upload_bytes: u64,
    pub excerpt_length: usize,
}

impl Default for PostSettings {
    fn default() -> Self {
        Self::from(&BlogConfig::default())
    }
}

impl From<&BlogConfig> for PostSettings {
    fn from(config: &BlogConfig) -> Self {
        Self {
            image_bucket: config.storage.image_bucket.clone(),
            max_upload_bytes: config.storage.max_upload_bytes,
            excerpt_length: config.feed.excerpt_length,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostRepo {
    settings: PostSettings,
}

impl PostRepo {
    pub fn new(settings: PostSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PostSettings {
        &self.settings
    }

    /// All posts in arrival order, with excerpts and per-viewer controls.
    pub async fn feed<S: RecordStore>(&self, store: &S, viewer: Option<&UserId>) -> Result<Vec<FeedItem>, BlogError> {
        let rows = store
            .table(Post::TABLE)
            .select(FEED_COLUMNS)
            .order("id", SortOrder::Asc)
            .run()
            .await
            .map_err(|err| BlogError::backend("load posts", err))?;
        let posts: Vec<Post> = decode_rows(rows)?;
        Ok(posts
            .into_iter()
            .map(|post| FeedItem {
                excerpt: excerpt(&post.content, self.settings.excerpt_length),
                can_manage: can_manage_post(&post, viewer),
                post,
            })
            .collect())
    }

    /// Looks a post up by slug. Slugs are not unique; the earliest match wins.
    pub async fn find_by_slug<S: RecordStore>(&self, store: &S, slug: &str) -> Result<Post, BlogError> {
        let rows = store
            .table(Post::TABLE)
            .select("*")
            .eq("slug", slug)
            .order("id", SortOrder::Asc)
            .run()
            .await
            .map_err(|err| BlogError::backend("load post", err))?;
        if rows.len() > 1 {
            log::warn!("{} posts share slug '{slug}'; showing the first", rows.len());
        }
        let row = rows.into_iter().next().ok_or_else(|| BlogError::NotFound {
            entity: Post::ENTITY,
            key: slug.to_string(),
        })?;
        decode_row(row)
    }

    /// Loads a post and its comment section.
    pub async fn open_thread<S: RecordStore>(&self, store: &S, slug: &str) -> Result<(Post, CommentThread), BlogError> {
        let post = self.find_by_slug(store, slug).await?;
        let thread = CommentThread::load(store, &post).await?;
        Ok((post, thread))
    }

    /// Validates the draft, uploads its image if any, then inserts the post.
    ///
    /// Nothing is inserted when the upload fails.
    pub async fn create<B: Backend>(
        &self,
        backend: &B,
        viewer: Option<&UserId>,
        draft: PostDraft,
    ) -> Result<Post, BlogError> {
        let user_id = viewer.ok_or(BlogError::Unauthenticated { action: "create posts" })?;
        let title = draft.title.trim();
        let content = draft.content.trim();
        require_non_blank(&[
            ("title", title, "Title is required."),
            ("content", content, "Content is required."),
        ])?;
        let slug = slugify(title);
        if slug.is_empty() {
            return Err(ValidationError::single(
                "title",
                "validation.slug",
                "Title must contain at least one letter or digit.",
            )
            .into());
        }
        if let Some(image) = &draft.image {
            self.check_image(image)?;
        }

        let image_url = match draft.image {
            Some(image) => Some(self.upload_image(backend, image).await?),
            None => None,
        };

        let payload = NewPost {
            title: title.to_string(),
            content: content.to_string(),
            slug,
            user_id: user_id.clone(),
            image_url,
        };
        let rows = backend
            .table(Post::TABLE)
            .insert(vec![encode_row(&payload)?])
            .run()
            .await
            .map_err(|err| BlogError::backend("create post", err))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| BlogError::unexpected("no data returned from post insert"))?;
        let post: Post = decode_row(row)?;
        log::info!("post {} created with slug '{}'", post.id, post.slug);
        Ok(post)
    }

    /// Changes title and content. Only the owner may edit; the slug is kept.
    pub async fn update<S: RecordStore>(
        &self,
        store: &S,
        viewer: Option<&UserId>,
        post: &Post,
        changes: PostChanges,
    ) -> Result<Post, BlogError> {
        require_non_blank(&[
            ("title", changes.title.as_str(), "Both title and content are required!"),
            ("content", changes.content.as_str(), "Both title and content are required!"),
        ])?;
        if viewer.is_none() {
            return Err(BlogError::Unauthenticated { action: "edit posts" });
        }
        if !can_manage_post(post, viewer) {
            return Err(BlogError::Forbidden { action: "edit this post" });
        }

        let mut fields = Map::new();
        fields.insert("title".to_string(), Value::String(changes.title.trim().to_string()));
        fields.insert("content".to_string(), Value::String(changes.content.trim().to_string()));
        let rows = store
            .table(Post::TABLE)
            .update(fields)
            .eq("id", post.id.0)
            .run()
            .await
            .map_err(|err| BlogError::backend("update post", err))?;
        let row = rows.into_iter().next().ok_or_else(|| {
            BlogError::backend("update post", BackendError::forbidden(format!("post {} was not updated", post.id)))
        })?;
        let updated: Post = decode_row(row)?;
        log::info!("post {} updated", updated.id);
        Ok(updated)
    }

    /// Deletes a post the viewer owns.
    pub async fn delete<S: RecordStore>(&self, store: &S, viewer: Option<&UserId>, post: &Post) -> Result<(), BlogError> {
        if viewer.is_none() {
            return Err(BlogError::Unauthenticated { action: "delete posts" });
        }
        if !can_manage_post(post, viewer) {
            return Err(BlogError::Forbidden { action: "delete this post" });
        }
        let rows = store
            .table(Post::TABLE)
            .delete()
            .eq("id", post.id.0)
            .run()
            .await
            .map_err(|err| BlogError::backend("delete post", err))?;
        if rows.is_empty() {
            return Err(BlogError::backend(
                "delete post",
                BackendError::forbidden(format!("post {} was not deleted", post.id)),
            ));
        }
        log::info!("post {} deleted", post.id);
        Ok(())
    }

    fn check_image(&self, image: &ImageUpload) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        if !image.content_type.starts_with("image/") {
            issues.push(ValidationIssue::new("image", "validation.image_type", "Only image files are allowed."));
        }
        if image.bytes.len() as u64 > self.settings.max_upload_bytes {
            let limit_mb = self.settings.max_upload_bytes as f64 / (1024.0 * 1024.0);
            issues.push(ValidationIssue::new(
                "image",
                "validation.image_size",
                format!("File size must be under {limit_mb:.0} MB."),
            ));
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }

    async fn upload_image<B: Backend>(&self, backend: &B, image: ImageUpload) -> Result<String, BlogError> {
        let bucket = &self.settings.image_bucket;
        let path = upload_path(&image.file_name, Utc::now().timestamp_millis());
        log::debug!("uploading {} to {bucket}/{path}", image.file_name);
        backend
            .upload(bucket, &path, &image.content_type, image.bytes)
            .await
            .map_err(|err| BlogError::backend("upload image", err))?;
        backend.public_url(bucket, &path).ok_or_else(|| {
            BlogError::backend(
                "upload image",
                BackendError::new(None, "Failed to generate public URL for the uploaded image."),
            )
        })
    }
}
