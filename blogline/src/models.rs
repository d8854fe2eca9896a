//! Typed record shapes for everything that crosses the backend boundary.
//!
//! Rows arrive as untyped JSON; [`decode_rows`] turns them into these records
//! and rejects anything malformed before it reaches the comment engine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::errors::BlogError;

/// Backend-assigned post identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

/// Backend-assigned comment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub i64);

/// Identifier of an authenticated user (a UUID on hosted backends).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record type stored in a named backend table.
pub trait Record: DeserializeOwned {
    const TABLE: &'static str;
    /// Human readable name used in errors and logs.
    const ENTITY: &'static str;

    /// Invariants serde cannot express. Returns a description of the first violation.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub user_id: UserId,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Post {
    const TABLE: &'static str = "posts";
    const ENTITY: &'static str = "post";

    fn check(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err(format!("post {} has an empty title", self.id));
        }
        if self.content.trim().is_empty() {
            return Err(format!("post {} has empty content", self.id));
        }
        Ok(())
    }
}

/// Payload for inserting a post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub slug: String,
    pub user_id: UserId,
    pub image_url: Option<String>,
}

/// Fields an owner may change on an existing post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostChanges {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
    pub post_id: PostId,
    #[serde(default)]
    pub parent_comment_id: Option<CommentId>,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent_comment_id.is_none()
    }
}

impl Record for Comment {
    const TABLE: &'static str = "comments";
    const ENTITY: &'static str = "comment";

    fn check(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err(format!("comment {} has empty content", self.id));
        }
        Ok(())
    }
}

/// Payload for inserting a comment or a reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewComment {
    pub content: String,
    pub post_id: PostId,
    pub user_id: UserId,
    pub parent_comment_id: Option<CommentId>,
}

/// Columns requested when loading a post's comments.
pub const COMMENT_COLUMNS: &str = "id, content, created_at, user_id, post_id, parent_comment_id";

/// Columns requested for the feed.
pub const FEED_COLUMNS: &str = "id, title, content, slug, user_id, image_url, created_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// The signed-in identity together with its credentials handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl Session {
    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }

    /// True when the access token expires within `margin_secs` of `now`.
    /// Sessions without an expiry never expire.
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now + margin_secs)
    }
}

/// Decodes a single backend row into a typed record.
pub fn decode_row<T: Record>(row: Value) -> Result<T, BlogError> {
    let record: T = serde_json::from_value(row)
        .map_err(|err| BlogError::unexpected(format!("failed to decode {}: {err}", T::ENTITY)))?;
    record.check().map_err(BlogError::unexpected)?;
    Ok(record)
}

/// Decodes every row, failing on the first malformed one.
pub fn decode_rows<T: Record>(rows: Vec<Value>) -> Result<Vec<T>, BlogError> {
    rows.into_iter().map(decode_row).collect()
}

/// Serialises a payload into the row shape the record store accepts.
pub(crate) fn encode_row<T: Serialize>(payload: &T) -> Result<Value, BlogError> {
    serde_json::to_value(payload).map_err(|err| BlogError::unexpected(format!("failed to encode row: {err}")))
}
