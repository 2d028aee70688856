use serde::{Deserialize, Serialize};

/// Author recorded when a comment is submitted without one.
pub const DEFAULT_AUTHOR: &str = "Anonymous";

/// A blog post. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// A comment on a post; `parent_id` is set for direct replies only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub author: String,
    pub content: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl Comment {
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// Input for creating a new post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
}

/// Input for creating a new comment.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub author: String,
    pub content: String,
}
