use chrono::{SecondsFormat, Utc};

use super::models::{Comment, NewComment, NewPost, Post};
use super::{Database, DbError};

/// Sortable RFC 3339 timestamp with millisecond precision.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ========== Posts ==========

/// Insert a new post, returning the stored record.
pub async fn insert_post(db: &Database, post: &NewPost) -> Result<Post, DbError> {
    let created_at = now_timestamp();
    let outcome = db
        .execute(
            "INSERT INTO posts (title, content, created_at) VALUES (?, ?, ?)",
            &[
                post.title.as_str().into(),
                post.content.as_str().into(),
                created_at.as_str().into(),
            ],
        )
        .await?;

    Ok(Post {
        id: outcome.inserted_id,
        title: post.title.clone(),
        content: post.content.clone(),
        created_at,
    })
}

/// Get a post by ID.
pub async fn get_post(db: &Database, id: i64) -> Result<Option<Post>, DbError> {
    db.fetch_one(
        "SELECT id, title, content, created_at FROM posts WHERE id = ?",
        &[id.into()],
    )
    .await
}

/// All posts, newest first. Same-timestamp posts keep reverse insertion order.
pub async fn list_posts(db: &Database) -> Result<Vec<Post>, DbError> {
    db.fetch_many(
        "SELECT id, title, content, created_at FROM posts ORDER BY created_at DESC, id DESC",
        &[],
    )
    .await
}

/// Delete a post and, through the foreign key cascade, all of its comments.
///
/// Returns `false` if no post had this ID.
pub async fn delete_post(db: &Database, id: i64) -> Result<bool, DbError> {
    let outcome = db
        .execute("DELETE FROM posts WHERE id = ?", &[id.into()])
        .await?;
    Ok(outcome.rows_affected > 0)
}

// ========== Comments ==========

/// Insert a new comment, returning the stored record.
///
/// Thread shape is checked by the caller; the schema rejects cross-post
/// parents and replies to replies as a backstop.
pub async fn insert_comment(db: &Database, comment: &NewComment) -> Result<Comment, DbError> {
    let created_at = now_timestamp();
    let outcome = db
        .execute(
            r"
            INSERT INTO comments (post_id, parent_id, author, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
            &[
                comment.post_id.into(),
                comment.parent_id.into(),
                comment.author.as_str().into(),
                comment.content.as_str().into(),
                created_at.as_str().into(),
            ],
        )
        .await?;

    Ok(Comment {
        id: outcome.inserted_id,
        post_id: comment.post_id,
        parent_id: comment.parent_id,
        author: comment.author.clone(),
        content: comment.content.clone(),
        created_at,
    })
}

/// Get a comment by ID.
pub async fn get_comment(db: &Database, id: i64) -> Result<Option<Comment>, DbError> {
    db.fetch_one(
        "SELECT id, post_id, parent_id, author, content, created_at FROM comments WHERE id = ?",
        &[id.into()],
    )
    .await
}

/// Comments of a post, oldest first with ID as the tie-break.
pub async fn list_comments_for_post(db: &Database, post_id: i64) -> Result<Vec<Comment>, DbError> {
    db.fetch_many(
        r"
        SELECT id, post_id, parent_id, author, content, created_at
        FROM comments
        WHERE post_id = ?
        ORDER BY created_at ASC, id ASC
        ",
        &[post_id.into()],
    )
    .await
}

/// Delete a single comment; its direct replies go with it.
pub async fn delete_comment(db: &Database, id: i64) -> Result<bool, DbError> {
    let outcome = db
        .execute("DELETE FROM comments WHERE id = ?", &[id.into()])
        .await?;
    Ok(outcome.rows_affected > 0)
}
