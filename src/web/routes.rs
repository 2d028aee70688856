use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{ApiError, ApiResult};
use super::validation::{author_or_default, parse_id, parse_parent_id, required_text};
use super::AppState;
use crate::db::{
    get_comment, get_post, insert_comment, insert_post, list_comments_for_post, list_posts,
    Comment, NewComment, NewPost, Post,
};

/// Post and comment routes, mounted both at the root and under `/api`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts_handler).post(create_post))
        .route("/posts/:id", get(get_post_handler))
        .route("/posts/:id/comments", get(list_comments).post(create_comment))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "name": "Mini-Blog" }))
}

pub async fn unknown_route(uri: Uri) -> ApiError {
    ApiError::UnknownRoute(uri.path().to_string())
}

// ========== Posts ==========

async fn list_posts_handler(State(state): State<AppState>) -> ApiResult<Json<Vec<Post>>> {
    Ok(Json(list_posts(&state.db).await?))
}

async fn get_post_handler(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Post>> {
    let id = parse_id(&raw_id)?;
    let post = get_post(&state.db, id)
        .await?
        .ok_or(ApiError::PostNotFound(id))?;
    Ok(Json(post))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

async fn create_post(
    State(state): State<AppState>,
    body: Result<Json<CreatePostRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let Json(request) = body?;
    let new_post = NewPost {
        title: required_text("title", request.title.as_deref())?,
        content: required_text("content", request.content.as_deref())?,
    };

    let post = insert_post(&state.db, &new_post).await?;
    tracing::info!(post_id = post.id, "Created post");
    Ok((StatusCode::CREATED, Json(post)))
}

// ========== Comments ==========

async fn list_comments(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Vec<Comment>>> {
    let post_id = parse_id(&raw_id)?;
    Ok(Json(list_comments_for_post(&state.db, post_id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    author: Option<String>,
    #[serde(default, alias = "text")]
    content: Option<String>,
    #[serde(default)]
    parent_id: Option<Value>,
}

/// Create a comment, optionally as a reply.
///
/// Checks run in a fixed order so the reported error is deterministic:
/// post id shape, content, parent id shape, post existence, then the parent's
/// existence, ownership and depth.
async fn create_comment(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    body: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let post_id = parse_id(&raw_id)?;
    let Json(request) = body?;
    let content = required_text("content", request.content.as_deref())?;
    let parent_id = parse_parent_id(request.parent_id.as_ref())?;

    if get_post(&state.db, post_id).await?.is_none() {
        return Err(ApiError::PostNotFound(post_id));
    }

    if let Some(parent_id) = parent_id {
        let parent = get_comment(&state.db, parent_id)
            .await?
            .filter(|parent| parent.post_id == post_id)
            .ok_or(ApiError::ParentNotFound(parent_id))?;
        if parent.is_reply() {
            return Err(ApiError::Validation(
                "only one level of nesting allowed".to_string(),
            ));
        }
    }

    let new_comment = NewComment {
        post_id,
        parent_id,
        author: author_or_default(request.author.as_deref()),
        content,
    };
    let comment = insert_comment(&state.db, &new_comment).await?;
    tracing::info!(
        post_id,
        comment_id = comment.id,
        parent_id = ?comment.parent_id,
        "Created comment"
    );
    Ok((StatusCode::CREATED, Json(comment)))
}
