use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;

pub type ApiResult<T, E = ApiError> = std::result::Result<T, E>;

/// Every way a request can fail, each with a stable wire code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("identifier must be an integer, got {0:?}")]
    BadId(String),
    #[error("{0}")]
    Validation(String),
    #[error("request body rejected: {0}")]
    MalformedBody(#[from] JsonRejection),
    #[error("parent_id must be an integer")]
    BadParentId,
    #[error("post {0} not found")]
    PostNotFound(i64),
    #[error("parent comment {0} not found on this post")]
    ParentNotFound(i64),
    #[error("no route for {0}")]
    UnknownRoute(String),
    #[error(transparent)]
    Database(#[from] DbError),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadId(_) | Self::Validation(_) | Self::MalformedBody(_) | Self::BadParentId => {
                StatusCode::BAD_REQUEST
            }
            Self::PostNotFound(_) | Self::ParentNotFound(_) | Self::UnknownRoute(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadId(_) => "BAD_ID",
            Self::Validation(_) | Self::MalformedBody(_) => "VALIDATION_ERROR",
            Self::BadParentId => "BAD_PARENT_ID",
            Self::PostNotFound(_) => "POST_NOT_FOUND",
            Self::ParentNotFound(_) => "PARENT_NOT_FOUND",
            Self::UnknownRoute(_) => "NOT_FOUND",
            Self::Database(_) => "DB_ERROR",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if let Self::Database(err) = &self {
            tracing::error!(error = %err, "Database error while handling request");
            "database error".to_string()
        } else {
            tracing::debug!(error = %self, %status, "Rejecting request");
            self.to_string()
        };

        let body = ErrorBody {
            error: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
