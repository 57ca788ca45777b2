//! Error types surfaced by route handlers and middleware.
//!
//! Every user-facing message is a bracketed translation key (`[[error:...]]`) so the
//! client can localize it. Handlers return `Result<_, ForumError>` and the generic
//! `IntoResponse` impl below turns the error into a JSON body with a matching status.

use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// ForumError
///
/// The failure taxonomy of the routing layer: authorization, malformed requests,
/// disabled features, upload validation and upstream (storage, collaborator) failures.
#[derive(Debug, Error)]
pub enum ForumError {
    /// The session is missing or lacks the privilege the route requires.
    #[error("[[error:no-privileges]]")]
    Forbidden,

    #[error("[[error:not-found]]")]
    NotFound,

    /// A path parameter or form field could not be parsed.
    #[error("[[error:invalid-data]]")]
    InvalidData,

    #[error("[[error:uploads-are-disabled]]")]
    UploadsDisabled,

    #[error("[[error:topic-thumbnails-are-disabled]]")]
    ThumbnailsDisabled,

    /// Carries the configured ceiling in kilobytes.
    #[error("[[error:file-too-big, {0}]]")]
    FileTooBig(u64),

    #[error("[[error:invalid-file]]")]
    InvalidFile,

    /// Carries the comma-separated list of accepted MIME types.
    #[error("[[error:invalid-image-type, {0}]]")]
    InvalidImageType(String),

    /// The storage backend refused or failed to persist a file.
    #[error("{0}")]
    Storage(String),

    /// A collaborator (forum service, controllers, renderer) failed.
    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("[[error:invalid-data]]")]
    Multipart(#[from] MultipartError),
}

impl ForumError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidData => StatusCode::BAD_REQUEST,
            // 413 once the body limit is hit, 400 for a malformed body.
            Self::Multipart(err) => err.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ForumError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Storage(err) => tracing::error!(error = %err, "storage error"),
            Self::Internal(err) => tracing::error!(error = %err, "internal error"),
            Self::Io(err) => tracing::error!(error = %err, "i/o error"),
            Self::Multipart(err) => tracing::debug!(error = %err, "malformed multipart body"),
            _ => {}
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
