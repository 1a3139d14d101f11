//! API error type and HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use shelf_core::Error as CoreError;
use shelf_metadata::MetadataError;
use shelf_storage::StorageError;
use thiserror::Error;

/// Errors returned by API handlers.
///
/// Inner crate errors carry their own failure detail; the mapping below
/// decides which of them are the client's fault.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("insufficient storage: {0}")]
    InsufficientStorage(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ApiError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::InsufficientStorage(_) => "insufficient_storage",
            Self::Internal(_) => "internal_error",
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => "not_found",
                StorageError::InvalidKey(_) | StorageError::InvalidCursor(_) => "bad_request",
                _ => "storage_error",
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => "not_found",
                MetadataError::AlreadyExists(_) => "conflict",
                MetadataError::InvalidStateTransition { .. } => "conflict",
                _ => "metadata_error",
            },
            Self::Core(e) => match e {
                CoreError::Validation(_) | CoreError::InvalidState(_) => "bad_request",
                CoreError::InvalidTransition { .. } => "conflict",
                CoreError::Config(_) => "internal_error",
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InsufficientStorage(_) => StatusCode::INSUFFICIENT_STORAGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::InvalidKey(_) | StorageError::InvalidCursor(_) => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                MetadataError::AlreadyExists(_)
                | MetadataError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(e) => match e {
                CoreError::Validation(_) | CoreError::InvalidState(_) => StatusCode::BAD_REQUEST,
                CoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
                CoreError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_not_found_maps_to_404() {
        let e = ApiError::from(StorageError::NotFound("covers/1.jpg".into()));
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(e.code(), "not_found");

        let e = ApiError::from(MetadataError::NotFound("book 1".into()));
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_400_and_transition_to_409() {
        let e = ApiError::from(CoreError::Validation("title must not be empty".into()));
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);

        let e = ApiError::from(CoreError::InvalidTransition {
            from: "purging".into(),
            to: "normal".into(),
        });
        assert_eq!(e.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn oversized_upload_maps_to_413() {
        let e = ApiError::PayloadTooLarge("source exceeds 200 MiB".into());
        assert_eq!(e.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
