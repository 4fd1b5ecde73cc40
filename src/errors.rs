use crate::services::catalog_service::CatalogError;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for errors that reach the HTTP boundary.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match &err {
            CatalogError::ImageNotFound(_) | CatalogError::TagNotFound(_) => {
                AppError::not_found(err.to_string())
            }
            CatalogError::InvalidInput(_) => AppError::bad_request(err.to_string()),
            CatalogError::StorageUnavailable(_) => {
                tracing::error!(error = %err, "object store request failed");
                AppError::new(StatusCode::BAD_GATEWAY, "object store request failed")
            }
            CatalogError::MetadataUnavailable(_) => {
                tracing::warn!(error = %err, "metadata store unavailable");
                AppError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "metadata store is not available",
                )
            }
            CatalogError::Metadata(_) => {
                tracing::error!(error = %err, "metadata store query failed");
                AppError::internal("metadata store query failed")
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}
