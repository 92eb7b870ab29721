use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub const MISSING_FIELDS_MESSAGE: &str = "Missing required fields.";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error.";
pub const PAYLOAD_TOO_LARGE_MESSAGE: &str = "Request payload is too large.";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedMediaType(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::MissingFields => {
                (StatusCode::BAD_REQUEST, MISSING_FIELDS_MESSAGE.to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::PayloadTooLarge(_) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                PAYLOAD_TOO_LARGE_MESSAGE.to_string(),
            ),
            AppError::UnsupportedMediaType(content_type) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("Unsupported content type: {}", content_type),
            ),
            // Detail stays in the server log.
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "An unhandled server error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR_MESSAGE.to_string(),
                )
            }
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl AppError {
    /// Map an extractor failure by the status axum assigned to it, so the body
    /// limit surfaces as 413 however the body was framed.
    fn from_rejection(status: StatusCode, detail: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(detail)
        } else if status.is_client_error() {
            AppError::BadRequest(detail)
        } else {
            AppError::Internal(detail)
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::from_rejection(
            err.status(),
            format!("Invalid multipart body: {}", err.body_text()),
        )
    }
}

impl From<MultipartRejection> for AppError {
    fn from(err: MultipartRejection) -> Self {
        AppError::from_rejection(err.status(), err.body_text())
    }
}

impl From<BytesRejection> for AppError {
    fn from(err: BytesRejection) -> Self {
        AppError::from_rejection(err.status(), err.body_text())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
