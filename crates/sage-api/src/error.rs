//! API error handling

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sage_core::SageError;
use sage_parser::ParserError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    #[schema(example = "EMBEDDING_UNAVAILABLE")]
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

impl From<&SageError> for ApiError {
    fn from(err: &SageError) -> Self {
        let error = Self::new(err.code(), err.to_string());
        match err {
            SageError::GenerationInterrupted { partial, .. } if !partial.is_empty() => {
                error.with_details(partial.clone())
            }
            _ => error,
        }
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Sage(SageError),
    Parser(ParserError),
    BadRequest(String),
    PayloadTooLarge { limit: usize },
    Internal(String),
}

/// HTTP status for an engine error
pub fn status_for(err: &SageError) -> StatusCode {
    match err {
        SageError::NotFound { .. } => StatusCode::NOT_FOUND,
        SageError::ValidationError(_) => StatusCode::BAD_REQUEST,
        SageError::EmbeddingUnavailable(_) | SageError::LlmError(_) => StatusCode::BAD_GATEWAY,
        SageError::CorruptSnapshot(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SageError::DimensionMismatch { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Sage(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    tracing::error!("Request failed: {err}");
                }
                (status, ApiError::from(&err))
            }
            AppError::Parser(err) => match &err {
                ParserError::UnsupportedFormat(_) => (
                    StatusCode::BAD_REQUEST,
                    ApiError::new("UNSUPPORTED_FORMAT", err.to_string()),
                ),
                ParserError::IoError { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::internal_error().with_details(err.to_string()),
                ),
                other => (
                    StatusCode::BAD_REQUEST,
                    ApiError::new("PARSE_ERROR", other.to_string()),
                ),
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::PayloadTooLarge { limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ApiError::new(
                    "PAYLOAD_TOO_LARGE",
                    format!("File exceeds the {limit} byte upload limit"),
                ),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal_error().with_details(msg),
            ),
        };

        (status, Json(error)).into_response()
    }
}

impl From<SageError> for AppError {
    fn from(err: SageError) -> Self {
        AppError::Sage(err)
    }
}

impl From<ParserError> for AppError {
    fn from(err: ParserError) -> Self {
        AppError::Parser(err)
    }
}

impl AppError {
    /// Map a multipart read failure, reporting `limit` when the body was too large
    pub fn from_multipart(err: MultipartError, limit: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge { limit }
        } else {
            AppError::BadRequest(err.body_text())
        }
    }
}
