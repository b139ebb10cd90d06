//! Structured error types with machine-readable codes
//!
//! One taxonomy for the whole service:
//! - rejected-at-entry (400/429): no side effects happened
//! - storage-fatal (500): the private write failed, surfaced loudly
//! - retrieval errors (4xx/503): queries never return partial results
//!
//! Enrichment-stage failures are *not* errors at this level; the
//! pipeline degrades them locally and they never reach a client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error response for API clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Application error types with proper categorization
#[derive(Debug)]
pub enum AppError {
    // Validation errors (400)
    InvalidInput { field: String, reason: String },
    ContentTooLarge { size: usize, max: usize },

    // Rate limiting (429)
    RateLimited { agent_id: String, retry_after_secs: u64 },

    // Not found (404)
    MemoryNotFound(String),
    LessonNotFound(String),

    // Conflict (409) - a mining run is already in flight
    MinerBusy,

    // Internal errors (500)
    StorageError(String),
    SerializationError(String),

    // Query-side failures (502/503)
    QueryFailed(String),
    ServiceUnavailable(String),

    // Generic wrapper for external errors
    Internal(anyhow::Error),
}

impl AppError {
    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::ContentTooLarge { .. } => "CONTENT_TOO_LARGE",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::MemoryNotFound(_) => "MEMORY_NOT_FOUND",
            Self::LessonNotFound(_) => "LESSON_NOT_FOUND",
            Self::MinerBusy => "MINER_BUSY",
            Self::StorageError(_) => "STORAGE_ERROR",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } | Self::ContentTooLarge { .. } => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::MemoryNotFound(_) | Self::LessonNotFound(_) => StatusCode::NOT_FOUND,
            Self::MinerBusy => StatusCode::CONFLICT,
            Self::QueryFailed(_) => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::StorageError(_) | Self::SerializationError(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput { field, reason } => {
                format!("Invalid input for field '{field}': {reason}")
            }
            Self::ContentTooLarge { size, max } => {
                format!("Content too large: {size} bytes (max: {max} bytes)")
            }
            Self::RateLimited { agent_id, retry_after_secs } => {
                format!("Rate limit exceeded for agent '{agent_id}', retry in {retry_after_secs}s")
            }
            Self::MemoryNotFound(id) => format!("Memory not found: {id}"),
            Self::LessonNotFound(id) => format!("Lesson not found: {id}"),
            Self::MinerBusy => "A lesson mining run is already in progress".to_string(),
            Self::StorageError(msg) => format!("Storage error: {msg}"),
            Self::SerializationError(msg) => format!("Serialization error: {msg}"),
            Self::QueryFailed(msg) => format!("Query failed: {msg}"),
            Self::ServiceUnavailable(msg) => format!("Service unavailable: {msg}"),
            Self::Internal(e) => format!("Internal error: {e}"),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 5xx details stay in the logs, not the response body.
        if status.is_server_error() {
            tracing::error!(code = self.code(), "request failed: {}", self.message());
        } else {
            tracing::debug!(code = self.code(), "request rejected: {}", self.message());
        }

        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.message(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

/// Extension trait for converting validation `anyhow` results into
/// field-tagged 400s at the handler boundary.
pub trait ValidationErrorExt<T> {
    fn invalid_field(self, field: &str) -> Result<T, AppError>;
}

impl<T> ValidationErrorExt<T> for anyhow::Result<T> {
    fn invalid_field(self, field: &str) -> Result<T, AppError> {
        self.map_err(|e| AppError::InvalidInput {
            field: field.to_string(),
            reason: e.to_string(),
        })
    }
}
