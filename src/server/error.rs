// src/server/error.rs
// Centralized error-to-response mapping for the HTTP API.
// The API speaks plain text, errors included; internal flag names never leak.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use tracing::error;

use crate::ingest::IngestError;
use crate::pipeline::PipelineError;
use crate::provider::CompletionError;

/// Standard API error: a status code and a short plain-text diagnostic.
#[derive(Debug)]
pub struct ApiError {
    pub message: String,
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a new bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::BAD_REQUEST,
        }
    }

    /// Create a new unprocessable entity error
    pub fn unprocessable_entity(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Rejected attachments map to 422 before any model call is made.
    pub fn from_ingest(err: IngestError) -> Self {
        Self::unprocessable_entity(err.to_string())
    }

    /// Upstream/pipeline failures surface as a 502 with the upstream
    /// diagnostic. Quality defects never reach this path.
    pub fn from_pipeline(err: PipelineError) -> Self {
        let message = match &err {
            PipelineError::Completion(CompletionError::Api { status, body }) => {
                format!("upstream completion error {}: {}", status, body)
            }
            other => other.to_string(),
        };
        error!("{}", message);
        Self {
            message,
            status_code: StatusCode::BAD_GATEWAY,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code, self.message).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
