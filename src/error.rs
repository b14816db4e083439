//! Error types for the coordinator.
//!
//! Three layers:
//! - [`WorkerCallError`]: a single remote call went wrong. Always transient,
//!   always absorbed by the scheduler (retry, cooldown, fallback).
//! - [`ComputeError`]: the in-process map/reduce raised. Fatal to the job.
//! - [`GridError`]: everything that can reach an API caller.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::types::JobId;

/// Why a remote map/reduce call did not produce a usable result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerCallError {
    #[error("call timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("worker answered with HTTP {0}")]
    Status(u16),

    #[error("could not decode worker response: {0}")]
    Decode(String),
}

/// Failure of the word-count computation itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    #[error("count for `{key}` overflowed while merging partials")]
    CountOverflow { key: String },

    #[error("reduce called with no partial results")]
    NoPartials,
}

#[derive(Error, Debug)]
pub enum GridError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job already exists: {0}")]
    DuplicateJob(JobId),

    #[error("job {0} is already finished")]
    JobTerminal(JobId),

    #[error("computation failed: {0}")]
    Compute(#[from] ComputeError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GridError>;

impl GridError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::JobNotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateJob(_) | Self::JobTerminal(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GridError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}
