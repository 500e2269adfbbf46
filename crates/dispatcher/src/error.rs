use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gas_cloud::{QueueError, StorageError};
use gas_core::error::{Classify, CoreError, ErrorClass};
use gas_db::StoreError;
use gas_events::{DecodeError, PublishError};
use gas_worker::LaunchError;
use serde_json::json;

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

/// Why a single work-queue message could not be handed to a worker.
///
/// The message is left on the queue in every case.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Undecodable submission: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid submission: {0}")]
    Invalid(#[from] CoreError),

    #[error("Failed to prepare {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download input: {0}")]
    Download(#[from] StorageError),

    #[error("Failed to launch worker: {0}")]
    Launch(#[from] LaunchError),

    #[error("Work queue error: {0}")]
    Queue(#[from] QueueError),
}

impl Classify for DispatchError {
    fn class(&self) -> ErrorClass {
        match self {
            DispatchError::Decode(_) => ErrorClass::Fatal,
            DispatchError::Invalid(e) => e.class(),
            DispatchError::Staging { .. } => ErrorClass::LocalIo,
            DispatchError::Download(e) => e.class(),
            DispatchError::Launch(e) => e.class(),
            DispatchError::Queue(e) => e.class(),
        }
    }
}

// ---------------------------------------------------------------------------
// SubmitError
// ---------------------------------------------------------------------------

/// Failure of [`submit_job`](crate::submission::submit_job).
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The record exists but the submission event was not published.
    #[error("Job {job_id} was recorded but not published: {source}")]
    Publish {
        job_id: String,
        #[source]
        source: PublishError,
    },
}

impl Classify for SubmitError {
    fn class(&self) -> ErrorClass {
        match self {
            SubmitError::Core(e) => e.class(),
            SubmitError::Store(e) => e.class(),
            SubmitError::Publish { source, .. } => source.class(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppError (monitoring routes)
// ---------------------------------------------------------------------------

/// Error type for the monitoring HTTP handlers.
///
/// Rendered as `{"error": message, "code": code}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "Internal server error".to_string(),
                    )
                }
            },
            AppError::Store(err) => {
                tracing::error!(error = %err, "Job store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Job store unavailable".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        (status, axum::Json(json!({ "error": message, "code": code }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
