//! Job dispatch for the annotation pipeline.
//!
//! - [`engine::Dispatcher`]: work-queue consumer that stages inputs and
//!   hands jobs to a [`Launcher`](gas_worker::Launcher).
//! - [`engine::LeaseSweeper`]: releases expired leases and re-enqueues.
//! - [`submission`]: the producer side, recording and publishing new jobs.
//! - [`router`]: monitoring HTTP endpoints over the job store.

pub mod engine;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod submission;

pub use error::{AppError, AppResult, DispatchError, SubmitError};
pub use submission::{submit_job, SubmitJob};
