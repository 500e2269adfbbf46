//! Hand-off from the dispatcher to wherever the job runs.

use async_trait::async_trait;
use gas_core::error::{Classify, ErrorClass};

use crate::request::JobRequest;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// Every execution slot is busy; the job was not started.
    #[error("All {capacity} worker slots are busy")]
    Saturated { capacity: usize },

    /// The worker process could not be started.
    #[error("Failed to spawn worker process: {0}")]
    Spawn(#[from] std::io::Error),
}

impl Classify for LaunchError {
    fn class(&self) -> ErrorClass {
        match self {
            LaunchError::Saturated { .. } => ErrorClass::Transient,
            LaunchError::Spawn(_) => ErrorClass::LocalIo,
        }
    }
}

/// Starts a job without waiting for it.
///
/// `Ok` means the job is running somewhere that will drive it to an end
/// without further involvement from the caller.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, request: JobRequest) -> Result<(), LaunchError>;
}
