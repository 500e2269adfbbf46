use gas_cloud::StorageError;
use gas_core::annotation::TaskError;
use gas_core::error::{Classify, CoreError, ErrorClass};
use gas_core::job::JobStatus;
use gas_core::types::JobId;
use gas_db::StoreError;
use gas_events::PublishError;

/// Why a job attempt did not reach a published completion.
///
/// Losing the initial claim is not an error; see
/// [`WorkerOutcome::Skipped`](crate::WorkerOutcome::Skipped).
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Invalid job request: {0}")]
    InvalidRequest(#[from] CoreError),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Annotation failed: {0}")]
    Task(#[from] TaskError),

    #[error("Artifact upload failed: {0}")]
    Upload(#[from] StorageError),

    /// The lease was taken over while the task ran; the attempt was
    /// abandoned before any artifact was written.
    #[error("Lease on job {job_id} was lost")]
    LeaseLost { job_id: JobId },

    /// The completion write was refused because another attempt owns the
    /// job now.
    #[error("Completion of job {job_id} rejected (status {observed:?})")]
    CommitRejected {
        job_id: JobId,
        observed: Option<JobStatus>,
    },

    /// The job is COMPLETED in the store but the completion event could not
    /// be published.
    #[error("Job {job_id} completed but the completion event was not published: {source}")]
    Publish {
        job_id: JobId,
        #[source]
        source: PublishError,
    },
}

impl Classify for WorkerError {
    fn class(&self) -> ErrorClass {
        match self {
            WorkerError::InvalidRequest(e) => e.class(),
            WorkerError::Store(e) => e.class(),
            WorkerError::Task(e) => e.class(),
            WorkerError::Upload(e) => e.class(),
            WorkerError::LeaseLost { .. } | WorkerError::CommitRejected { .. } => {
                ErrorClass::Contention
            }
            WorkerError::Publish { source, .. } => source.class(),
        }
    }
}
