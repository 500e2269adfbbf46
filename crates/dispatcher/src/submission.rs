//! Job submission, the front end's side of the pipeline.
//!
//! The front end uploads the input to `[{namespace}/]{user_id}/{job_id}~{file}`,
//! records the job as PENDING and only then publishes the submission event,
//! so a dispatcher never sees an event for a job that has no record.

use chrono::Utc;
use gas_core::artifacts::parse_input_key;
use gas_core::error::CoreError;
use gas_core::events::{SubmissionEvent, SUBMISSION_SUBJECT};
use gas_core::job::JobRecord;
use gas_db::{JobStore, StoreError};
use gas_events::{publish_event, NotificationChannel};
use serde::Deserialize;

use crate::error::SubmitError;

/// An uploaded input and the identity of the user who submitted it.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJob {
    pub inputs_bucket: String,
    /// Object key of the uploaded input; carries the user id, job id and
    /// file name.
    pub input_key: String,
    pub user_name: String,
    pub user_email: String,
    pub user_role: String,
}

/// Record a new PENDING job and publish its submission event.
///
/// A `job_id` that already has a record yields [`CoreError::Conflict`] and
/// publishes nothing.
pub async fn submit_job<S, C>(store: &S, channel: &C, input: SubmitJob) -> Result<JobRecord, SubmitError>
where
    S: JobStore + ?Sized,
    C: NotificationChannel + ?Sized,
{
    let key = parse_input_key(&input.input_key)?;
    let event = SubmissionEvent {
        job_id: key.job_id,
        user_id: key.user_id,
        user_name: input.user_name,
        user_email: input.user_email,
        user_role: input.user_role,
        input_file_name: key.file_name,
        s3_inputs_bucket: input.inputs_bucket,
        s3_key_input_file: input.input_key,
    };
    event.validate()?;

    let record = JobRecord::pending(&event, Utc::now());
    store.create(&record).await.map_err(|e| match e {
        StoreError::AlreadyExists(job_id) => {
            SubmitError::Core(CoreError::Conflict(format!("Job {job_id} already submitted")))
        }
        other => SubmitError::Store(other),
    })?;

    publish_event(channel, SUBMISSION_SUBJECT, &event)
        .await
        .map_err(|source| {
            tracing::error!(
                job_id = %record.job_id,
                error = %source,
                "Job recorded as PENDING but submission was not published",
            );
            SubmitError::Publish {
                job_id: record.job_id.clone(),
                source,
            }
        })?;

    tracing::info!(
        job_id = %record.job_id,
        user_id = %record.user_id,
        input_file_name = %record.input_file_name,
        "Job submitted",
    );
    Ok(record)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
