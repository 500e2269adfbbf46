//! The per-job state machine.
//!
//! ```text
//! claim (PENDING → RUNNING) ──lost──▶ Skipped, no side effects
//!   │
//!   ▼
//! run task, renewing the lease ──lease lost──▶ abort, child killed
//!   │
//!   ▼
//! upload result + log ──fail──▶ job stays RUNNING, nothing published
//!   │
//!   ▼
//! commit (→ COMPLETED, fenced on lease owner)
//!   │
//!   ▼
//! remove job dir (best effort) ──▶ publish completion event
//! ```
//!
//! The completion event is only published after the commit is acknowledged,
//! so a consumer that sees the event always finds the record COMPLETED.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gas_cloud::ObjectStore;
use gas_core::annotation::{AnnotationTask, TaskOutput};
use gas_core::artifacts::ArtifactKeys;
use gas_core::config::StorageSettings;
use gas_core::events::{CompletionEvent, COMPLETION_SUBJECT};
use gas_core::job::{Completion, JobRecord, JobStatus, Transition};
use gas_core::types::{JobId, Timestamp};
use gas_db::{Claim, JobStore};
use gas_events::{publish_event, NotificationChannel};

use crate::error::WorkerError;
use crate::request::JobRequest;
use crate::retry::{with_retry, DEFAULT_RETRY_DELAYS};

/// Floor for the renewal period of very short leases.
const MIN_RENEW_PERIOD: Duration = Duration::from_millis(1);

/// How a job attempt ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Results stored, record COMPLETED and completion event published.
    Completed { job_id: JobId, duration_ms: u64 },
    /// Another worker holds or finished the job; nothing was done.
    Skipped {
        job_id: JobId,
        observed: Option<JobStatus>,
    },
}

/// Runs annotation jobs against shared collaborators. Cheap to clone.
#[derive(Clone)]
pub struct Worker {
    store: Arc<dyn JobStore>,
    objects: Arc<dyn ObjectStore>,
    results: Arc<dyn NotificationChannel>,
    task: Arc<dyn AnnotationTask>,
    keys: ArtifactKeys,
    results_bucket: String,
    lease: Option<Duration>,
    retry_delays: Vec<Duration>,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        objects: Arc<dyn ObjectStore>,
        results: Arc<dyn NotificationChannel>,
        task: Arc<dyn AnnotationTask>,
        storage: &StorageSettings,
    ) -> Self {
        Self {
            store,
            objects,
            results,
            task,
            keys: ArtifactKeys::new(storage.key_namespace.clone()),
            results_bucket: storage.results_bucket.clone(),
            lease: None,
            retry_delays: DEFAULT_RETRY_DELAYS.to_vec(),
        }
    }

    /// Claim jobs under a lease of this length. `None` claims forever.
    pub fn with_lease(mut self, lease: Option<Duration>) -> Self {
        self.lease = lease.filter(|l| !l.is_zero());
        self
    }

    /// Backoff used for uploads, the commit and the publish.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Run one job attempt to the end.
    pub async fn run(&self, request: &JobRequest) -> Result<WorkerOutcome, WorkerError> {
        let job_id = request.job_id.as_str();
        let owner = uuid::Uuid::now_v7().to_string();
        let claim = Claim {
            owner: owner.clone(),
            lease_expires_at: self.lease.map(deadline_after),
        };

        let record = match self.store.claim(job_id, &claim).await? {
            Transition::Applied(record) => record,
            Transition::Contended { observed } => {
                tracing::info!(
                    job_id,
                    observed = ?observed,
                    "Job already claimed by another worker, skipping",
                );
                // A late redelivery restaged a finished job; nobody else
                // will clean it up.
                if observed == Some(JobStatus::Completed) {
                    self.remove_job_dir(request).await;
                }
                return Ok(WorkerOutcome::Skipped {
                    job_id: request.job_id.clone(),
                    observed,
                });
            }
        };
        tracing::info!(
            job_id,
            user_id = %record.user_id,
            attempt = record.attempts,
            lease_owner = %owner,
            "Job claimed",
        );

        let output = self.run_task(request, &owner).await?;
        tracing::info!(job_id, duration_ms = output.duration_ms, "Annotation finished");

        let completion = self.upload_artifacts(&record, request, &output).await?;
        let committed = self.commit(job_id, &owner, &completion).await?;
        self.remove_job_dir(request).await;
        self.publish_completion(&committed).await?;

        Ok(WorkerOutcome::Completed {
            job_id: request.job_id.clone(),
            duration_ms: output.duration_ms,
        })
    }

    /// Run the task, renewing the lease every third of its length.
    ///
    /// Returning early drops the task future, which kills the annotator.
    async fn run_task(&self, request: &JobRequest, owner: &str) -> Result<TaskOutput, WorkerError> {
        let Some(lease) = self.lease else {
            return Ok(self.task.run(&request.input_path).await?);
        };

        let job_id = request.job_id.as_str();
        let every = (lease / 3).max(MIN_RENEW_PERIOD);
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        let task = self.task.run(&request.input_path);
        tokio::pin!(task);

        loop {
            tokio::select! {
                result = &mut task => return Ok(result?),
                _ = heartbeat.tick() => {
                    match self.store.renew_lease(job_id, owner, deadline_after(lease)).await {
                        Ok(true) => tracing::debug!(job_id, "Lease renewed"),
                        Ok(false) => {
                            tracing::error!(job_id, lease_owner = owner, "Lease lost, aborting task");
                            return Err(WorkerError::LeaseLost { job_id: request.job_id.clone() });
                        }
                        // The lease may still be valid; the next tick decides.
                        Err(e) => tracing::warn!(job_id, error = %e, "Lease renewal failed"),
                    }
                }
            }
        }
    }

    async fn upload_artifacts(
        &self,
        record: &JobRecord,
        request: &JobRequest,
        output: &TaskOutput,
    ) -> Result<Completion, WorkerError> {
        let job_id = record.job_id.as_str();
        let result_key = self
            .keys
            .result_key(&record.user_id, job_id, &request.input_file_name);
        let log_key = self
            .keys
            .log_key(&record.user_id, job_id, &request.input_file_name);

        for (key, path) in [(&result_key, &output.result_path), (&log_key, &output.log_path)] {
            with_retry("upload artifact", &self.retry_delays, move || {
                self.objects.upload_file(&self.results_bucket, key, path)
            })
            .await
            .inspect_err(|e| {
                tracing::error!(job_id, key = %key, error = %e, "Artifact upload failed, job stays RUNNING");
            })?;
        }
        tracing::info!(job_id, result_key = %result_key, log_key = %log_key, "Artifacts uploaded");

        Ok(Completion {
            complete_time: Utc::now(),
            result_bucket: self.results_bucket.clone(),
            result_key,
            log_key,
        })
    }

    async fn commit(
        &self,
        job_id: &str,
        owner: &str,
        completion: &Completion,
    ) -> Result<JobRecord, WorkerError> {
        let transition = with_retry("commit completion", &self.retry_delays, move || {
            self.store.complete(job_id, owner, completion)
        })
        .await
        .inspect_err(|e| {
            tracing::error!(job_id, error = %e, "Completion commit failed, artifacts stored but job not COMPLETED");
        })?;

        match transition {
            Transition::Applied(record) => {
                tracing::info!(job_id, "Job COMPLETED");
                Ok(record)
            }
            Transition::Contended { observed } => {
                tracing::error!(
                    job_id,
                    observed = ?observed,
                    "Completion rejected, job was taken over by another attempt",
                );
                Err(WorkerError::CommitRejected {
                    job_id: job_id.to_string(),
                    observed,
                })
            }
        }
    }

    async fn remove_job_dir(&self, request: &JobRequest) {
        let Some(dir) = request.job_dir() else {
            return;
        };
        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            tracing::warn!(
                job_id = %request.job_id,
                dir = %dir.display(),
                error = %e,
                "Failed to remove job directory",
            );
        }
    }

    async fn publish_completion(&self, record: &JobRecord) -> Result<(), WorkerError> {
        let event = CompletionEvent::for_record(record);
        let event = &event;
        with_retry("publish completion", &self.retry_delays, move || {
            publish_event(self.results.as_ref(), COMPLETION_SUBJECT, event)
        })
        .await
        .map_err(|source| {
            tracing::error!(
                job_id = %record.job_id,
                error = %source,
                "Job COMPLETED but completion event was not published",
            );
            WorkerError::Publish {
                job_id: record.job_id.clone(),
                source,
            }
        })?;

        tracing::info!(job_id = %record.job_id, user_id = %record.user_id, "Completion event published");
        Ok(())
    }
}

fn deadline_after(lease: Duration) -> Timestamp {
    Utc::now() + chrono::Duration::milliseconds(lease.as_millis() as i64)
}
