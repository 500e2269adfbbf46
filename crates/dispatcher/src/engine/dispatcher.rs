//! Work-queue consumer.
//!
//! Long-polls the request queue and, for each message independently,
//! stages the input under `{work_root}/{job_id}/` and hands the job to a
//! [`Launcher`]. A message is deleted only after a successful hand-off; on
//! any failure it stays on the queue and is redelivered once its visibility
//! timeout runs out. The dispatcher does not deduplicate: the worker's
//! conditional claim is the only guard against running a job twice.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gas_cloud::{ObjectStore, ReceivedMessage, WorkQueue};
use gas_core::config::{MAX_POLL_BATCH_SIZE, MAX_POLL_WAIT_SECS};
use gas_core::error::Classify;
use gas_core::events::SubmissionEvent;
use gas_core::types::JobId;
use gas_events::decode_event;
use gas_worker::{JobRequest, Launcher};
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;

/// Pause after a failed receive before polling again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Outcome counts of one poll.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub received: usize,
    pub dispatched: usize,
    pub failed: usize,
}

/// Single logical consumer of the request queue.
pub struct Dispatcher {
    queue: Arc<dyn WorkQueue>,
    objects: Arc<dyn ObjectStore>,
    launcher: Arc<dyn Launcher>,
    work_root: PathBuf,
    batch_size: u32,
    poll_wait: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with the maximum batch size and long-poll wait.
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        objects: Arc<dyn ObjectStore>,
        launcher: Arc<dyn Launcher>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            queue,
            objects,
            launcher,
            work_root: work_root.into(),
            batch_size: MAX_POLL_BATCH_SIZE,
            poll_wait: Duration::from_secs(MAX_POLL_WAIT_SECS),
        }
    }

    pub fn with_polling(mut self, batch_size: u32, poll_wait: Duration) -> Self {
        self.batch_size = batch_size;
        self.poll_wait = poll_wait;
        self
    }

    /// Run the poll loop until the cancellation token is triggered.
    ///
    /// Cancellation interrupts the long-poll only. A batch already received
    /// is processed to the end so no hand-off is left half done.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            queue = %self.queue.name(),
            work_root = %self.work_root.display(),
            batch_size = self.batch_size,
            poll_wait_secs = self.poll_wait.as_secs(),
            "Dispatcher started",
        );

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.queue.receive(self.batch_size, self.poll_wait) => received,
            };

            match received {
                Ok(messages) => {
                    self.handle_batch(&messages).await;
                }
                Err(e) => {
                    tracing::error!(queue = %self.queue.name(), error = %e, "Receive failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!("Dispatcher shutting down");
    }

    /// Receive one batch and dispatch every message in it.
    pub async fn poll_once(&self) -> Result<PollSummary, DispatchError> {
        let messages = self.queue.receive(self.batch_size, self.poll_wait).await?;
        Ok(self.handle_batch(&messages).await)
    }

    /// Dispatch each message independently. A failure is logged and never
    /// affects the rest of the batch.
    pub async fn handle_batch(&self, messages: &[ReceivedMessage]) -> PollSummary {
        let mut summary = PollSummary {
            received: messages.len(),
            ..Default::default()
        };

        for message in messages {
            match self.dispatch(message).await {
                Ok(job_id) => {
                    summary.dispatched += 1;
                    self.acknowledge(message, &job_id).await;
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        message_id = %message.message_id,
                        class = ?e.class(),
                        error = %e,
                        "Dispatch failed, message left for redelivery",
                    );
                }
            }
        }

        if summary.received > 0 {
            tracing::debug!(
                received = summary.received,
                dispatched = summary.dispatched,
                failed = summary.failed,
                "Batch processed",
            );
        }
        summary
    }

    /// Stage the input and launch the worker.
    async fn dispatch(&self, message: &ReceivedMessage) -> Result<JobId, DispatchError> {
        let event: SubmissionEvent = decode_event(&message.body)?;
        event.validate()?;
        let job_id = event.job_id.as_str();

        let job_dir = self.work_root.join(job_id);
        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(|source| DispatchError::Staging {
                path: job_dir.clone(),
                source,
            })?;

        let input_path = self.stage_input(&event, &job_dir).await?;

        let request = JobRequest::from_input_path(
            input_path,
            event.user_id.as_str(),
            event.user_name.as_str(),
            event.user_email.as_str(),
        )?;
        self.launcher.launch(request).await?;
        tracing::info!(job_id, message_id = %message.message_id, "Worker launched");

        Ok(event.job_id)
    }

    /// Download the input into `job_dir` unless an earlier delivery already
    /// staged it.
    ///
    /// The download goes to a hidden partial file that is renamed into place,
    /// so the staged input is either absent or complete and a worker that
    /// already reads it is never handed a truncated file.
    async fn stage_input(
        &self,
        event: &SubmissionEvent,
        job_dir: &Path,
    ) -> Result<PathBuf, DispatchError> {
        let job_id = event.job_id.as_str();
        let input_path = job_dir.join(&event.input_file_name);
        if tokio::fs::try_exists(&input_path)
            .await
            .map_err(|source| DispatchError::Staging {
                path: input_path.clone(),
                source,
            })?
        {
            tracing::info!(job_id, path = %input_path.display(), "Input already staged, reusing it");
            return Ok(input_path);
        }

        let partial = job_dir.join(format!(".{}.part", event.input_file_name));
        let bytes = self
            .objects
            .download_to_file(&event.s3_inputs_bucket, &event.s3_key_input_file, &partial)
            .await?;
        tokio::fs::rename(&partial, &input_path)
            .await
            .map_err(|source| DispatchError::Staging {
                path: input_path.clone(),
                source,
            })?;
        tracing::info!(
            job_id,
            user_id = %event.user_id,
            bucket = %event.s3_inputs_bucket,
            key = %event.s3_key_input_file,
            bytes,
            "Input staged",
        );
        Ok(input_path)
    }

    /// Delete a handed-off message. The worker already runs, so a failed
    /// delete means a redelivery that reuses the staged input and loses the
    /// claim.
    async fn acknowledge(&self, message: &ReceivedMessage, job_id: &str) {
        if let Err(e) = self.queue.delete(&message.receipt).await {
            tracing::warn!(
                job_id,
                message_id = %message.message_id,
                error = %e,
                "Failed to delete dispatched message, it will be redelivered",
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use gas_cloud::{MemoryObjectStore, MemoryQueue};
    use gas_worker::LaunchError;

    use super::*;

    /// Records launched requests without running anything.
    #[derive(Default)]
    struct RecordingLauncher {
        launched: Mutex<Vec<JobRequest>>,
        saturated: bool,
    }

    #[async_trait]
    impl Launcher for RecordingLauncher {
        async fn launch(&self, request: JobRequest) -> Result<(), LaunchError> {
            if self.saturated {
                return Err(LaunchError::Saturated { capacity: 1 });
            }
            self.launched.lock().unwrap().push(request);
            Ok(())
        }
    }

    fn submission(job_id: &str) -> String {
        serde_json::json!({
            "job_id": job_id,
            "user_id": "u1",
            "user_name": "Ada",
            "user_email": "ada@example.com",
            "user_role": "free_user",
            "input_file_name": "sample.vcf",
            "s3_inputs_bucket": "gas-inputs",
            "s3_key_input_file": format!("u1/{job_id}~sample.vcf"),
        })
        .to_string()
    }

    struct Fixture {
        queue: MemoryQueue,
        objects: MemoryObjectStore,
        launcher: Arc<RecordingLauncher>,
        work: tempfile::TempDir,
    }

    impl Fixture {
        fn new(launcher: RecordingLauncher) -> Self {
            Self {
                queue: MemoryQueue::new("requests"),
                objects: MemoryObjectStore::new(),
                launcher: Arc::new(launcher),
                work: tempfile::tempdir().unwrap(),
            }
        }

        fn dispatcher(&self) -> Dispatcher {
            Dispatcher::new(
                Arc::new(self.queue.clone()),
                Arc::new(self.objects.clone()),
                self.launcher.clone(),
                self.work.path(),
            )
            .with_polling(10, Duration::ZERO)
        }
    }

    #[tokio::test]
    async fn stages_input_and_acknowledges() {
        let f = Fixture::new(RecordingLauncher::default());
        f.objects.put("gas-inputs", "u1/J1~sample.vcf", "##vcf").await;
        f.queue.send(&submission("J1")).await.unwrap();

        let summary = f.dispatcher().poll_once().await.unwrap();
        assert_eq!(
            summary,
            PollSummary {
                received: 1,
                dispatched: 1,
                failed: 0
            }
        );

        let staged = f.work.path().join("J1").join("sample.vcf");
        assert_eq!(std::fs::read_to_string(&staged).unwrap(), "##vcf");

        let launched = f.launcher.launched.lock().unwrap().clone();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].job_id, "J1");
        assert_eq!(launched[0].input_path, staged);
        assert_eq!(launched[0].user_email, "ada@example.com");
        assert!(f.queue.is_empty().await);
    }

    #[tokio::test]
    async fn enveloped_submission_is_accepted() {
        let f = Fixture::new(RecordingLauncher::default());
        f.objects.put("gas-inputs", "u1/J1~sample.vcf", "##vcf").await;
        let envelope = gas_events::Envelope::notification(
            gas_core::events::SUBMISSION_SUBJECT,
            submission("J1"),
        );
        f.queue
            .send(&serde_json::to_string(&envelope).unwrap())
            .await
            .unwrap();

        let summary = f.dispatcher().poll_once().await.unwrap();
        assert_eq!(summary.dispatched, 1);
    }

    #[tokio::test]
    async fn redelivery_reuses_staged_input() {
        let f = Fixture::new(RecordingLauncher::default());
        f.objects.put("gas-inputs", "u1/J1~sample.vcf", "##vcf").await;
        f.queue.send(&submission("J1")).await.unwrap();
        f.dispatcher().poll_once().await.unwrap();

        let staged = f.work.path().join("J1").join("sample.vcf");
        std::fs::write(&staged, "in use").unwrap();
        f.queue.send(&submission("J1")).await.unwrap();

        let summary = f.dispatcher().poll_once().await.unwrap();
        assert_eq!(summary.dispatched, 1);
        assert_eq!(std::fs::read_to_string(&staged).unwrap(), "in use");
        assert!(!f.work.path().join("J1").join(".sample.vcf.part").exists());
        assert_eq!(f.launcher.launched.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_input_leaves_nothing_staged() {
        let f = Fixture::new(RecordingLauncher::default());
        f.queue.send(&submission("J1")).await.unwrap();

        let summary = f.dispatcher().poll_once().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert!(!f.work.path().join("J1").join("sample.vcf").exists());
        assert!(f.launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_message_is_left_on_queue() {
        let f = Fixture::new(RecordingLauncher::default());
        f.queue.send("not json").await.unwrap();

        let summary = f.dispatcher().poll_once().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(f.queue.len().await, 1);
        assert!(f.launcher.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn saturated_launcher_leaves_message_for_redelivery() {
        let f = Fixture::new(RecordingLauncher {
            saturated: true,
            ..Default::default()
        });
        f.objects.put("gas-inputs", "u1/J1~sample.vcf", "##vcf").await;
        f.queue.send(&submission("J1")).await.unwrap();

        let summary = f.dispatcher().poll_once().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(f.queue.len().await, 1);
    }

    #[tokio::test]
    async fn traversal_in_file_name_is_rejected_before_staging() {
        let f = Fixture::new(RecordingLauncher::default());
        let body = submission("J1").replace("sample.vcf\"", "../escape.vcf\"");
        let message = ReceivedMessage {
            message_id: "m1".into(),
            receipt: "r1".into(),
            body,
        };

        let err = f.dispatcher().dispatch(&message).await.unwrap_err();
        assert_matches!(err, DispatchError::Invalid(_));
        assert!(!f.work.path().join("J1").exists());
    }

    #[tokio::test]
    async fn cancelled_loop_exits() {
        let f = Fixture::new(RecordingLauncher::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), f.dispatcher().run(cancel))
            .await
            .unwrap();
    }
}
