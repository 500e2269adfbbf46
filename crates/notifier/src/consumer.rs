//! Result-queue consumer.

use std::sync::Arc;
use std::time::Duration;

use gas_cloud::{QueueError, WorkQueue};
use gas_core::config::{MAX_POLL_BATCH_SIZE, MAX_POLL_WAIT_SECS};
use gas_events::delivery::Mailer;
use tokio_util::sync::CancellationToken;

use crate::handler::{notify_batch, BatchReport};

/// Pause after a failed receive before polling again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Long-polls the result queue and mails each completion event.
///
/// Only successfully notified messages are deleted; failed ones reappear
/// after their visibility timeout.
pub struct Notifier {
    queue: Arc<dyn WorkQueue>,
    mailer: Arc<dyn Mailer>,
    batch_size: u32,
    poll_wait: Duration,
}

impl Notifier {
    pub fn new(queue: Arc<dyn WorkQueue>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            queue,
            mailer,
            batch_size: MAX_POLL_BATCH_SIZE,
            poll_wait: Duration::from_secs(MAX_POLL_WAIT_SECS),
        }
    }

    pub fn with_polling(mut self, batch_size: u32, poll_wait: Duration) -> Self {
        self.batch_size = batch_size;
        self.poll_wait = poll_wait;
        self
    }

    /// Run until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(queue = %self.queue.name(), "Notifier started");

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.queue.receive(self.batch_size, self.poll_wait) => result,
            };

            match result {
                Ok(messages) if messages.is_empty() => {}
                Ok(messages) => {
                    let report = notify_batch(self.mailer.as_ref(), &messages).await;
                    self.acknowledge(&report).await;
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

        tracing::info!("Notifier shutting down");
    }

    /// Receive one batch, mail it and delete the successes.
    pub async fn poll_once(&self) -> Result<BatchReport, QueueError> {
        let messages = self.queue.receive(self.batch_size, self.poll_wait).await?;
        let report = notify_batch(self.mailer.as_ref(), &messages).await;
        self.acknowledge(&report).await;
        Ok(report)
    }

    async fn acknowledge(&self, report: &BatchReport) {
        for receipt in &report.sent {
            if let Err(e) = self.queue.delete(receipt).await {
                tracing::warn!(error = %e, "Failed to delete notified message, user may be emailed twice");
            }
        }
    }
}
