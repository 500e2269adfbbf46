//! Amazon SQS work queue.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata};
use gas_core::config::{MAX_POLL_BATCH_SIZE, MAX_POLL_WAIT_SECS};

use super::{QueueError, ReceivedMessage, WorkQueue};

const RECEIPT_HANDLE_INVALID: &str = "ReceiptHandleIsInvalid";

#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    fn backend_error(&self, operation: &str, detail: impl std::fmt::Display) -> QueueError {
        QueueError::Backend {
            queue: self.queue_url.clone(),
            message: format!("{operation} failed: {detail}"),
        }
    }
}

#[async_trait]
impl WorkQueue for SqsQueue {
    fn name(&self) -> &str {
        &self.queue_url
    }

    async fn send(&self, body: &str) -> Result<String, QueueError> {
        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| self.backend_error("SendMessage", DisplayErrorContext(&e)))?;

        Ok(output.message_id().unwrap_or_default().to_string())
    }

    async fn receive(&self, max: u32, wait: Duration) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max = max.clamp(1, MAX_POLL_BATCH_SIZE);
        let wait_secs = wait.as_secs().min(MAX_POLL_WAIT_SECS);

        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max as i32)
            .wait_time_seconds(wait_secs as i32)
            .send()
            .await
            .map_err(|e| self.backend_error("ReceiveMessage", DisplayErrorContext(&e)))?;

        let messages = output
            .messages()
            .iter()
            .filter_map(|m| {
                let Some(receipt) = m.receipt_handle() else {
                    tracing::warn!(queue = %self.queue_url, "Message without receipt handle, skipping");
                    return None;
                };
                Some(ReceivedMessage {
                    message_id: m.message_id().unwrap_or_default().to_string(),
                    receipt: receipt.to_string(),
                    body: m.body().unwrap_or_default().to_string(),
                })
            })
            .collect();
        Ok(messages)
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| {
                if e.code() == Some(RECEIPT_HANDLE_INVALID) {
                    QueueError::InvalidReceipt {
                        queue: self.queue_url.clone(),
                    }
                } else {
                    self.backend_error("DeleteMessage", DisplayErrorContext(&e))
                }
            })?;
        Ok(())
    }
}
