//! At-least-once work queues.
//!
//! A received message stays invisible to other consumers until its
//! visibility timeout runs out; it is removed only by an explicit
//! [`WorkQueue::delete`]. Consumers must therefore tolerate duplicates.

pub mod memory;
pub mod sqs;

use std::time::Duration;

use async_trait::async_trait;
use gas_core::error::{Classify, ErrorClass};

pub use memory::MemoryQueue;
pub use sqs::SqsQueue;

/// A message handed out by [`WorkQueue::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    /// Handle for deleting this delivery.
    pub receipt: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue service failed the request.
    #[error("Queue {queue} error: {message}")]
    Backend { queue: String, message: String },

    /// The receipt handle is not valid for this queue.
    #[error("Invalid receipt handle for queue {queue}")]
    InvalidReceipt { queue: String },
}

impl Classify for QueueError {
    fn class(&self) -> ErrorClass {
        match self {
            QueueError::Backend { .. } => ErrorClass::Transient,
            QueueError::InvalidReceipt { .. } => ErrorClass::Fatal,
        }
    }
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Queue identifier for logs (URL or name).
    fn name(&self) -> &str;

    /// Enqueue a message and return its id.
    async fn send(&self, body: &str) -> Result<String, QueueError>;

    /// Long-poll for up to `max` messages, waiting at most `wait` when the
    /// queue is empty. An empty result is not an error.
    async fn receive(&self, max: u32, wait: Duration) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Acknowledge a delivery so it is never redelivered.
    async fn delete(&self, receipt: &str) -> Result<(), QueueError>;
}
