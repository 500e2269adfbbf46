//! Publish/subscribe notification channels.
//!
//! A topic fans each published message out to every subscribed queue,
//! wrapped in an [`Envelope`]. Delivery is at least once: a publish that
//! fails part-way may be retried and leave duplicates on some subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gas_cloud::{MemoryQueue, QueueError, WorkQueue};
use gas_core::error::{Classify, ErrorClass};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::envelope::Envelope;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to deliver to subscriber: {0}")]
    Queue(#[from] QueueError),

    #[error("Topic {0} is unavailable")]
    Unavailable(String),
}

impl Classify for PublishError {
    fn class(&self) -> ErrorClass {
        match self {
            PublishError::Serialize(_) => ErrorClass::Fatal,
            PublishError::Queue(e) => e.class(),
            PublishError::Unavailable(_) => ErrorClass::Transient,
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationChannel
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Publish `message` (event JSON) under `subject`.
    async fn publish(&self, subject: &str, message: &str) -> Result<(), PublishError>;
}

/// Serialize `event` and publish it on `channel`.
pub async fn publish_event<C, T>(channel: &C, subject: &str, event: &T) -> Result<(), PublishError>
where
    C: NotificationChannel + ?Sized,
    T: Serialize + Sync,
{
    let message = serde_json::to_string(event)?;
    channel.publish(subject, &message).await
}

// ---------------------------------------------------------------------------
// QueueFanoutTopic
// ---------------------------------------------------------------------------

/// Topic whose subscribers are work queues.
pub struct QueueFanoutTopic {
    name: String,
    subscribers: Vec<Arc<dyn WorkQueue>>,
}

impl QueueFanoutTopic {
    pub fn new(name: impl Into<String>, subscribers: Vec<Arc<dyn WorkQueue>>) -> Self {
        Self {
            name: name.into(),
            subscribers,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[async_trait]
impl NotificationChannel for QueueFanoutTopic {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), PublishError> {
        let body = serde_json::to_string(&Envelope::notification(subject, message))?;
        for queue in &self.subscribers {
            let message_id = queue.send(&body).await?;
            tracing::debug!(
                topic = %self.name,
                queue = %queue.name(),
                message_id = %message_id,
                subject,
                "Published to subscriber",
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryTopic
// ---------------------------------------------------------------------------

/// A message recorded by [`MemoryTopic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub subject: String,
    pub message: String,
}

/// In-process topic that records every publish and fans out to in-memory
/// queues. Can be switched to reject publishes.
#[derive(Debug, Clone, Default)]
pub struct MemoryTopic {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    subscribers: Arc<Mutex<Vec<MemoryQueue>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryTopic {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, queue: MemoryQueue) {
        self.subscribers.lock().await.push(queue);
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    /// Published messages with `subject`, decoded as `T`.
    pub async fn events<T: serde::de::DeserializeOwned>(&self, subject: &str) -> Vec<T> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|p| p.subject == subject)
            .filter_map(|p| serde_json::from_str(&p.message).ok())
            .collect()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationChannel for MemoryTopic {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), PublishError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable("memory".into()));
        }

        let body = serde_json::to_string(&Envelope::notification(subject, message))?;
        for queue in self.subscribers.lock().await.iter() {
            queue.send(&body).await?;
        }

        self.published.lock().await.push(PublishedMessage {
            subject: subject.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use gas_core::events::{CompletionEvent, COMPLETION_SUBJECT};

    use super::*;
    use crate::envelope::decode_event;

    fn completion() -> CompletionEvent {
        CompletionEvent {
            job_id: "J1".into(),
            user_id: "u1".into(),
            user_name: "Ada".into(),
            user_email: "ada@example.com".into(),
        }
    }

    #[tokio::test]
    async fn fanout_delivers_envelope_to_every_subscriber() {
        let a = MemoryQueue::new("a");
        let b = MemoryQueue::new("b");
        let topic = QueueFanoutTopic::new(
            "results",
            vec![
                Arc::new(a.clone()) as Arc<dyn WorkQueue>,
                Arc::new(b.clone()) as Arc<dyn WorkQueue>,
            ],
        );

        publish_event(&topic, COMPLETION_SUBJECT, &completion())
            .await
            .unwrap();

        for queue in [a, b] {
            let received = queue.receive(10, Duration::ZERO).await.unwrap();
            assert_eq!(received.len(), 1);
            let event: CompletionEvent = decode_event(&received[0].body).unwrap();
            assert_eq!(event, completion());
        }
    }

    #[tokio::test]
    async fn memory_topic_records_and_fans_out() {
        let topic = MemoryTopic::new();
        let queue = MemoryQueue::new("notify");
        topic.subscribe(queue.clone()).await;

        publish_event(&topic, COMPLETION_SUBJECT, &completion())
            .await
            .unwrap();

        let events: Vec<CompletionEvent> = topic.events(COMPLETION_SUBJECT).await;
        assert_eq!(events, vec![completion()]);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn unavailable_topic_records_nothing() {
        let topic = MemoryTopic::new();
        topic.set_unavailable(true);
        let err = publish_event(&topic, COMPLETION_SUBJECT, &completion())
            .await
            .unwrap_err();
        assert_matches!(err, PublishError::Unavailable(_));
        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(topic.published().await.is_empty());
    }
}
