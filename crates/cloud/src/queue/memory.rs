//! In-process work queue with SQS delivery semantics.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{QueueError, ReceivedMessage, WorkQueue};

/// Default visibility timeout, matching the SQS default.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Entry {
    message_id: String,
    body: String,
    /// Hidden from receivers until this instant.
    invisible_until: Option<Instant>,
    /// Every receipt issued for this message; any of them deletes it.
    receipts: Vec<String>,
    receive_count: u32,
}

impl Entry {
    fn is_visible(&self, now: Instant) -> bool {
        !matches!(self.invisible_until, Some(until) if until > now)
    }
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<Entry>,
    next_receipt: u64,
}

/// Queue held in memory.
///
/// Received messages are hidden for the visibility timeout and reappear if
/// not deleted, so redelivery and duplicate handling can be tested without
/// a queue service.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    name: Arc<str>,
    visibility_timeout: Duration,
    state: Arc<Mutex<State>>,
    arrived: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new(name: &str) -> Self {
        Self::with_visibility_timeout(name, DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(name: &str, visibility_timeout: Duration) -> Self {
        Self {
            name: Arc::from(name),
            visibility_timeout,
            state: Arc::new(Mutex::new(State::default())),
            arrived: Arc::new(Notify::new()),
        }
    }

    /// Messages not yet deleted, visible or in flight.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Bodies of all messages not yet deleted, oldest first.
    pub async fn bodies(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .map(|e| e.body.clone())
            .collect()
    }

    /// How often the message has been handed out.
    pub async fn receive_count(&self, message_id: &str) -> Option<u32> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .find(|e| e.message_id == message_id)
            .map(|e| e.receive_count)
    }

    async fn take_visible(&self, max: usize) -> Vec<ReceivedMessage> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let State {
            entries,
            next_receipt,
        } = &mut *state;

        let mut batch = Vec::new();
        for entry in entries.iter_mut().filter(|e| e.is_visible(now)).take(max) {
            *next_receipt += 1;
            let receipt = format!("{}#{}", entry.message_id, next_receipt);
            entry.receipts.push(receipt.clone());
            entry.invisible_until = Some(now + self.visibility_timeout);
            entry.receive_count += 1;
            batch.push(ReceivedMessage {
                message_id: entry.message_id.clone(),
                receipt,
                body: entry.body.clone(),
            });
        }
        batch
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, body: &str) -> Result<String, QueueError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        self.state.lock().await.entries.push(Entry {
            message_id: message_id.clone(),
            body: body.to_string(),
            invisible_until: None,
            receipts: Vec::new(),
            receive_count: 0,
        });
        self.arrived.notify_waiters();
        Ok(message_id)
    }

    async fn receive(&self, max: u32, wait: Duration) -> Result<Vec<ReceivedMessage>, QueueError> {
        let max = max.max(1) as usize;
        let deadline = Instant::now() + wait;

        loop {
            let arrived = self.arrived.notified();
            let batch = self.take_visible(max).await;
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }

            // Wake on a new message, or poll again shortly so messages whose
            // visibility timeout ran out are picked up too.
            let nap = (deadline - now).min(Duration::from_millis(50));
            let _ = tokio::time::timeout(nap, arrived).await;
        }
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        match state
            .entries
            .iter()
            .position(|e| e.receipts.iter().any(|r| r == receipt))
        {
            Some(index) => {
                state.entries.remove(index);
                Ok(())
            }
            // Issued by this queue but already deleted.
            None if receipt.contains('#') => Ok(()),
            None => Err(QueueError::InvalidReceipt {
                queue: self.name.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
