//! Outbound user notifications.
//!
//! [`Mailer`] is the seam the notifier sends through. [`EmailDelivery`]
//! talks SMTP; [`RecordingMailer`] keeps messages in memory for tests and
//! for running without an SMTP relay.

pub mod email;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

pub use email::{EmailConfig, EmailDelivery, EmailError};

/// A plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

/// Mailer that records what it was asked to send.
///
/// Recipients registered with [`fail_for`](Self::fail_for) are rejected
/// with [`EmailError::Build`] and not recorded.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutgoingEmail>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_for(&self, recipient: &str) {
        self.failing.lock().await.insert(recipient.to_string());
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        if self.failing.lock().await.contains(&email.to) {
            return Err(EmailError::Build(format!("recipient {} rejected", email.to)));
        }
        self.sent.lock().await.push(email.clone());
        tracing::info!(to = %email.to, subject = %email.subject, "Email recorded");
        Ok(())
    }
}
