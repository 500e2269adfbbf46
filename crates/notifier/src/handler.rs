//! Completion notification batches.
//!
//! Each message in a batch is handled on its own: a message that cannot be
//! decoded or mailed is recorded as failed and the rest of the batch still
//! goes out. The report names the failed messages so only those are
//! redelivered.

use gas_cloud::ReceivedMessage;
use gas_core::error::{Classify, ErrorClass};
use gas_core::events::CompletionEvent;
use gas_events::delivery::{EmailError, Mailer, OutgoingEmail};
use gas_events::{decode_event, DecodeError};
use serde::Serialize;

/// Subject line of every completion email.
pub const COMPLETION_EMAIL_SUBJECT: &str = "Job finished!";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Undecodable completion event: {0}")]
    Decode(#[from] DecodeError),

    #[error("Failed to send email: {0}")]
    Email(#[from] EmailError),
}

impl Classify for NotifyError {
    fn class(&self) -> ErrorClass {
        match self {
            NotifyError::Decode(_) => ErrorClass::Fatal,
            NotifyError::Email(e) => e.class(),
        }
    }
}

/// The email telling a user their job finished.
pub fn completion_email(event: &CompletionEvent) -> OutgoingEmail {
    OutgoingEmail {
        to: event.user_email.clone(),
        subject: COMPLETION_EMAIL_SUBJECT.to_string(),
        body: format!(
            "Hi {}, \n The job {} has finished!",
            event.user_name, event.job_id
        ),
    }
}

/// A message the notifier could not handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    /// Queue message id of the failed delivery.
    pub item_identifier: String,
    pub error: String,
}

/// Result of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Receipts of messages whose email went out.
    pub sent: Vec<String>,
    pub failed: Vec<FailedItem>,
}

#[derive(Debug, Serialize)]
pub struct BatchItemFailures {
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Serialize)]
pub struct BatchItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}

impl BatchReport {
    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Partial-batch response naming the messages to redeliver.
    pub fn batch_item_failures(&self) -> BatchItemFailures {
        BatchItemFailures {
            batch_item_failures: self
                .failed
                .iter()
                .map(|f| BatchItemFailure {
                    item_identifier: f.item_identifier.clone(),
                })
                .collect(),
        }
    }
}

/// Mail every completion event in `messages`.
pub async fn notify_batch<M>(mailer: &M, messages: &[ReceivedMessage]) -> BatchReport
where
    M: Mailer + ?Sized,
{
    let mut report = BatchReport::default();

    for message in messages {
        match notify_one(mailer, message).await {
            Ok(event) => {
                tracing::info!(
                    job_id = %event.job_id,
                    user_id = %event.user_id,
                    message_id = %message.message_id,
                    "Completion email sent",
                );
                report.sent.push(message.receipt.clone());
            }
            Err(e) => {
                tracing::error!(
                    message_id = %message.message_id,
                    class = ?e.class(),
                    error = %e,
                    "Completion notification failed",
                );
                report.failed.push(FailedItem {
                    item_identifier: message.message_id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        sent = report.sent_count(),
        failed = report.failed_count(),
        "Notification batch processed",
    );
    report
}

async fn notify_one<M>(mailer: &M, message: &ReceivedMessage) -> Result<CompletionEvent, NotifyError>
where
    M: Mailer + ?Sized,
{
    let event: CompletionEvent = decode_event(&message.body)?;
    mailer.send(&completion_email(&event)).await?;
    Ok(event)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use gas_events::delivery::RecordingMailer;

    use super::*;

    fn message(id: &str, job_id: &str, email: &str) -> ReceivedMessage {
        let event = CompletionEvent {
            job_id: job_id.into(),
            user_id: "u1".into(),
            user_name: "Ada".into(),
            user_email: email.into(),
        };
        ReceivedMessage {
            message_id: id.into(),
            receipt: format!("{id}-receipt"),
            body: serde_json::to_string(&event).unwrap(),
        }
    }

    #[test]
    fn email_text() {
        let email = completion_email(&CompletionEvent {
            job_id: "J1".into(),
            user_id: "u1".into(),
            user_name: "Ada".into(),
            user_email: "ada@example.com".into(),
        });
        assert_eq!(email.to, "ada@example.com");
        assert_eq!(email.subject, "Job finished!");
        assert_eq!(email.body, "Hi Ada, \n The job J1 has finished!");
    }

    #[tokio::test]
    async fn first_failure_does_not_stop_the_rest() {
        let mailer = RecordingMailer::new();
        mailer.fail_for("bad@example.com").await;
        let batch = [
            message("m1", "J1", "bad@example.com"),
            message("m2", "J2", "ada@example.com"),
            message("m3", "J3", "bob@example.com"),
        ];

        let report = notify_batch(&mailer, &batch).await;
        assert_eq!(report.sent_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failed[0].item_identifier, "m1");
        assert_eq!(report.sent, vec!["m2-receipt", "m3-receipt"]);

        let recipients: Vec<String> = mailer.sent().await.into_iter().map(|e| e.to).collect();
        assert_eq!(recipients, vec!["ada@example.com", "bob@example.com"]);
    }

    #[tokio::test]
    async fn undecodable_message_is_reported() {
        let mailer = RecordingMailer::new();
        let batch = [
            ReceivedMessage {
                message_id: "m1".into(),
                receipt: "r1".into(),
                body: "{\"job_id\": 7}".into(),
            },
            message("m2", "J2", "ada@example.com"),
        ];

        let report = notify_batch(&mailer, &batch).await;
        assert_eq!(report.sent_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(report.failed[0].error.contains("Undecodable"));
    }

    #[test]
    fn batch_item_failures_shape() {
        let report = BatchReport {
            sent: vec!["r2".into()],
            failed: vec![FailedItem {
                item_identifier: "m1".into(),
                error: "boom".into(),
            }],
        };
        let json = serde_json::to_value(report.batch_item_failures()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "batchItemFailures": [{ "itemIdentifier": "m1" }] })
        );
    }
}
