//! Result-queue consumption against in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use gas_cloud::{MemoryQueue, WorkQueue};
use gas_core::events::{CompletionEvent, COMPLETION_SUBJECT};
use gas_events::delivery::RecordingMailer;
use gas_events::Envelope;
use gas_notifier::Notifier;
use tokio_util::sync::CancellationToken;

fn completion(job_id: &str, email: &str) -> CompletionEvent {
    CompletionEvent {
        job_id: job_id.into(),
        user_id: "u1".into(),
        user_name: "Ada".into(),
        user_email: email.into(),
    }
}

/// Enqueue `event` the way the results topic delivers it.
async fn deliver(queue: &MemoryQueue, event: &CompletionEvent) {
    let message = serde_json::to_string(event).unwrap();
    let body = serde_json::to_string(&Envelope::notification(COMPLETION_SUBJECT, message)).unwrap();
    queue.send(&body).await.unwrap();
}

#[tokio::test]
async fn only_notified_messages_are_deleted() {
    let queue = MemoryQueue::with_visibility_timeout("results", Duration::from_millis(50));
    let mailer = RecordingMailer::new();
    mailer.fail_for("bad@example.com").await;

    deliver(&queue, &completion("J1", "bad@example.com")).await;
    deliver(&queue, &completion("J2", "ada@example.com")).await;
    deliver(&queue, &completion("J3", "bob@example.com")).await;

    let notifier = Notifier::new(Arc::new(queue.clone()), Arc::new(mailer.clone()))
        .with_polling(10, Duration::ZERO);
    let report = notifier.poll_once().await.unwrap();

    assert_eq!(report.sent_count(), 2);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(mailer.sent().await.len(), 2);

    // The failed message is the only one left and comes back once visible.
    assert_eq!(queue.len().await, 1);
    tokio::time::sleep(Duration::from_millis(80)).await;
    let again = notifier.poll_once().await.unwrap();
    assert_eq!(again.failed_count(), 1);
    assert_eq!(again.sent_count(), 0);
}

#[tokio::test]
async fn run_stops_on_cancel() {
    let queue = MemoryQueue::new("results");
    let mailer = RecordingMailer::new();
    deliver(&queue, &completion("J1", "ada@example.com")).await;

    let notifier = Notifier::new(Arc::new(queue.clone()), Arc::new(mailer.clone()))
        .with_polling(10, Duration::from_millis(20));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { notifier.run(cancel).await }
    });

    for _ in 0..100 {
        if !mailer.sent().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "Hi Ada, \n The job J1 has finished!");
    assert!(queue.is_empty().await);
}
