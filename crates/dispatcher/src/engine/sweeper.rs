//! Recovery of jobs whose worker disappeared.
//!
//! A worker renews its lease while the annotator runs. When a lease runs
//! out the sweeper releases it and puts a fresh submission back on the
//! request queue, so the next dispatcher hand-off can claim the job again.
//! Only the sweeper that wins the conditional release re-enqueues.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gas_cloud::WorkQueue;
use gas_core::events::SubmissionEvent;
use gas_core::job::{JobRecord, Transition};
use gas_core::types::Timestamp;
use gas_db::{JobStore, StoreError};
use gas_worker::retry::{with_retry, DEFAULT_RETRY_DELAYS};
use tokio_util::sync::CancellationToken;

/// Claims a job may use before the sweeper stops re-enqueueing it.
pub const MAX_ATTEMPTS: i32 = 3;

/// Shortest period the sweep loop ticks at.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome counts of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    /// RUNNING jobs found with an expired lease.
    pub expired: usize,
    /// Leases this sweeper released.
    pub released: usize,
    /// Released jobs put back on the request queue.
    pub requeued: usize,
    /// Released jobs left alone after [`MAX_ATTEMPTS`] claims.
    pub abandoned: usize,
}

pub struct LeaseSweeper {
    store: Arc<dyn JobStore>,
    requests: Arc<dyn WorkQueue>,
    interval: Duration,
    retry_delays: Vec<Duration>,
}

impl LeaseSweeper {
    pub fn new(store: Arc<dyn JobStore>, requests: Arc<dyn WorkQueue>, interval: Duration) -> Self {
        Self {
            store,
            requests,
            interval,
            retry_delays: DEFAULT_RETRY_DELAYS.to_vec(),
        }
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Sweep every `interval` until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Lease sweeper started");
        let mut interval = tokio::time::interval(self.interval.max(MIN_SWEEP_INTERVAL));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Lease sweeper stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep_once(Utc::now()).await {
                        Ok(summary) if summary.expired > 0 => {
                            tracing::info!(
                                expired = summary.expired,
                                released = summary.released,
                                requeued = summary.requeued,
                                abandoned = summary.abandoned,
                                "Lease sweep finished",
                            );
                        }
                        Ok(_) => tracing::debug!("Lease sweep: nothing expired"),
                        Err(e) => tracing::error!(error = %e, "Lease sweep failed"),
                    }
                }
            }
        }
    }

    /// Release every lease expired at `now` and re-enqueue the jobs.
    pub async fn sweep_once(&self, now: Timestamp) -> Result<SweepSummary, StoreError> {
        let expired = self.store.list_expired_leases(now).await?;
        let mut summary = SweepSummary {
            expired: expired.len(),
            ..Default::default()
        };

        for record in expired {
            let Some(owner) = record.lease_owner.as_deref() else {
                continue;
            };
            let job_id = record.job_id.as_str();

            let released = match self.store.release_expired(job_id, owner, now).await {
                Ok(Transition::Applied(released)) => released,
                Ok(Transition::Contended { observed }) => {
                    tracing::debug!(job_id, observed = ?observed, "Lease renewed or released elsewhere");
                    continue;
                }
                Err(e) => {
                    tracing::error!(job_id, error = %e, "Failed to release expired lease");
                    continue;
                }
            };
            summary.released += 1;
            tracing::warn!(
                job_id,
                lease_owner = owner,
                attempts = released.attempts,
                "Lease expired, released",
            );

            if released.attempts >= MAX_ATTEMPTS {
                summary.abandoned += 1;
                tracing::error!(
                    job_id,
                    attempts = released.attempts,
                    "Job exhausted its attempts, not re-enqueued",
                );
                continue;
            }

            if self.requeue(&released).await {
                summary.requeued += 1;
            }
        }

        Ok(summary)
    }

    async fn requeue(&self, record: &JobRecord) -> bool {
        let body = match serde_json::to_string(&SubmissionEvent::from_record(record)) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(job_id = %record.job_id, error = %e, "Failed to encode submission");
                return false;
            }
        };
        let body = body.as_str();

        match with_retry("re-enqueue submission", &self.retry_delays, move || {
            self.requests.send(body)
        })
        .await
        {
            Ok(message_id) => {
                tracing::info!(job_id = %record.job_id, message_id = %message_id, "Job re-enqueued");
                true
            }
            Err(e) => {
                tracing::error!(
                    job_id = %record.job_id,
                    error = %e,
                    "Lease released but job not re-enqueued, it is listed as stuck",
                );
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use gas_cloud::MemoryQueue;
    use gas_core::job::JobStatus;
    use gas_db::{Claim, MemoryJobStore};

    use super::*;

    fn record(job_id: &str) -> JobRecord {
        let event = SubmissionEvent {
            job_id: job_id.into(),
            user_id: "u1".into(),
            user_name: "Ada".into(),
            user_email: "ada@example.com".into(),
            user_role: "free_user".into(),
            input_file_name: "sample.vcf".into(),
            s3_inputs_bucket: "gas-inputs".into(),
            s3_key_input_file: format!("u1/{job_id}~sample.vcf"),
        };
        JobRecord::pending(&event, Utc::now())
    }

    async fn claimed(store: &MemoryJobStore, job_id: &str, expires_at: Timestamp) {
        store.create(&record(job_id)).await.unwrap();
        let claim = Claim {
            owner: format!("owner-{job_id}"),
            lease_expires_at: Some(expires_at),
        };
        assert!(store.claim(job_id, &claim).await.unwrap().is_applied());
    }

    fn sweeper(store: &MemoryJobStore, queue: &MemoryQueue) -> LeaseSweeper {
        LeaseSweeper::new(
            Arc::new(store.clone()),
            Arc::new(queue.clone()),
            Duration::from_secs(60),
        )
        .with_retry_delays(vec![])
    }

    #[tokio::test]
    async fn expired_lease_is_released_and_requeued() {
        let store = MemoryJobStore::new();
        let queue = MemoryQueue::new("requests");
        let now = Utc::now();
        claimed(&store, "J1", now - chrono::Duration::seconds(5)).await;
        claimed(&store, "J2", now + chrono::Duration::seconds(60)).await;

        let summary = sweeper(&store, &queue).sweep_once(now).await.unwrap();
        assert_eq!(
            summary,
            SweepSummary {
                expired: 1,
                released: 1,
                requeued: 1,
                abandoned: 0
            }
        );

        let j1 = store.get("J1").await.unwrap().unwrap();
        assert_eq!(j1.status, JobStatus::Running);
        assert!(j1.is_released());
        assert!(!store.get("J2").await.unwrap().unwrap().is_released());

        let bodies = queue.bodies().await;
        assert_eq!(bodies.len(), 1);
        let event: SubmissionEvent = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(event, SubmissionEvent::from_record(&j1));
    }

    #[tokio::test]
    async fn second_sweep_finds_nothing() {
        let store = MemoryJobStore::new();
        let queue = MemoryQueue::new("requests");
        let now = Utc::now();
        claimed(&store, "J1", now - chrono::Duration::seconds(5)).await;

        let sweeper = sweeper(&store, &queue);
        sweeper.sweep_once(now).await.unwrap();
        let again = sweeper.sweep_once(now).await.unwrap();
        assert_eq!(again, SweepSummary::default());
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn exhausted_job_is_not_requeued() {
        let store = MemoryJobStore::new();
        let queue = MemoryQueue::new("requests");
        let now = Utc::now();
        claimed(&store, "J1", now - chrono::Duration::seconds(5)).await;
        let mut exhausted = store.get("J1").await.unwrap().unwrap();
        exhausted.attempts = MAX_ATTEMPTS;
        store.put(exhausted).await;

        let summary = sweeper(&store, &queue).sweep_once(now).await.unwrap();
        assert_eq!(summary.released, 1);
        assert_eq!(summary.abandoned, 1);
        assert_eq!(summary.requeued, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn zero_interval_still_sweeps_and_stops() {
        let store = MemoryJobStore::new();
        let queue = MemoryQueue::new("requests");
        claimed(&store, "J1", Utc::now() - chrono::Duration::seconds(5)).await;
        let sweeper = LeaseSweeper::new(
            Arc::new(store.clone()),
            Arc::new(queue.clone()),
            Duration::ZERO,
        )
        .with_retry_delays(vec![]);

        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { sweeper.run(cancel).await }
        });
        tokio::time::timeout(Duration::from_secs(2), async {
            while queue.is_empty().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        cancel.cancel();
        run.await.unwrap();
        assert_eq!(queue.len().await, 1);
    }
}
