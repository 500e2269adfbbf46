//! Bounded in-process worker pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use gas_core::error::Classify;
use gas_core::types::{JobId, Timestamp};
use tokio::sync::{Mutex, Notify, Semaphore};

use crate::launcher::{LaunchError, Launcher};
use crate::request::JobRequest;
use crate::worker::{Worker, WorkerOutcome};

/// A job currently executing in the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: JobId,
    pub launched_at: Timestamp,
}

/// Runs [`Worker`]s as tokio tasks, at most `capacity` at a time.
///
/// A launch never waits for a free slot: when the pool is full it returns
/// [`LaunchError::Saturated`] so the caller can leave the message for
/// redelivery.
#[derive(Clone)]
pub struct WorkerPool {
    worker: Worker,
    capacity: usize,
    slots: Arc<Semaphore>,
    active: Arc<Mutex<HashMap<u64, JobHandle>>>,
    next_id: Arc<AtomicU64>,
    idle: Arc<Notify>,
}

impl WorkerPool {
    pub fn new(worker: Worker, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            worker,
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            active: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs currently running, oldest first.
    pub async fn active(&self) -> Vec<JobHandle> {
        let mut handles: Vec<JobHandle> = self.active.lock().await.values().cloned().collect();
        handles.sort_by_key(|h| h.launched_at);
        handles
    }

    /// Wait until no job is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.active.lock().await.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Launcher for WorkerPool {
    async fn launch(&self, request: JobRequest) -> Result<(), LaunchError> {
        let permit = Arc::clone(&self.slots)
            .try_acquire_owned()
            .map_err(|_| LaunchError::Saturated {
                capacity: self.capacity,
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(job_id = %request.job_id, "Launching job in pool");
        self.active.lock().await.insert(
            id,
            JobHandle {
                job_id: request.job_id.clone(),
                launched_at: Utc::now(),
            },
        );

        let worker = self.worker.clone();
        let active = Arc::clone(&self.active);
        let idle = Arc::clone(&self.idle);

        tokio::spawn(async move {
            let _permit = permit;
            match worker.run(&request).await {
                Ok(WorkerOutcome::Completed { job_id, duration_ms }) => {
                    tracing::info!(job_id = %job_id, duration_ms, "Job finished");
                }
                Ok(WorkerOutcome::Skipped { job_id, .. }) => {
                    tracing::debug!(job_id = %job_id, "Job skipped");
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %request.job_id,
                        class = ?e.class(),
                        error = %e,
                        "Job attempt failed",
                    );
                }
            }
            active.lock().await.remove(&id);
            idle.notify_waiters();
        });

        Ok(())
    }
}
