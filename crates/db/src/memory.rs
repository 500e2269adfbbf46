//! In-process job store.
//!
//! Holds records in a map behind a single [`RwLock`]. Each conditional
//! operation checks and writes under one write guard, which gives the same
//! at-most-one-winner guarantee as the conditional `UPDATE`s in
//! [`PgJobStore`](crate::PgJobStore).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gas_core::job::{Completion, JobRecord, JobStatus, Transition};
use gas_core::types::{JobId, Timestamp};
use tokio::sync::RwLock;

use crate::store::{Claim, JobStore, StoreError};

#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Overwrite a record without any condition. Test helper for seeding
    /// states that the state machine cannot reach on its own.
    pub async fn put(&self, record: JobRecord) {
        self.jobs.write().await.insert(record.job_id.clone(), record);
    }
}

fn contended(record: &JobRecord) -> Transition {
    Transition::Contended {
        observed: Some(record.status),
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&record.job_id) {
            return Err(StoreError::AlreadyExists(record.job_id.clone()));
        }
        let mut stored = record.clone();
        stored.status = JobStatus::Pending;
        stored.completion = None;
        stored.lease_owner = None;
        stored.lease_expires_at = None;
        stored.attempts = 0;
        jobs.insert(stored.job_id.clone(), stored);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<JobRecord>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut records: Vec<JobRecord> = jobs
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.submit_time.cmp(&a.submit_time));
        Ok(records)
    }

    async fn claim(&self, job_id: &str, claim: &Claim) -> Result<Transition, StoreError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        if record.status != JobStatus::Pending && !record.is_released() {
            return Ok(contended(record));
        }

        record.status = JobStatus::Running;
        record.lease_owner = Some(claim.owner.clone());
        record.lease_expires_at = claim.lease_expires_at;
        record.attempts += 1;
        Ok(Transition::Applied(record.clone()))
    }

    async fn renew_lease(
        &self,
        job_id: &str,
        owner: &str,
        expires_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(job_id) {
            Some(record)
                if record.status == JobStatus::Running
                    && record.lease_owner.as_deref() == Some(owner) =>
            {
                record.lease_expires_at = Some(expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(
        &self,
        job_id: &str,
        owner: &str,
        completion: &Completion,
    ) -> Result<Transition, StoreError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        if record.lease_owner.as_deref() != Some(owner) {
            return Ok(contended(record));
        }

        record.status = JobStatus::Completed;
        record.completion = Some(completion.clone());
        record.lease_expires_at = None;
        Ok(Transition::Applied(record.clone()))
    }

    async fn list_expired_leases(&self, now: Timestamp) -> Result<Vec<JobRecord>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut records: Vec<JobRecord> = jobs
            .values()
            .filter(|r| r.lease_expired(now))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.lease_expires_at);
        Ok(records)
    }

    async fn release_expired(
        &self,
        job_id: &str,
        owner: &str,
        now: Timestamp,
    ) -> Result<Transition, StoreError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        if !record.lease_expired(now) || record.lease_owner.as_deref() != Some(owner) {
            return Ok(contended(record));
        }

        record.lease_owner = None;
        record.lease_expires_at = None;
        Ok(Transition::Applied(record.clone()))
    }

    async fn list_stuck(
        &self,
        cutoff: Timestamp,
        now: Timestamp,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut records: Vec<JobRecord> = jobs
            .values()
            .filter(|r| match r.status {
                JobStatus::Pending => r.submit_time < cutoff,
                JobStatus::Running => {
                    r.is_released()
                        || r.lease_expired(now)
                        || (r.lease_expires_at.is_none() && r.submit_time < cutoff)
                }
                JobStatus::Completed => false,
            })
            .cloned()
            .collect();
        records.sort_by_key(|r| r.submit_time);
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
