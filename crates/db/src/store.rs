//! The job store contract.

use async_trait::async_trait;
use gas_core::error::{Classify, ErrorClass};
use gas_core::job::{Completion, JobRecord, Transition};
use gas_core::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection, query or pool failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A record with this `job_id` already exists.
    #[error("Job {0} already exists")]
    AlreadyExists(JobId),

    /// No record exists for this `job_id`.
    #[error("Job {0} not found")]
    NotFound(JobId),

    /// A stored row violates the record invariants.
    #[error("Corrupt job record {job_id}: {reason}")]
    Corrupt { job_id: JobId, reason: String },
}

impl Classify for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            StoreError::Database(_) => ErrorClass::Transient,
            StoreError::AlreadyExists(_) => ErrorClass::Contention,
            StoreError::NotFound(_) | StoreError::Corrupt { .. } => ErrorClass::Fatal,
        }
    }
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

/// Parameters of a PENDING → RUNNING claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// Unique id of this execution attempt; fences later lease and
    /// completion writes.
    pub owner: String,
    /// `None` when leases are disabled; the claim then never expires.
    pub lease_expires_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// JobStore
// ---------------------------------------------------------------------------

/// Persistent job records with conditional transitions.
///
/// Implementations must make every conditional operation atomic: the check
/// and the write happen as one step, so of any number of concurrent callers
/// at most one observes [`Transition::Applied`].
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::AlreadyExists`] if the
    /// `job_id` is taken.
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError>;

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError>;

    /// All jobs of one user, newest submission first.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<JobRecord>, StoreError>;

    /// Transition to RUNNING under a new lease owner.
    ///
    /// Condition: `status = PENDING`, or `status = RUNNING` with the lease
    /// released by the sweeper. Increments `attempts` when applied.
    async fn claim(&self, job_id: &str, claim: &Claim) -> Result<Transition, StoreError>;

    /// Extend the lease. Returns `false` when `owner` no longer holds it.
    async fn renew_lease(
        &self,
        job_id: &str,
        owner: &str,
        expires_at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Set `status = COMPLETED` and all completion fields in one write.
    ///
    /// Not conditioned on the current status; fenced only on `owner` still
    /// holding the claim so a worker whose lease was taken over cannot
    /// overwrite the new attempt's results.
    async fn complete(
        &self,
        job_id: &str,
        owner: &str,
        completion: &Completion,
    ) -> Result<Transition, StoreError>;

    /// RUNNING jobs whose lease expired at or before `now`.
    async fn list_expired_leases(&self, now: Timestamp) -> Result<Vec<JobRecord>, StoreError>;

    /// Drop an expired lease so the job can be claimed again.
    ///
    /// Condition: still RUNNING, still owned by `owner`, lease expired at
    /// `now`. Status is left at RUNNING.
    async fn release_expired(
        &self,
        job_id: &str,
        owner: &str,
        now: Timestamp,
    ) -> Result<Transition, StoreError>;

    /// Jobs that look stuck: PENDING since before `cutoff`, RUNNING with an
    /// expired or released lease, or RUNNING without a lease since before
    /// `cutoff`.
    async fn list_stuck(
        &self,
        cutoff: Timestamp,
        now: Timestamp,
    ) -> Result<Vec<JobRecord>, StoreError>;
}
