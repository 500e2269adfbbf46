//! Job record model and the PENDING → RUNNING → COMPLETED state machine.
//!
//! The record is the single source of truth for job progress. Stores persist
//! it; the dispatcher and worker only ever advance it through conditional
//! writes, so the rules for legal transitions live here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::events::SubmissionEvent;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of an annotation job.
///
/// Transitions are monotonic: `Pending → Running → Completed`. There is no
/// reverse transition and `Running` cannot be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
}

impl JobStatus {
    /// Database / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
        }
    }

    /// Whether `self → next` is a legal single-step transition.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Completed
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(CoreError::Validation(format!(
                "Unknown job status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// Fields written exactly once, together with the transition to COMPLETED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub complete_time: Timestamp,
    pub result_bucket: String,
    pub result_key: String,
    pub log_key: String,
}

/// One row per job.
///
/// Requester identity is a snapshot taken at submission and is never
/// re-fetched. `lease_owner` / `lease_expires_at` describe the current
/// RUNNING claim and are meaningless in any other state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub user_role: String,
    pub input_file_name: String,
    pub input_bucket: String,
    pub input_key: String,
    pub status: JobStatus,
    pub submit_time: Timestamp,
    #[serde(flatten)]
    pub completion: Option<Completion>,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<Timestamp>,
    pub attempts: i32,
}

impl JobRecord {
    /// Build the PENDING record the front end writes at submission.
    pub fn pending(event: &SubmissionEvent, submit_time: Timestamp) -> Self {
        Self {
            job_id: event.job_id.clone(),
            user_id: event.user_id.clone(),
            user_name: event.user_name.clone(),
            user_email: event.user_email.clone(),
            user_role: event.user_role.clone(),
            input_file_name: event.input_file_name.clone(),
            input_bucket: event.s3_inputs_bucket.clone(),
            input_key: event.s3_key_input_file.clone(),
            status: JobStatus::Pending,
            submit_time,
            completion: None,
            lease_owner: None,
            lease_expires_at: None,
            attempts: 0,
        }
    }

    /// Completion fields are present if and only if the job is COMPLETED.
    pub fn is_consistent(&self) -> bool {
        (self.status == JobStatus::Completed) == self.completion.is_some()
    }

    /// A RUNNING job whose lease has run out and may be reclaimed.
    ///
    /// Jobs claimed without a lease (leases disabled) never expire.
    pub fn lease_expired(&self, now: Timestamp) -> bool {
        self.status == JobStatus::Running
            && self.lease_owner.is_some()
            && self.lease_expires_at.is_some_and(|at| at <= now)
    }

    /// A RUNNING job whose lease was released by the sweeper and which is
    /// waiting for a new worker to claim it.
    pub fn is_released(&self) -> bool {
        self.status == JobStatus::Running && self.lease_owner.is_none()
    }
}

// ---------------------------------------------------------------------------
// Transition outcomes
// ---------------------------------------------------------------------------

/// Result of a conditional write against the job store.
///
/// Losing the condition is an expected outcome under concurrent dispatch and
/// is therefore modelled as a value, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The write won; carries the record as stored after the write.
    Applied(JobRecord),
    /// The precondition did not hold; another writer advanced the job.
    /// Carries the status observed at write time when known.
    Contended { observed: Option<JobStatus> },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn submission() -> SubmissionEvent {
        SubmissionEvent {
            job_id: "J1".into(),
            user_id: "u1".into(),
            user_name: "Ada".into(),
            user_email: "ada@example.com".into(),
            user_role: "free_user".into(),
            input_file_name: "sample.vcf".into(),
            s3_inputs_bucket: "in-bkt".into(),
            s3_key_input_file: "u1/J1~sample.vcf".into(),
        }
    }

    #[test]
    fn only_forward_single_steps_are_legal() {
        use JobStatus::*;
        assert!(Pending.can_advance_to(Running));
        assert!(Running.can_advance_to(Completed));
        assert!(!Pending.can_advance_to(Completed));
        assert!(!Running.can_advance_to(Pending));
        assert!(!Completed.can_advance_to(Running));
        assert!(!Completed.can_advance_to(Completed));
    }

    #[test]
    fn status_parses_its_own_representation() {
        for status in [JobStatus::Pending, JobStatus::Running, JobStatus::Completed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("FAILED".parse::<JobStatus>().is_err());
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&JobStatus::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
    }

    #[test]
    fn pending_record_copies_submission_snapshot() {
        let now = Utc::now();
        let record = JobRecord::pending(&submission(), now);
        assert_eq!(record.job_id, "J1");
        assert_eq!(record.input_bucket, "in-bkt");
        assert_eq!(record.input_key, "u1/J1~sample.vcf");
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.submit_time, now);
        assert_eq!(record.attempts, 0);
        assert!(record.is_consistent());
    }

    #[test]
    fn completion_fields_flatten_into_record_json() {
        let mut record = JobRecord::pending(&submission(), Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("result_key").is_none());

        record.status = JobStatus::Completed;
        record.completion = Some(Completion {
            complete_time: Utc::now(),
            result_bucket: "gas-results".into(),
            result_key: "u1/J1/sample.annot.vcf".into(),
            log_key: "u1/J1/sample.vcf.count.log".into(),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "COMPLETED");
        assert_eq!(json["result_key"], "u1/J1/sample.annot.vcf");
        assert!(record.is_consistent());
    }

    #[test]
    fn completed_without_fields_is_inconsistent() {
        let mut record = JobRecord::pending(&submission(), Utc::now());
        record.status = JobStatus::Completed;
        assert!(!record.is_consistent());
    }

    #[test]
    fn lease_expiry_only_applies_to_owned_running_jobs() {
        let now = Utc::now();
        let mut record = JobRecord::pending(&submission(), now);
        record.lease_expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(!record.lease_expired(now), "pending jobs have no lease");

        record.status = JobStatus::Running;
        record.lease_owner = Some("attempt-1".into());
        assert!(record.lease_expired(now));

        record.lease_expires_at = Some(now + chrono::Duration::seconds(60));
        assert!(!record.lease_expired(now));

        record.lease_expires_at = None;
        assert!(!record.lease_expired(now), "unleased claims never expire");
    }
}
