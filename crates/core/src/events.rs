//! Wire formats of the two pipeline events.
//!
//! Field names are part of the external contract with the front end and the
//! notification consumers and must not be renamed.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::JobRecord;
use crate::types::JobId;

/// Subject attached to submission events on the notification channel.
pub const SUBMISSION_SUBJECT: &str = "New Annotation Job Request";

/// Subject attached to completion events on the notification channel.
pub const COMPLETION_SUBJECT: &str = "New Annotation Job Results";

// ---------------------------------------------------------------------------
// SubmissionEvent
// ---------------------------------------------------------------------------

/// Published by the front end when a job is created; consumed by the
/// dispatcher through the work queue.
///
/// Unknown fields (e.g. `user_institution`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionEvent {
    pub job_id: JobId,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub user_role: String,
    pub input_file_name: String,
    /// Source object-store bucket.
    pub s3_inputs_bucket: String,
    /// Source object-store key.
    pub s3_key_input_file: String,
}

impl SubmissionEvent {
    /// Rebuild the submission event from a stored record, used when a job
    /// with an expired lease is put back on the work queue.
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            user_id: record.user_id.clone(),
            user_name: record.user_name.clone(),
            user_email: record.user_email.clone(),
            user_role: record.user_role.clone(),
            input_file_name: record.input_file_name.clone(),
            s3_inputs_bucket: record.input_bucket.clone(),
            s3_key_input_file: record.input_key.clone(),
        }
    }

    /// Reject events that cannot be staged safely.
    ///
    /// `job_id` and `user_id` become directory and key components, and
    /// `input_file_name` becomes a file inside the job directory, so none of
    /// them may contain path separators or be `.`/`..`.
    pub fn validate(&self) -> Result<(), CoreError> {
        require_path_segment("job_id", &self.job_id)?;
        require_path_segment("user_id", &self.user_id)?;
        require_path_segment("input_file_name", &self.input_file_name)?;
        if self.s3_inputs_bucket.trim().is_empty() || self.s3_key_input_file.trim().is_empty() {
            return Err(CoreError::Validation(
                "Submission event must name a source bucket and key".to_string(),
            ));
        }
        Ok(())
    }
}

/// Helper: ensure `value` is usable as a single path segment.
fn require_path_segment(field: &str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() || value == "." || value == ".." {
        return Err(CoreError::Validation(format!(
            "Field '{field}' must be a non-empty name"
        )));
    }
    if value.contains(['/', '\\', '\0']) {
        return Err(CoreError::Validation(format!(
            "Field '{field}' must not contain path separators: '{value}'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CompletionEvent
// ---------------------------------------------------------------------------

/// Published by the worker after the job record is COMPLETED; consumed by
/// the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub job_id: JobId,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub user_email: String,
}

impl CompletionEvent {
    pub fn for_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            user_id: record.user_id.clone(),
            user_name: record.user_name.clone(),
            user_email: record.user_email.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sample() -> SubmissionEvent {
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
    fn submission_parses_front_end_payload() {
        let json = serde_json::json!({
            "job_id": "J1",
            "user_id": "u1",
            "input_file_name": "sample.vcf",
            "s3_inputs_bucket": "in-bkt",
            "s3_key_input_file": "u1/J1~sample.vcf",
            "user_institution": "UChicago"
        });
        let event: SubmissionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.job_id, "J1");
        assert_eq!(event.s3_key_input_file, "u1/J1~sample.vcf");
        assert!(event.user_email.is_empty());
    }

    #[test]
    fn submission_missing_bucket_is_rejected_by_serde() {
        let json = serde_json::json!({
            "job_id": "J1",
            "user_id": "u1",
            "input_file_name": "sample.vcf",
            "s3_key_input_file": "u1/J1~sample.vcf"
        });
        assert!(serde_json::from_value::<SubmissionEvent>(json).is_err());
    }

    #[test]
    fn validate_accepts_plain_names() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn validate_rejects_traversal_in_file_name() {
        let mut event = sample();
        event.input_file_name = "../../etc/passwd".into();
        assert_matches!(event.validate(), Err(CoreError::Validation(_)));

        let mut event = sample();
        event.job_id = "..".into();
        assert_matches!(event.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn completion_event_wire_shape() {
        let event = CompletionEvent {
            job_id: "J1".into(),
            user_id: "u1".into(),
            user_name: "Ada".into(),
            user_email: "ada@example.com".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "job_id": "J1",
                "user_id": "u1",
                "user_name": "Ada",
                "user_email": "ada@example.com"
            })
        );
    }
}
