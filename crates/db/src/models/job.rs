//! Row mapping for the `annotation_jobs` table.

use chrono::{DateTime, Utc};
use gas_core::job::{Completion, JobRecord, JobStatus};
use sqlx::FromRow;

use crate::store::StoreError;

/// A raw row from the `annotation_jobs` table.
///
/// Converted into [`JobRecord`] with [`TryFrom`], which enforces that the
/// completion columns are all set or all null.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub job_id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub user_role: String,
    pub input_file_name: String,
    pub input_bucket: String,
    pub input_key: String,
    pub status: String,
    pub submit_time: DateTime<Utc>,
    pub complete_time: Option<DateTime<Utc>>,
    pub result_bucket: Option<String>,
    pub result_key: Option<String>,
    pub log_key: Option<String>,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub attempts: i32,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt {
            job_id: row.job_id.clone(),
            reason,
        };

        let status: JobStatus = row.status.parse().map_err(|e| corrupt(format!("{e}")))?;

        let completion = match (
            row.complete_time,
            row.result_bucket.clone(),
            row.result_key.clone(),
            row.log_key.clone(),
        ) {
            (Some(complete_time), Some(result_bucket), Some(result_key), Some(log_key)) => {
                Some(Completion {
                    complete_time,
                    result_bucket,
                    result_key,
                    log_key,
                })
            }
            (None, None, None, None) => None,
            _ => return Err(corrupt("partially written completion fields".into())),
        };

        let record = JobRecord {
            job_id: row.job_id.clone(),
            user_id: row.user_id,
            user_name: row.user_name,
            user_email: row.user_email,
            user_role: row.user_role,
            input_file_name: row.input_file_name,
            input_bucket: row.input_bucket,
            input_key: row.input_key,
            status,
            submit_time: row.submit_time,
            completion,
            lease_owner: row.lease_owner,
            lease_expires_at: row.lease_expires_at,
            attempts: row.attempts,
        };

        if !record.is_consistent() {
            return Err(StoreError::Corrupt {
                job_id: record.job_id,
                reason: format!("status {} disagrees with completion fields", record.status),
            });
        }
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
