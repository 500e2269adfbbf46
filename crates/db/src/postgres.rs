//! PostgreSQL job store.
//!
//! Every conditional transition is a single `UPDATE ... WHERE <condition>
//! RETURNING`, so the check and the write are atomic without explicit
//! transactions or row locks. Zero returned rows means the condition lost.

use async_trait::async_trait;
use gas_core::job::{Completion, JobRecord, JobStatus, Transition};
use gas_core::types::Timestamp;

use crate::models::job::JobRow;
use crate::store::{Claim, JobStore, StoreError};
use crate::DbPool;

/// Column list for `annotation_jobs` queries.
const COLUMNS: &str = "\
    job_id, user_id, user_name, user_email, user_role, \
    input_file_name, input_bucket, input_key, \
    status, submit_time, \
    complete_time, result_bucket, result_key, log_key, \
    lease_owner, lease_expires_at, attempts";

/// PostgreSQL unique violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Job store backed by the `annotation_jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Status of a job after a conditional write lost, to tell "someone else
    /// advanced it" apart from "it does not exist".
    async fn contended(&self, job_id: &str) -> Result<Transition, StoreError> {
        let observed: Option<String> =
            sqlx::query_scalar("SELECT status FROM annotation_jobs WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;

        match observed {
            Some(status) => Ok(Transition::Contended {
                observed: status.parse::<JobStatus>().ok(),
            }),
            None => Err(StoreError::NotFound(job_id.to_string())),
        }
    }

    fn into_records(rows: Vec<JobRow>) -> Result<Vec<JobRecord>, StoreError> {
        rows.into_iter().map(JobRecord::try_from).collect()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO annotation_jobs \
                 (job_id, user_id, user_name, user_email, user_role, \
                  input_file_name, input_bucket, input_key, status, submit_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&record.job_id)
        .bind(&record.user_id)
        .bind(&record.user_name)
        .bind(&record.user_email)
        .bind(&record.user_role)
        .bind(&record.input_file_name)
        .bind(&record.input_bucket)
        .bind(&record.input_key)
        .bind(JobStatus::Pending.as_str())
        .bind(record.submit_time)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(StoreError::AlreadyExists(record.job_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM annotation_jobs WHERE job_id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .map(JobRecord::try_from)
            .transpose()
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<JobRecord>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM annotation_jobs \
             WHERE user_id = $1 \
             ORDER BY submit_time DESC"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Self::into_records(rows)
    }

    async fn claim(&self, job_id: &str, claim: &Claim) -> Result<Transition, StoreError> {
        let query = format!(
            "UPDATE annotation_jobs \
             SET status = $2, lease_owner = $3, lease_expires_at = $4, \
                 attempts = attempts + 1 \
             WHERE job_id = $1 \
               AND (status = $5 OR (status = $2 AND lease_owner IS NULL)) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .bind(JobStatus::Running.as_str())
            .bind(&claim.owner)
            .bind(claim.lease_expires_at)
            .bind(JobStatus::Pending.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Transition::Applied(row.try_into()?)),
            None => self.contended(job_id).await,
        }
    }

    async fn renew_lease(
        &self,
        job_id: &str,
        owner: &str,
        expires_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE annotation_jobs SET lease_expires_at = $3 \
             WHERE job_id = $1 AND lease_owner = $2 AND status = $4",
        )
        .bind(job_id)
        .bind(owner)
        .bind(expires_at)
        .bind(JobStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(
        &self,
        job_id: &str,
        owner: &str,
        completion: &Completion,
    ) -> Result<Transition, StoreError> {
        let query = format!(
            "UPDATE annotation_jobs \
             SET status = $3, complete_time = $4, result_bucket = $5, \
                 result_key = $6, log_key = $7, lease_expires_at = NULL \
             WHERE job_id = $1 AND lease_owner = $2 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .bind(owner)
            .bind(JobStatus::Completed.as_str())
            .bind(completion.complete_time)
            .bind(&completion.result_bucket)
            .bind(&completion.result_key)
            .bind(&completion.log_key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Transition::Applied(row.try_into()?)),
            None => self.contended(job_id).await,
        }
    }

    async fn list_expired_leases(&self, now: Timestamp) -> Result<Vec<JobRecord>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM annotation_jobs \
             WHERE status = $1 AND lease_owner IS NOT NULL AND lease_expires_at <= $2 \
             ORDER BY lease_expires_at ASC"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Running.as_str())
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Self::into_records(rows)
    }

    async fn release_expired(
        &self,
        job_id: &str,
        owner: &str,
        now: Timestamp,
    ) -> Result<Transition, StoreError> {
        let query = format!(
            "UPDATE annotation_jobs \
             SET lease_owner = NULL, lease_expires_at = NULL \
             WHERE job_id = $1 AND status = $2 AND lease_owner = $3 \
               AND lease_expires_at <= $4 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .bind(JobStatus::Running.as_str())
            .bind(owner)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Transition::Applied(row.try_into()?)),
            None => self.contended(job_id).await,
        }
    }

    async fn list_stuck(
        &self,
        cutoff: Timestamp,
        now: Timestamp,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM annotation_jobs \
             WHERE (status = $1 AND submit_time < $3) \
                OR (status = $2 AND lease_owner IS NULL) \
                OR (status = $2 AND lease_expires_at <= $4) \
                OR (status = $2 AND lease_expires_at IS NULL AND submit_time < $3) \
             ORDER BY submit_time ASC"
        );
        let rows = sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Pending.as_str())
            .bind(JobStatus::Running.as_str())
            .bind(cutoff)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Self::into_records(rows)
    }
}
