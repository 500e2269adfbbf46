//! Read-only views of the job store for operators.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use gas_core::error::CoreError;
use gas_core::job::JobRecord;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Age after which a PENDING job counts as stuck when not given.
const DEFAULT_STUCK_AFTER_SECS: u64 = 3600;

/// Upper bound for `older_than_secs`, one year.
const MAX_STUCK_AFTER_SECS: u64 = 365 * 24 * 3600;

#[derive(Debug, Deserialize)]
pub struct StuckQuery {
    pub older_than_secs: Option<u64>,
}

/// GET /api/v1/jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<JobRecord>>> {
    let job = state
        .store
        .get(&job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/users/{user_id}/jobs
///
/// Newest submission first.
pub async fn list_user_jobs(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<DataResponse<Vec<JobRecord>>>> {
    let jobs = state.store.list_by_user(&user_id).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/stuck?older_than_secs=N
///
/// PENDING jobs submitted more than N seconds ago, RUNNING jobs with an
/// expired or released lease, and RUNNING jobs without a lease older than N.
pub async fn list_stuck_jobs(
    State(state): State<AppState>,
    Query(query): Query<StuckQuery>,
) -> AppResult<Json<DataResponse<Vec<JobRecord>>>> {
    let older_than = query.older_than_secs.unwrap_or(DEFAULT_STUCK_AFTER_SECS);
    if older_than > MAX_STUCK_AFTER_SECS {
        return Err(AppError::BadRequest(format!(
            "older_than_secs must not exceed {MAX_STUCK_AFTER_SECS}"
        )));
    }

    let now = Utc::now();
    let cutoff = now - chrono::Duration::seconds(older_than as i64);
    let jobs = state.store.list_stuck(cutoff, now).await?;
    if !jobs.is_empty() {
        tracing::warn!(count = jobs.len(), older_than_secs = older_than, "Stuck jobs listed");
    }
    Ok(Json(DataResponse { data: jobs }))
}
