//! Route definitions for the job monitoring resources.

use axum::routing::get;
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted under `/api/v1`.
///
/// ```text
/// GET /jobs/stuck?older_than_secs=N   -> list_stuck_jobs
/// GET /jobs/{job_id}                  -> get_job
/// GET /users/{user_id}/jobs           -> list_user_jobs
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/stuck", get(jobs::list_stuck_jobs))
        .route("/jobs/{job_id}", get(jobs::get_job))
        .route("/users/{user_id}/jobs", get(jobs::list_user_jobs))
}
