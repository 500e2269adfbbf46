use std::sync::Arc;

use gas_db::{DbPool, JobStore};

/// Shared state of the monitoring routes. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Job records, read-only from the routes' point of view.
    pub store: Arc<dyn JobStore>,
    /// Connection pool behind `store`, probed by `/health`. `None` when the
    /// store is not database-backed.
    pub pool: Option<DbPool>,
}
