//! Annotation job execution.
//!
//! [`Worker`] drives one job from PENDING to COMPLETED: claim, run the
//! annotator under a lease, upload artifacts, commit, publish. Everything
//! around it decides *where* that happens:
//!
//! - [`WorkerPool`]: bounded in-process execution, the default.
//! - [`ProcessLauncher`]: one `gas-worker` process per job.

pub mod bootstrap;
pub mod error;
pub mod launcher;
pub mod pool;
pub mod process;
pub mod request;
pub mod retry;
pub mod worker;

pub use error::WorkerError;
pub use launcher::{LaunchError, Launcher};
pub use pool::{JobHandle, WorkerPool};
pub use process::ProcessLauncher;
pub use request::JobRequest;
pub use worker::{Worker, WorkerOutcome};
