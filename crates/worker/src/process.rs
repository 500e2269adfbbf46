//! One worker process per job.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::launcher::{LaunchError, Launcher};
use crate::request::JobRequest;

/// Spawns the `gas-worker` binary as
/// `gas-worker <input_path> <user_id> <user_name> <user_email>`.
///
/// The child inherits stdout/stderr and outlives the launch call; a
/// background task reaps it and logs its exit status.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    binary: PathBuf,
}

impl ProcessLauncher {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, request: &JobRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(&request.input_path)
            .arg(&request.user_id)
            .arg(&request.user_name)
            .arg(&request.user_email)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, request: JobRequest) -> Result<(), LaunchError> {
        let mut child = self.command(&request).spawn()?;
        let pid = child.id();
        tracing::info!(job_id = %request.job_id, pid, "Worker process spawned");

        let job_id = request.job_id;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::debug!(job_id = %job_id, "Worker process exited");
                }
                Ok(status) => {
                    tracing::error!(
                        job_id = %job_id,
                        exit_code = status.code().unwrap_or(-1),
                        "Worker process failed",
                    );
                }
                Err(e) => tracing::error!(job_id = %job_id, error = %e, "Failed to wait for worker process"),
            }
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
