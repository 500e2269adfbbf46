//! Run the annotator as an external command.
//!
//! [`CommandTask`] spawns `{program} {args...} {input_path}` with the job
//! directory as working directory, captures stdout/stderr, enforces the
//! optional timeout and verifies that both artifacts were produced.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::{AnnotationTask, TaskError, TaskOutput};

/// Maximum stdout or stderr size captured per stream (1 MiB).
///
/// The annotator writes its real log to the count-log artifact; captured
/// streams are only used for error reporting.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Annotator invoked as a child process.
#[derive(Debug, Clone)]
pub struct CommandTask {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandTask {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl AnnotationTask for CommandTask {
    async fn run(&self, input: &Path) -> Result<TaskOutput, TaskError> {
        let job_dir = input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| TaskError::InvalidInput(input.to_path_buf()))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(input).current_dir(job_dir);

        let start = Instant::now();
        run_command(&mut cmd, self.timeout).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let output = TaskOutput::expected_for(input, duration_ms)
            .ok_or_else(|| TaskError::InvalidInput(input.to_path_buf()))?;
        for path in [&output.result_path, &output.log_path] {
            ensure_exists(path).await?;
        }
        Ok(output)
    }
}

async fn ensure_exists(path: &PathBuf) -> Result<(), TaskError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(TaskError::MissingOutput(path.clone())),
    }
}

/// Spawn `cmd`, capture its output and wait for it under `timeout`.
///
/// The child is spawned with `kill_on_drop(true)` so that dropping the
/// returned future (timeout or cancellation by the caller) kills it.
async fn run_command(cmd: &mut Command, timeout: Option<Duration>) -> Result<(), TaskError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_elapsed) => {
                return Err(TaskError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
        },
        None => child.wait().await?,
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    tracing::debug!(
        exit_code = status.code().unwrap_or(-1),
        stdout_bytes = stdout.len(),
        "Annotator process exited",
    );

    if !status.success() {
        return Err(TaskError::Failed {
            exit_code: status.code().unwrap_or(-1),
            stderr,
        });
    }
    Ok(())
}

/// Read an output stream to its end, keeping the first [`MAX_OUTPUT_BYTES`].
///
/// The rest is drained and discarded so a chatty child never blocks on or
/// dies from a closed pipe.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    /// Shell snippet that behaves like the annotator: writes both artifacts
    /// next to the input passed as `$0`.
    const FAKE_ANNOTATOR: &str = r#"
        base="${0%.*}"
        echo "annotated" > "$base.annot.vcf"
        echo "count: 1" > "$base.vcf.count.log"
    "#;

    async fn staged_input() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sample.vcf");
        tokio::fs::write(&input, "##fileformat=VCFv4.1\n").await.unwrap();
        (dir, input)
    }

    fn sh(script: &str, timeout: Option<Duration>) -> CommandTask {
        CommandTask::new("sh", vec!["-c".into(), script.into()], timeout)
    }

    #[tokio::test]
    async fn successful_run_reports_both_artifacts() {
        let (_dir, input) = staged_input().await;
        let output = sh(FAKE_ANNOTATOR, None).run(&input).await.unwrap();
        assert!(output.result_path.ends_with("sample.annot.vcf"));
        assert!(output.log_path.ends_with("sample.vcf.count.log"));
    }

    #[tokio::test]
    async fn output_past_the_capture_limit_does_not_break_the_annotator() {
        let (_dir, input) = staged_input().await;
        let script = format!(
            "head -c {} /dev/zero || exit 9\n{FAKE_ANNOTATOR}",
            MAX_OUTPUT_BYTES * 3
        );
        let output = sh(&script, None).run(&input).await.unwrap();
        assert!(output.result_path.exists());
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_task_failure() {
        let (_dir, input) = staged_input().await;
        let result = sh("echo boom >&2; exit 3", None).run(&input).await;
        assert_matches!(
            result,
            Err(TaskError::Failed { exit_code: 3, stderr }) if stderr.contains("boom")
        );
    }

    #[tokio::test]
    async fn success_without_artifacts_is_missing_output() {
        let (_dir, input) = staged_input().await;
        let result = sh("true", None).run(&input).await;
        assert_matches!(result, Err(TaskError::MissingOutput(_)));
    }

    #[tokio::test]
    async fn slow_annotator_times_out() {
        let (_dir, input) = staged_input().await;
        let result = sh("sleep 5", Some(Duration::from_millis(100)))
            .run(&input)
            .await;
        assert_matches!(result, Err(TaskError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let (_dir, input) = staged_input().await;
        let task = CommandTask::new("/nonexistent/annotator", vec![], None);
        assert_matches!(task.run(&input).await, Err(TaskError::Io(_)));
    }
}
