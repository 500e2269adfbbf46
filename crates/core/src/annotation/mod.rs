//! The opaque, long-running annotation task.
//!
//! The pipeline never looks inside the annotator: it hands it a staged input
//! file and expects the result and count log to appear next to it. This
//! module defines that contract ([`AnnotationTask`]) and the production
//! implementation that runs an external command ([`CommandTask`]).

pub mod command;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::artifacts;
use crate::error::{Classify, ErrorClass};

pub use command::CommandTask;

/// Files produced by a successful annotation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub result_path: PathBuf,
    pub log_path: PathBuf,
    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,
}

impl TaskOutput {
    /// Expected output locations for a staged input, per the artifact naming
    /// convention.
    pub fn expected_for(input: &Path, duration_ms: u64) -> Option<Self> {
        let dir = input.parent()?;
        let file_name = input.file_name()?.to_str()?;
        Some(Self {
            result_path: dir.join(artifacts::result_file_name(file_name)),
            log_path: dir.join(artifacts::log_file_name(file_name)),
            duration_ms,
        })
    }
}

/// Errors from the annotation task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The process could not be spawned or awaited.
    #[error("Annotator I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The annotator exited with a non-zero status.
    #[error("Annotator failed with exit code {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },

    /// The annotator ran longer than the configured timeout and was killed.
    #[error("Annotator timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The annotator reported success but an expected artifact is missing.
    #[error("Annotator output missing: {0}")]
    MissingOutput(PathBuf),

    /// The input path does not have the `<job dir>/<file name>` shape.
    #[error("Invalid input path: {0}")]
    InvalidInput(PathBuf),
}

impl Classify for TaskError {
    fn class(&self) -> ErrorClass {
        match self {
            TaskError::Io(_) => ErrorClass::LocalIo,
            TaskError::InvalidInput(_) => ErrorClass::Fatal,
            TaskError::Failed { .. } | TaskError::Timeout { .. } | TaskError::MissingOutput(_) => {
                ErrorClass::Task
            }
        }
    }
}

/// An annotation run over a single staged input file.
#[async_trait]
pub trait AnnotationTask: Send + Sync {
    /// Annotate `input` and return the paths of the produced artifacts.
    ///
    /// Dropping the returned future must stop the underlying work.
    async fn run(&self, input: &Path) -> Result<TaskOutput, TaskError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_outputs_sit_next_to_the_input() {
        let out = TaskOutput::expected_for(Path::new("/work/J1/sample.vcf"), 12).unwrap();
        assert_eq!(out.result_path, Path::new("/work/J1/sample.annot.vcf"));
        assert_eq!(out.log_path, Path::new("/work/J1/sample.vcf.count.log"));
        assert_eq!(out.duration_ms, 12);
    }

    #[test]
    fn task_errors_classify() {
        assert_eq!(
            TaskError::Failed {
                exit_code: 2,
                stderr: String::new()
            }
            .class(),
            ErrorClass::Task
        );
        assert_eq!(
            TaskError::InvalidInput(PathBuf::from("x")).class(),
            ErrorClass::Fatal
        );
    }
}
