//! What a worker is told to run.

use std::path::{Path, PathBuf};

use gas_core::error::CoreError;
use gas_core::types::JobId;

/// A staged job handed to a worker.
///
/// The input file lives at `{work_root}/{job_id}/{input_file_name}`; the
/// job id and file name are derived from that path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub job_id: JobId,
    pub input_path: PathBuf,
    pub input_file_name: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
}

impl JobRequest {
    /// Build a request from a staged input path, taking the job id from the
    /// parent directory name.
    pub fn from_input_path(
        input_path: impl Into<PathBuf>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        user_email: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let input_path = input_path.into();
        let (job_id, input_file_name) = parse_input_path(&input_path)?;
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(CoreError::Validation("user_id must not be empty".into()));
        }
        Ok(Self {
            job_id,
            input_path,
            input_file_name,
            user_id,
            user_name: user_name.into(),
            user_email: user_email.into(),
        })
    }

    /// Directory holding the staged input and the produced artifacts.
    pub fn job_dir(&self) -> Option<&Path> {
        self.input_path.parent()
    }
}

/// Split `.../{job_id}/{file_name}` into its job id and file name.
pub fn parse_input_path(path: &Path) -> Result<(JobId, String), CoreError> {
    let invalid = || CoreError::Validation(format!("Not a staged input path: {}", path.display()));

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(invalid)?;
    let job_id = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(invalid)?;

    Ok((job_id.to_string(), file_name.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn job_id_comes_from_parent_directory() {
        let req = JobRequest::from_input_path(
            "/srv/jobs/J1/sample.vcf",
            "u1",
            "Ada",
            "ada@example.com",
        )
        .unwrap();
        assert_eq!(req.job_id, "J1");
        assert_eq!(req.input_file_name, "sample.vcf");
        assert_eq!(req.job_dir(), Some(Path::new("/srv/jobs/J1")));
    }

    #[test]
    fn bare_file_name_is_rejected() {
        assert_matches!(
            parse_input_path(Path::new("sample.vcf")),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn empty_user_is_rejected() {
        assert!(JobRequest::from_input_path("/jobs/J1/a.vcf", "", "", "").is_err());
    }
}
