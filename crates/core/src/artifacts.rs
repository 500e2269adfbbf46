//! Object-store key conventions for job inputs and outputs.
//!
//! Results live under `{namespace}/{user_id}/{job_id}/{artifact_name}`.
//! The annotator writes two artifacts next to the staged input:
//! `{base}.annot.vcf` and `{base}.vcf.count.log`, where `base` is the input
//! file name without its extension.

use crate::error::CoreError;

/// Suffix of the annotated result file.
pub const RESULT_SUFFIX: &str = ".annot.vcf";

/// Suffix of the annotator's count log.
pub const LOG_SUFFIX: &str = ".vcf.count.log";

/// Separator between job id and file name in front-end input keys.
const INPUT_KEY_SEPARATOR: char = '~';

/// Input file name without its final extension (`sample.vcf` → `sample`).
pub fn base_name(input_file_name: &str) -> &str {
    match input_file_name.rfind('.') {
        Some(0) | None => input_file_name,
        Some(idx) => &input_file_name[..idx],
    }
}

/// File name of the annotated result for `input_file_name`.
pub fn result_file_name(input_file_name: &str) -> String {
    format!("{}{RESULT_SUFFIX}", base_name(input_file_name))
}

/// File name of the count log for `input_file_name`.
pub fn log_file_name(input_file_name: &str) -> String {
    format!("{}{LOG_SUFFIX}", base_name(input_file_name))
}

/// Builds deterministic result keys under an optional namespace prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactKeys {
    namespace: String,
}

impl ArtifactKeys {
    /// `namespace` may be empty; surrounding slashes are ignored.
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace: String = namespace.into();
        Self {
            namespace: namespace.trim_matches('/').to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `{namespace}/{user_id}/{job_id}/{artifact_name}`.
    pub fn key(&self, user_id: &str, job_id: &str, artifact_name: &str) -> String {
        if self.namespace.is_empty() {
            format!("{user_id}/{job_id}/{artifact_name}")
        } else {
            format!("{}/{user_id}/{job_id}/{artifact_name}", self.namespace)
        }
    }

    pub fn result_key(&self, user_id: &str, job_id: &str, input_file_name: &str) -> String {
        self.key(user_id, job_id, &result_file_name(input_file_name))
    }

    pub fn log_key(&self, user_id: &str, job_id: &str, input_file_name: &str) -> String {
        self.key(user_id, job_id, &log_file_name(input_file_name))
    }
}

// ---------------------------------------------------------------------------
// Input keys
// ---------------------------------------------------------------------------

/// Components of an uploaded input key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputKey {
    pub user_id: String,
    pub job_id: String,
    pub file_name: String,
}

/// Parse a front-end upload key of the form
/// `[{namespace}/]{user_id}/{job_id}~{file_name}`.
pub fn parse_input_key(key: &str) -> Result<InputKey, CoreError> {
    let invalid = || CoreError::Validation(format!("Malformed input key '{key}'"));

    let mut segments = key.rsplit('/');
    let object_name = segments.next().ok_or_else(invalid)?;
    let user_id = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let (job_id, file_name) = object_name
        .split_once(INPUT_KEY_SEPARATOR)
        .ok_or_else(invalid)?;

    if job_id.is_empty() || file_name.is_empty() {
        return Err(invalid());
    }

    Ok(InputKey {
        user_id: user_id.to_string(),
        job_id: job_id.to_string(),
        file_name: file_name.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
