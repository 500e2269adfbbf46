//! Domain errors and the failure taxonomy shared by every pipeline stage.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// Failure taxonomy
// ---------------------------------------------------------------------------

/// How a caller should react to a failed operation.
///
/// Every error type in the workspace maps itself onto one of these classes
/// via [`Classify`], so loops can decide between log-and-continue, abandon
/// this job, or abort the process without matching on concrete variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network, queue, object-store or table call failed. Retry later.
    Transient,
    /// A conditional write lost to another writer. Not an error.
    Contention,
    /// The annotation task itself failed. The job stays non-COMPLETED.
    Task,
    /// Disk or local filesystem failure for a single job attempt.
    LocalIo,
    /// Bad input or broken invariant. Retrying will not help.
    Fatal,
}

impl ErrorClass {
    /// Whether the same operation may succeed if attempted again later.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::LocalIo)
    }
}

/// Map an error onto the pipeline failure taxonomy.
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

impl Classify for CoreError {
    fn class(&self) -> ErrorClass {
        match self {
            CoreError::Conflict(_) => ErrorClass::Contention,
            CoreError::NotFound { .. } | CoreError::Validation(_) | CoreError::Internal(_) => {
                ErrorClass::Fatal
            }
        }
    }
}

impl Classify for std::io::Error {
    fn class(&self) -> ErrorClass {
        ErrorClass::LocalIo
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_contention() {
        let err = CoreError::Conflict("job J1 already exists".into());
        assert_eq!(err.class(), ErrorClass::Contention);
        assert!(!err.class().is_retryable());
    }

    #[test]
    fn validation_is_fatal() {
        let err = CoreError::Validation("bad".into());
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[test]
    fn io_errors_are_local_and_retryable() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(err.class(), ErrorClass::LocalIo);
        assert!(err.class().is_retryable());
    }

    #[test]
    fn not_found_display() {
        let err = CoreError::NotFound {
            entity: "job",
            id: "J1".into(),
        };
        assert_eq!(err.to_string(), "Entity not found: job with id J1");
    }
}
