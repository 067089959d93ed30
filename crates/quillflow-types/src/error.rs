use thiserror::Error;

/// Errors returned by envelope and workflow operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Required data is missing or malformed. Fixable by the caller.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Input is fine but the current state forbids the operation.
    #[error("operation not allowed: {0}")]
    BusinessLogic(String),

    /// Lock contention or a stale status. Safe to retry immediately.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("envelope not found")]
    NotFound,

    /// The caller's account context lacks the required capability.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EnvelopeError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EnvelopeError::Concurrency(_))
    }
}

impl From<RepositoryError> for EnvelopeError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => EnvelopeError::NotFound,
            RepositoryError::Conflict(msg) => EnvelopeError::Concurrency(msg),
            other => EnvelopeError::Storage(other.to_string()),
        }
    }
}

/// Errors from repository operations (used by trait definitions in quillflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    /// The persisted row no longer matches what the writer expected.
    #[error("conflict: {0}")]
    Conflict(String),
}
