use thiserror::Error;

/// Failures that are not a property of the submitted code.
///
/// Compile errors, runtime errors and timeouts are ordinary outcomes and never
/// show up here; see `ExecutionOutcome`.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Workspace allocation, process spawn or pipe handling failed
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("problem not found: {0}")]
    ProblemNotFound(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),
}

impl EngineError {
    /// Whether the error reflects service health rather than the caller's input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            EngineError::Infrastructure(_) | EngineError::Collaborator(_)
        )
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(e: redis::RedisError) -> Self {
        EngineError::Collaborator(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
