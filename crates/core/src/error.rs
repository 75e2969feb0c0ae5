use thiserror::Error;

/// Errors raised by task lifecycle operations before any state is mutated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Rejected input (empty uid, non-positive target, unknown mode).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// No task with the given id.
    #[error("task not found: {0}")]
    NotFound(String),
}
