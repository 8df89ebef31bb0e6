//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by an object-store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named object does not exist.
    #[error("object not found: {container}/{name}")]
    NotFound {
        /// Container the lookup ran against.
        container: String,
        /// The missing object name.
        name: String,
    },

    /// The named container does not exist.
    #[error("container not found: {container}")]
    ContainerNotFound {
        /// The missing container.
        container: String,
    },

    /// Transient backend condition; callers may retry on a later pass.
    #[error("service unavailable during {operation}")]
    ServiceUnavailable {
        /// What operation hit the condition.
        operation: &'static str,
    },

    /// I/O error.
    #[error("I/O error: {operation}: {message}")]
    Io {
        /// What operation was being performed.
        operation: &'static str,
        /// Error message.
        message: String,
    },
}

impl StoreError {
    /// Returns true for the transient backend condition that reconciliation
    /// treats as "try again on the next pass".
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }
}
