//! Engine error types.
//!
//! Precondition-failed and not-modified are NOT errors here: the
//! conditional-get check returns them as explicit [`crate::Fetched`]
//! variants instead of using errors for flow control.

use strata_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the gateway engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A concurrent mutation was detected mid-operation.
    #[error("conflict on {container}/{name}: {reason}")]
    Conflict {
        /// Container of the contended object.
        container: String,
        /// Name of the contended object.
        name: String,
        /// What was detected.
        reason: &'static str,
    },

    /// The operation is not supported and will never be retried.
    #[error("unsupported operation: {reason}")]
    Unsupported {
        /// Why the operation was rejected.
        reason: String,
    },

    /// Waiting for pending reconciliation to drain timed out.
    #[error("timeout: {operation} after {waited_ms}ms")]
    Timeout {
        /// What operation timed out.
        operation: &'static str,
        /// How long we waited.
        waited_ms: u64,
    },

    /// A near-tier entry carried the link tag but its payload did not
    /// decode as a link record.
    #[error("malformed link payload: {message}")]
    MalformedLink {
        /// Decoder message.
        message: String,
    },

    /// An underlying store failure, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Shorthand for reserved-namespace rejections.
    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }
}
