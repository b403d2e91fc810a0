//! Error types for the core data model.

use thiserror::Error;

/// Errors raised while constructing or validating core records.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An operation was built with inconsistent fields.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A decision transition that the ledger never allows.
    #[error("invalid decision transition: {from} -> {to}")]
    InvalidDecision {
        /// Decision the operation currently holds.
        from: String,
        /// Decision that was requested.
        to: String,
    },

    /// IO error while hashing or reading a resource.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidDecision {
            from: "rejected".to_string(),
            to: "approved".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid decision transition: rejected -> approved"
        );
    }
}
