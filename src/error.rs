//! Error types.
//!
//! Operation failures are never raised out of a controller; they are stored
//! in the snapshot's `error` field. Operations may use any cloneable error
//! type. [`QueryError`] is the default for callers that do not need their own.

use thiserror::Error;

/// Ready-made error type for operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Query failed: {0}")]
    Failed(String),

    #[error("Query cancelled")]
    Cancelled,
}

impl QueryError {
    /// Creates a [`QueryError::Failed`] from any displayable message.
    pub fn failed(message: impl ToString) -> Self {
        Self::Failed(message.to_string())
    }
}

/// Error returned when settling a [`MockOperation`](crate::mock::MockOperation) call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MockError {
    #[error("No call recorded at index {0}")]
    UnknownCall(usize),

    #[error("Call {0} was already settled")]
    AlreadySettled(usize),

    #[error("Call {0} is no longer awaited")]
    Abandoned(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display() {
        let err = QueryError::failed("boom");
        assert_eq!(err.to_string(), "Query failed: boom");

        let err = QueryError::Cancelled;
        assert_eq!(err.to_string(), "Query cancelled");
    }

    #[test]
    fn test_mock_error_display() {
        assert_eq!(
            MockError::UnknownCall(3).to_string(),
            "No call recorded at index 3"
        );
        assert_eq!(
            MockError::AlreadySettled(0).to_string(),
            "Call 0 was already settled"
        );
        assert_eq!(
            MockError::Abandoned(1).to_string(),
            "Call 1 is no longer awaited"
        );
    }
}
