//! Event source error types following panic-free policy.

use thiserror::Error;

/// Errors reported by an [`EventSource`](crate::EventSource).
///
/// All variants are non-fatal to the relay loop: a failed poll or
/// mark-sent is logged and retried on the next tick.
#[derive(Error, Debug, Clone)]
pub enum EventSourceError {
    /// Fetching unsent rows failed
    #[error("event source query failed: {0}")]
    Query(String),

    /// Marking rows as sent failed; the rows stay eligible for
    /// rebroadcast
    #[error("mark-sent rejected for {count} event(s)")]
    MarkSentRejected { count: usize },

    /// The backing store is unreachable
    #[error("event source unavailable: {0}")]
    Unavailable(String),
}

impl EventSourceError {
    /// Creates a query error from any displayable error.
    pub fn query<E: std::fmt::Display>(err: E) -> Self {
        Self::Query(err.to_string())
    }
}

/// Result type for event source operations.
pub type EventSourceResult<T> = Result<T, EventSourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EventSourceError::Query("connection reset".to_string());
        assert_eq!(err.to_string(), "event source query failed: connection reset");

        let err = EventSourceError::MarkSentRejected { count: 3 };
        assert_eq!(err.to_string(), "mark-sent rejected for 3 event(s)");

        let err = EventSourceError::Unavailable("no backend".to_string());
        assert_eq!(err.to_string(), "event source unavailable: no backend");
    }

    #[test]
    fn test_query_helper() {
        let err = EventSourceError::query("boom");
        assert!(matches!(err, EventSourceError::Query(_)));
    }
}
