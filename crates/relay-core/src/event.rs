//! Event records drained from the application's outbound queue.

use serde::{Deserialize, Serialize};

/// Identifier of a queued event row.
pub type EventId = i64;

/// One pending message from the event queue.
///
/// The relay never mutates records; delivery state is tracked by the
/// owning [`EventSource`](crate::EventSource) via its mark-sent
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Row identifier, used for the mark-sent id list
    pub id: EventId,

    /// UTF-8 message to broadcast verbatim
    pub message: String,
}

impl EventRecord {
    /// Creates a new event record.
    pub fn new(id: EventId, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_construction() {
        let record = EventRecord::new(7, "ping");
        assert_eq!(record.id, 7);
        assert_eq!(record.message, "ping");
    }

    #[test]
    fn test_record_json_shape() {
        let record = EventRecord::new(1, "hello");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":1,"message":"hello"}"#);

        let back: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
