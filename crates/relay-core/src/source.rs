//! The event source boundary polled by the relay loop.
//!
//! The surrounding application appends rows to an outbound queue; the
//! daemon drains it once per tick and flips a sent flag by id list.
//! Mark-sent is idempotent, so a failed call simply leaves the rows
//! eligible for rebroadcast on the next poll (at-least-once delivery).

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::EventSourceResult;
use crate::event::{EventId, EventRecord};

/// A queue of pending broadcast messages owned by the application.
///
/// The relay calls `get_unsent` once per tick and `update_sent` for
/// every batch it managed to broadcast. Implementations must treat
/// `update_sent` as idempotent: marking an already-sent or unknown id
/// is a no-op, never an error.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Returns all rows not yet marked sent, in insertion order.
    async fn get_unsent(&self) -> EventSourceResult<Vec<EventRecord>>;

    /// Flips the sent flag for the given ids.
    async fn update_sent(&self, ids: &[EventId]) -> EventSourceResult<()>;
}

/// Row state inside the in-process queue.
#[derive(Debug)]
struct Row {
    record: EventRecord,
    sent: bool,
}

/// In-process event queue backed by a mutex'd vec.
///
/// Producers call [`push`](MemoryEventSource::push) from any thread;
/// the relay loop drains it through the [`EventSource`] trait.
#[derive(Debug, Default)]
pub struct MemoryEventSource {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: EventId,
    rows: Vec<Row>,
}

impl MemoryEventSource {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns its assigned id.
    pub fn push(&self, message: impl Into<String>) -> EventId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push(Row {
            record: EventRecord::new(id, message),
            sent: false,
        });
        debug!(event = id, "queued event");
        id
    }

    /// Number of rows not yet marked sent.
    pub fn pending(&self) -> usize {
        self.lock().rows.iter().filter(|row| !row.sent).count()
    }

    /// Recovers the queue even if a producer panicked mid-push.
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn get_unsent(&self) -> EventSourceResult<Vec<EventRecord>> {
        let inner = self.lock();
        Ok(inner
            .rows
            .iter()
            .filter(|row| !row.sent)
            .map(|row| row.record.clone())
            .collect())
    }

    async fn update_sent(&self, ids: &[EventId]) -> EventSourceResult<()> {
        let mut inner = self.lock();
        for row in inner.rows.iter_mut() {
            if ids.contains(&row.record.id) {
                row.sent = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_then_get_unsent() {
        let source = MemoryEventSource::new();
        let first = source.push("one");
        let second = source.push("two");

        let unsent = source.get_unsent().await.unwrap();
        assert_eq!(unsent.len(), 2);
        assert_eq!(unsent[0], EventRecord::new(first, "one"));
        assert_eq!(unsent[1], EventRecord::new(second, "two"));
    }

    #[tokio::test]
    async fn test_update_sent_removes_from_unsent() {
        let source = MemoryEventSource::new();
        let first = source.push("one");
        source.push("two");

        source.update_sent(&[first]).await.unwrap();

        let unsent = source.get_unsent().await.unwrap();
        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].message, "two");
        assert_eq!(source.pending(), 1);
    }

    #[tokio::test]
    async fn test_update_sent_is_idempotent() {
        let source = MemoryEventSource::new();
        let id = source.push("one");

        source.update_sent(&[id]).await.unwrap();
        source.update_sent(&[id]).await.unwrap();
        // Unknown ids are a no-op, not an error
        source.update_sent(&[9999]).await.unwrap();

        assert_eq!(source.pending(), 0);
    }

    #[tokio::test]
    async fn test_unacknowledged_rows_reappear() {
        let source = MemoryEventSource::new();
        source.push("ping");

        // A broadcast without a following update_sent must leave the
        // row visible to the next poll.
        let first_poll = source.get_unsent().await.unwrap();
        let second_poll = source.get_unsent().await.unwrap();
        assert_eq!(first_poll, second_poll);
        assert_eq!(second_poll.len(), 1);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let source = MemoryEventSource::new();
        let a = source.push("a");
        let b = source.push("b");
        assert!(b > a);
    }
}
