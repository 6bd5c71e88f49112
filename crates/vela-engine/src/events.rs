//! Broadcast-based event emitter for `EngineEvent` dispatch.
//!
//! The engine pushes no state to observers: a [`EngineEvent::HistoryChanged`]
//! carries only the kind of change, and subscribers pull the current
//! snapshot from the manager when they care.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

/// What kind of history mutation happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryChangeKind {
    /// A new snapshot became the top.
    Pushed,
    /// One or more snapshots were undone.
    Undone,
    /// An undone snapshot was re-applied.
    Redone,
    /// A snapshot was substituted in place.
    Replaced,
}

/// Engine-level notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// The history changed; pull the new top if needed.
    HistoryChanged {
        /// The kind of change.
        kind: HistoryChangeKind,
    },
    /// A pooled task failed.
    TaskFailed {
        /// Task description as submitted.
        description: String,
        /// Failure message.
        message: String,
    },
    /// Informational message for the user surface.
    Notice {
        /// The message.
        message: String,
    },
}

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast-based event emitter.
///
/// Non-blocking: `emit` never awaits. Slow receivers will be dropped
/// (lagged) rather than blocking the sender.
pub struct EventEmitter {
    tx: broadcast::Sender<EngineEvent>,
    emit_count: AtomicU64,
}

impl EventEmitter {
    /// Create a new emitter with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new emitter with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            emit_count: AtomicU64::new(0),
        }
    }

    /// Emit an event to all subscribers. Non-blocking.
    ///
    /// Returns the number of receivers that received the event;
    /// 0 if there are no active subscribers.
    pub fn emit(&self, event: EngineEvent) -> usize {
        let _ = self.emit_count.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Total number of events emitted.
    pub fn emit_count(&self) -> u64 {
        self.emit_count.load(Ordering::Relaxed)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_with_no_subscribers() {
        let emitter = EventEmitter::new();
        let count = emitter.emit(EngineEvent::Notice {
            message: "hello".into(),
        });
        assert_eq!(count, 0);
        assert_eq!(emitter.emit_count(), 1);
    }

    #[tokio::test]
    async fn emit_and_receive() {
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();

        let count = emitter.emit(EngineEvent::HistoryChanged {
            kind: HistoryChangeKind::Pushed,
        });
        assert_eq!(count, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(
            received,
            EngineEvent::HistoryChanged {
                kind: HistoryChangeKind::Pushed
            }
        );
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let emitter = EventEmitter::new();
        let mut rx1 = emitter.subscribe();
        let mut rx2 = emitter.subscribe();
        assert_eq!(emitter.subscriber_count(), 2);

        let count = emitter.emit(EngineEvent::Notice { message: "n".into() });
        assert_eq!(count, 2);
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn dropped_slow_receiver() {
        let emitter = EventEmitter::with_capacity(2);
        let mut rx = emitter.subscribe();

        for _ in 0..3 {
            let _ = emitter.emit(EngineEvent::Notice { message: "n".into() });
        }
        // Receiver should be lagged
        assert!(rx.recv().await.is_err());
    }

    #[test]
    fn subscriber_count_tracks_drops() {
        let emitter = EventEmitter::new();
        assert_eq!(emitter.subscriber_count(), 0);
        let rx = emitter.subscribe();
        assert_eq!(emitter.subscriber_count(), 1);
        drop(rx);
        assert_eq!(emitter.subscriber_count(), 0);
    }
}
