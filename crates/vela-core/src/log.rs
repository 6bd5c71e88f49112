//! The shared conversation log.
//!
//! Appending a conversation round does not create a new snapshot: the log
//! is a separately-owned append-only object shared by `Arc` across every
//! snapshot descended from a common ancestor, so an append is visible
//! retroactively to sibling snapshots. Clearing is different — it swaps in
//! a genuinely new log and goes through a snapshot transform so it stays
//! undoable. This is a deliberate exception to snapshot immutability.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Who produced a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The human driving the assistant.
    User,
    /// The language model.
    Assistant,
    /// Injected framing (welcome text, environment info).
    System,
}

/// One conversation message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Message author.
    pub role: Role,
    /// Message body.
    pub text: String,
}

impl HistoryMessage {
    /// Convenience constructor.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Append-only conversation log, shared by reference across snapshots.
#[derive(Debug, Default)]
pub struct ConversationLog {
    entries: Mutex<Vec<HistoryMessage>>,
}

impl ConversationLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log pre-filled with messages (used when loading from storage).
    #[must_use]
    pub fn with_entries(entries: Vec<HistoryMessage>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Append messages. Visible to every snapshot sharing this log.
    pub fn append(&self, messages: Vec<HistoryMessage>) {
        self.entries.lock().extend(messages);
    }

    /// An owned copy of the current entries.
    #[must_use]
    pub fn entries(&self) -> Vec<HistoryMessage> {
        self.entries.lock().clone()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
