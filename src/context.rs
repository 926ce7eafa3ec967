//! External context store boundary
//!
//! Consumers (AI-context panes, clipboard bridges) receive resolved command
//! records through [`ContextStore`]. Writes are fire-and-forget from the
//! engine's point of view: a failing store never propagates back into the
//! event-handling path.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a captured record contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextItemKind {
    /// Command text only (the command produced no output text).
    Command,
    /// Command text plus its output.
    CommandOutput,
}

/// One exported command record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    /// Provenance id for the consumer.
    pub id: Uuid,
    /// Record shape.
    pub kind: ContextItemKind,
    /// Resolved command text.
    pub command: String,
    /// Resolved output text, empty for command-only records.
    pub output: String,
    /// Exit code at capture time, if the block had finalized.
    pub exit_code: Option<i32>,
    /// Synthetic capture timestamp; strictly increasing within one batch so
    /// consumers preserve ordering.
    pub captured_at_ms: u64,
}

impl ContextItem {
    /// Combined text the consumer would render or copy.
    pub fn combined_text(&self) -> String {
        match self.kind {
            ContextItemKind::Command => self.command.clone(),
            ContextItemKind::CommandOutput => format!("{}\n{}", self.command, self.output),
        }
    }
}

/// Destination for captured records.
pub trait ContextStore {
    /// Add a full record.
    fn add(&self, item: ContextItem) -> Result<(), String>;

    /// Simpler unscanned fallback: plain text with no metadata. Used when
    /// [`ContextStore::add`] fails.
    fn add_text(&self, text: String) -> Result<(), String>;
}

/// In-memory context store.
///
/// Trait methods take `&self` (the store sits on an asynchronous boundary
/// for real consumers), so the backing vectors are mutex-guarded.
#[derive(Debug, Default)]
pub struct MemoryContextStore {
    items: Mutex<Vec<ContextItem>>,
    texts: Mutex<Vec<String>>,
}

impl MemoryContextStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored records.
    pub fn items(&self) -> Vec<ContextItem> {
        self.items.lock().clone()
    }

    /// Snapshot of fallback plain-text entries.
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

impl ContextStore for MemoryContextStore {
    fn add(&self, item: ContextItem) -> Result<(), String> {
        self.items.lock().push(item);
        Ok(())
    }

    fn add_text(&self, text: String) -> Result<(), String> {
        self.texts.lock().push(text);
        Ok(())
    }
}
