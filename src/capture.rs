//! Capture and query API
//!
//! Read-side operations over the registry: history listing, capture-last-N
//! batch export, per-line copy/jump, and the fire-and-forget handoff to an
//! external context store. Callers always receive copies of resolved data,
//! never references into registry internals.

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::block::{BlockId, LineRange};
use crate::context::{ContextItem, ContextItemKind, ContextStore};
use crate::error::RegistryError;
use crate::registry::{unix_millis, MarkerRegistry};
use crate::resolve::text_for_range;
use crate::surface::BufferSurface;

/// One row of the command history listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The block this entry describes.
    pub block_id: BlockId,
    /// Resolved command text.
    pub command: String,
    /// Exit code, `None` while running or when completion was lost.
    pub exit_code: Option<i32>,
    /// Block creation timestamp (unix millis).
    pub timestamp_ms: u64,
    /// Whether the block has an observable output region.
    pub has_output: bool,
}

/// Record handed to the context-menu UI for one selected block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyMenuRecord {
    /// The selected block.
    pub block_id: BlockId,
    /// Command text range.
    pub command_range: LineRange,
    /// Output range, when output exists.
    pub output_range: Option<LineRange>,
    /// Bootstrap blocks are never interactable.
    pub disabled: bool,
    /// Exit code, if finalized.
    pub exit_code: Option<i32>,
    /// Duration in milliseconds, if finalized.
    pub duration_ms: Option<u64>,
}

/// Aggregate statistics over finalized commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Finalized non-bootstrap commands.
    pub total_commands: usize,
    /// Commands with exit code 0.
    pub successful_commands: usize,
    /// Commands with a non-zero exit code.
    pub failed_commands: usize,
    /// Average duration over finalized commands.
    pub avg_duration_ms: f64,
}

impl MarkerRegistry {
    /// Every non-bootstrap block with non-empty resolved command text, in
    /// start-line order.
    pub fn history(&self, surface: &dyn BufferSurface) -> Vec<HistoryEntry> {
        self.iter()
            .filter(|block| !block.is_bootstrap)
            .filter_map(|block| {
                let resolved = self.resolve(block.id, surface)?;
                let command = text_for_range(resolved.command, surface);
                if command.trim().is_empty() {
                    return None;
                }
                Some(HistoryEntry {
                    block_id: block.id,
                    command,
                    exit_code: block.exit_code,
                    timestamp_ms: block.start_time,
                    has_output: resolved.has_output(),
                })
            })
            .collect()
    }

    /// Export the last `n` output-bearing blocks, oldest first.
    ///
    /// Blocks without a recorded output-start anchor are skipped when
    /// counting. Each record gets a strictly increasing synthetic capture
    /// timestamp so consumers preserve ordering.
    pub fn capture_last(&self, n: usize, surface: &dyn BufferSurface) -> Vec<ContextItem> {
        let eligible: Vec<BlockId> = self
            .iter()
            .filter(|b| !b.is_bootstrap && b.output_anchor.is_some())
            .map(|b| b.id)
            .collect();
        let selected = &eligible[eligible.len().saturating_sub(n)..];

        let base = unix_millis();
        selected
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                let item = self.context_item(*id, surface)?;
                Some(ContextItem {
                    captured_at_ms: base + i as u64,
                    ..item
                })
            })
            .collect()
    }

    /// Build a context item for one block.
    fn context_item(&self, id: BlockId, surface: &dyn BufferSurface) -> Option<ContextItem> {
        let block = self.get(id)?;
        let resolved = self.resolve(id, surface)?;
        let command = text_for_range(resolved.command, surface);
        let output = resolved
            .output
            .map(|range| text_for_range(range, surface))
            .unwrap_or_default();
        let kind = if output.trim().is_empty() {
            ContextItemKind::Command
        } else {
            ContextItemKind::CommandOutput
        };
        Some(ContextItem {
            id: Uuid::new_v4(),
            kind,
            command,
            output: if kind == ContextItemKind::Command {
                String::new()
            } else {
                output
            },
            exit_code: block.exit_code,
            captured_at_ms: unix_millis(),
        })
    }

    /// The block whose start anchor resolves to `line`.
    pub fn block_at_line(&self, line: usize, surface: &dyn BufferSurface) -> Option<BlockId> {
        self.iter()
            .find(|b| surface.resolve_line(b.start_anchor) == Some(line))
            .map(|b| b.id)
    }

    /// Concatenated command(+output) text for the block anchored at `line`.
    pub fn copy_text_at_line(
        &self,
        line: usize,
        surface: &dyn BufferSurface,
    ) -> Result<String, RegistryError> {
        let id = self
            .block_at_line(line, surface)
            .ok_or(RegistryError::NoBlockAtLine(line))?;
        let item = self
            .context_item(id, surface)
            .ok_or(RegistryError::AnchorDisposed(id))?;
        Ok(item.combined_text())
    }

    /// Resolved record for the context-menu UI.
    pub fn copy_menu_record(
        &self,
        id: BlockId,
        surface: &dyn BufferSurface,
    ) -> Result<CopyMenuRecord, RegistryError> {
        let block = self.get(id).ok_or(RegistryError::BlockNotFound(id))?;
        let resolved = self
            .resolve(id, surface)
            .ok_or(RegistryError::AnchorDisposed(id))?;
        Ok(CopyMenuRecord {
            block_id: id,
            command_range: resolved.command,
            output_range: resolved.output,
            disabled: resolved.disabled,
            exit_code: block.exit_code,
            duration_ms: block.duration_ms,
        })
    }

    /// Hand one block's resolved text to an external context store.
    ///
    /// Fire-and-forget: a store failure is logged and retried through the
    /// store's plain-text fallback; it never corrupts registry state and
    /// never propagates into the event path.
    pub fn add_to_context(
        &self,
        id: BlockId,
        store: &dyn ContextStore,
        surface: &dyn BufferSurface,
    ) -> Result<(), RegistryError> {
        let item = self
            .context_item(id, surface)
            .ok_or(RegistryError::BlockNotFound(id))?;
        let text = item.combined_text();
        if let Err(err) = store.add(item) {
            warn!(block_id = id, error = %err, "context store rejected record, using text fallback");
            store
                .add_text(text)
                .map_err(RegistryError::ContextStore)?;
        }
        Ok(())
    }

    /// Aggregate statistics over finalized non-bootstrap commands.
    pub fn stats(&self) -> RegistryStats {
        let finalized: Vec<_> = self
            .iter()
            .filter(|b| !b.is_bootstrap && !b.is_open())
            .collect();
        let total = finalized.len();
        let successful = finalized
            .iter()
            .filter(|b| b.exit_code == Some(0))
            .count();
        let failed = finalized
            .iter()
            .filter(|b| b.exit_code.is_some_and(|c| c != 0))
            .count();
        let total_ms: u64 = finalized.iter().filter_map(|b| b.duration_ms).sum();
        RegistryStats {
            total_commands: total,
            successful_commands: successful,
            failed_commands: failed,
            avg_duration_ms: if total > 0 {
                total_ms as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MemoryContextStore;
    use crate::event::MarkerEvent;
    use crate::surface::MemoryBuffer;

    fn prompt(line: usize) -> MarkerEvent {
        MarkerEvent::PromptStart {
            line,
            repl_command_id: None,
        }
    }

    /// One finished command occupying `[start, done)` with output from
    /// `start + 1`.
    fn run_command(
        reg: &mut MarkerRegistry,
        buf: &mut MemoryBuffer,
        start: usize,
        done: usize,
        exit: i32,
        with_output: bool,
    ) {
        reg.handle_event(prompt(start), buf);
        if with_output {
            reg.handle_event(MarkerEvent::OutputStart { line: start + 1 }, buf);
        }
        reg.handle_event(
            MarkerEvent::Complete {
                line: done,
                exit_code: Some(exit),
            },
            buf,
        );
    }

    fn fixture() -> (MarkerRegistry, MemoryBuffer) {
        let mut buf = MemoryBuffer::new(0);
        buf.push_lines(["$ echo hi", "hi", "$ true", "$ ls", "a.txt", "$ "]);
        let mut reg = MarkerRegistry::new();
        reg.set_bootstrap_window(0);
        run_command(&mut reg, &mut buf, 0, 2, 0, true);
        run_command(&mut reg, &mut buf, 2, 3, 0, false);
        run_command(&mut reg, &mut buf, 3, 5, 0, true);
        (reg, buf)
    }

    #[test]
    fn test_history_lists_in_order() {
        let (reg, buf) = fixture();
        let history = reg.history(&buf);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].command, "$ echo hi");
        assert!(history[0].has_output);
        assert_eq!(history[1].command, "$ true");
        assert!(!history[1].has_output);
        assert_eq!(history[2].command, "$ ls");
        assert_eq!(history[2].exit_code, Some(0));
    }

    #[test]
    fn test_history_skips_bootstrap() {
        let mut buf = MemoryBuffer::new(0);
        buf.push_lines(["Welcome to bash", "", "$ ", "$ echo hi", "hi", ""]);
        let mut reg = MarkerRegistry::new();
        // Default window: a prompt at line 2 before any completion is the
        // bootstrap artifact; the prompt at line 3 is past the window.
        reg.handle_event(prompt(2), &mut buf);
        run_command(&mut reg, &mut buf, 3, 5, 0, true);

        let history = reg.history(&buf);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].command, "$ echo hi");
    }

    #[test]
    fn test_capture_last_skips_output_less_blocks() {
        let (reg, buf) = fixture();
        // Middle block has no output phase; the last 2 output-bearing blocks
        // are the first and third commands.
        let items = reg.capture_last(2, &buf);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].command, "$ echo hi");
        assert_eq!(items[1].command, "$ ls");
    }

    #[test]
    fn test_capture_last_timestamps_strictly_increase() {
        let (reg, buf) = fixture();
        let items = reg.capture_last(2, &buf);
        assert!(items[0].captured_at_ms < items[1].captured_at_ms);
    }

    #[test]
    fn test_capture_last_selection_is_idempotent() {
        let (reg, buf) = fixture();
        let a: Vec<_> = reg.capture_last(2, &buf).iter().map(|i| i.command.clone()).collect();
        let b: Vec<_> = reg.capture_last(2, &buf).iter().map(|i| i.command.clone()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_capture_record_kinds() {
        let mut buf = MemoryBuffer::new(0);
        buf.push_lines(["$ true", "", "$ echo hi", "hi", ""]);
        let mut reg = MarkerRegistry::new();
        reg.set_bootstrap_window(0);
        // Output phase opened but produced only a blank region.
        run_command(&mut reg, &mut buf, 0, 2, 0, true);
        run_command(&mut reg, &mut buf, 2, 4, 0, true);

        let items = reg.capture_last(2, &buf);
        assert_eq!(items[0].kind, ContextItemKind::Command);
        assert!(items[0].output.is_empty());
        assert_eq!(items[1].kind, ContextItemKind::CommandOutput);
        assert_eq!(items[1].output, "hi");
    }

    #[test]
    fn test_copy_text_at_line() {
        let (reg, buf) = fixture();
        let text = reg.copy_text_at_line(0, &buf).unwrap();
        assert_eq!(text, "$ echo hi\nhi");

        assert_eq!(
            reg.copy_text_at_line(1, &buf),
            Err(RegistryError::NoBlockAtLine(1))
        );
    }

    #[test]
    fn test_copy_menu_record() {
        let (reg, buf) = fixture();
        let record = reg.copy_menu_record(0, &buf).unwrap();
        assert_eq!(record.command_range, LineRange { start: 0, end: 1 });
        assert_eq!(record.output_range, Some(LineRange { start: 1, end: 2 }));
        assert!(!record.disabled);
        assert_eq!(record.exit_code, Some(0));
        assert!(record.duration_ms.is_some());

        assert_eq!(
            reg.copy_menu_record(99, &buf),
            Err(RegistryError::BlockNotFound(99))
        );
    }

    #[test]
    fn test_add_to_context() {
        let (reg, buf) = fixture();
        let store = MemoryContextStore::new();
        reg.add_to_context(0, &store, &buf).unwrap();
        let items = store.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].command, "$ echo hi");
        assert!(store.texts().is_empty());
    }

    #[test]
    fn test_add_to_context_falls_back_on_store_failure() {
        struct RejectingStore {
            fallback: MemoryContextStore,
        }
        impl ContextStore for RejectingStore {
            fn add(&self, _item: ContextItem) -> Result<(), String> {
                Err("store full".to_string())
            }
            fn add_text(&self, text: String) -> Result<(), String> {
                self.fallback.add_text(text)
            }
        }

        let (reg, buf) = fixture();
        let store = RejectingStore {
            fallback: MemoryContextStore::new(),
        };
        reg.add_to_context(0, &store, &buf).unwrap();
        assert_eq!(store.fallback.texts(), vec!["$ echo hi\nhi".to_string()]);
    }

    #[test]
    fn test_stats() {
        let mut buf = MemoryBuffer::new(0);
        buf.extend_to(12);
        let mut reg = MarkerRegistry::new();
        reg.set_bootstrap_window(0);
        run_command(&mut reg, &mut buf, 0, 2, 0, true);
        run_command(&mut reg, &mut buf, 2, 4, 1, true);
        run_command(&mut reg, &mut buf, 4, 6, 0, true);

        let stats = reg.stats();
        assert_eq!(stats.total_commands, 3);
        assert_eq!(stats.successful_commands, 2);
        assert_eq!(stats.failed_commands, 1);
    }
}
