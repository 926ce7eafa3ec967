//! Command block model
//!
//! A block is one tracked shell command execution: the prompt line where it
//! began, the point its output started, and the point it finished. Blocks
//! never store resolved line numbers; they hold opaque anchors into the
//! terminal buffer, resolved on demand through [`crate::surface::BufferSurface`].

use serde::{Deserialize, Serialize};

use crate::surface::AnchorId;

/// Engine-assigned identifier for a block.
pub type BlockId = u64;

/// Opaque per-command identifier carried by REPL prompt markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplCommandId(pub String);

impl From<&str> for ReplCommandId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ReplCommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which interactive context a block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplKind {
    /// Plain shell command (no sub-session).
    #[default]
    Shell,
    /// Python interactive session.
    Python,
    /// R interactive session.
    R,
}

impl std::fmt::Display for ReplKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplKind::Shell => write!(f, "shell"),
            ReplKind::Python => write!(f, "python"),
            ReplKind::R => write!(f, "r"),
        }
    }
}

/// Lifecycle state of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Command is open; `streaming` is true once output has started.
    Open {
        /// Output phase has begun and is still producing.
        streaming: bool,
    },
    /// Command finished (explicitly or via fallback finalization).
    Finalized,
}

/// Half-open line range `[start, end)` in absolute buffer lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    /// First line of the range.
    pub start: usize,
    /// One past the last line of the range.
    pub end: usize,
}

impl LineRange {
    /// Number of lines in the range.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range covers no lines.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Intersection with another range, or `None` when disjoint.
    pub fn intersect(&self, other: &LineRange) -> Option<LineRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(LineRange { start, end })
        } else {
            None
        }
    }
}

/// One tracked command execution.
///
/// Anchors are owned by the terminal surface; the block records their ids
/// and the registry disposes them when the block is removed.
#[derive(Debug, Clone)]
pub struct Block {
    /// Engine-assigned id.
    pub id: BlockId,
    /// Anchor at the prompt line where this block began.
    pub start_anchor: AnchorId,
    /// Anchor at the first output line, set when the output phase begins.
    pub output_anchor: Option<AnchorId>,
    /// Anchor recorded at completion time; robust end-of-block marker.
    pub done_anchor: Option<AnchorId>,
    /// Exit code; `None` while running or when completion was never observed.
    pub exit_code: Option<i32>,
    /// Lifecycle state.
    pub state: BlockState,
    /// Artifact block created by the first prompt render; never user-visible.
    pub is_bootstrap: bool,
    /// Sub-session this block belongs to.
    pub repl_kind: ReplKind,
    /// REPL per-command identity, when inside a sub-session.
    pub repl_command_id: Option<ReplCommandId>,
    /// Creation timestamp (unix millis).
    pub start_time: u64,
    /// Finalization timestamp (unix millis).
    pub end_time: Option<u64>,
    /// Duration between start and finalization.
    pub duration_ms: Option<u64>,
}

impl Block {
    /// Create a new open block anchored at `start_anchor`.
    pub fn new(id: BlockId, start_anchor: AnchorId, timestamp: u64) -> Self {
        Self {
            id,
            start_anchor,
            output_anchor: None,
            done_anchor: None,
            exit_code: None,
            state: BlockState::Open { streaming: false },
            is_bootstrap: false,
            repl_kind: ReplKind::Shell,
            repl_command_id: None,
            start_time: timestamp,
            end_time: None,
            duration_ms: None,
        }
    }

    /// Whether this block has not yet been finalized.
    pub fn is_open(&self) -> bool {
        matches!(self.state, BlockState::Open { .. })
    }

    /// Whether the output phase has started but the block is not finalized.
    pub fn is_streaming(&self) -> bool {
        matches!(self.state, BlockState::Open { streaming: true })
    }

    /// All anchors this block owns, for disposal.
    pub fn anchors(&self) -> impl Iterator<Item = AnchorId> {
        [Some(self.start_anchor), self.output_anchor, self.done_anchor]
            .into_iter()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_new_is_open() {
        let block = Block::new(1, 10, 1000);
        assert!(block.is_open());
        assert!(!block.is_streaming());
        assert!(block.exit_code.is_none());
        assert!(block.output_anchor.is_none());
        assert_eq!(block.repl_kind, ReplKind::Shell);
    }

    #[test]
    fn test_block_anchors_iterates_present_only() {
        let mut block = Block::new(1, 10, 0);
        assert_eq!(block.anchors().collect::<Vec<_>>(), vec![10]);
        block.output_anchor = Some(11);
        block.done_anchor = Some(12);
        assert_eq!(block.anchors().collect::<Vec<_>>(), vec![10, 11, 12]);
    }

    #[test]
    fn test_line_range_len_and_empty() {
        let range = LineRange { start: 2, end: 5 };
        assert_eq!(range.len(), 3);
        assert!(!range.is_empty());
        let empty = LineRange { start: 5, end: 5 };
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
    }

    #[test]
    fn test_line_range_intersect() {
        let a = LineRange { start: 0, end: 10 };
        let b = LineRange { start: 5, end: 15 };
        assert_eq!(a.intersect(&b), Some(LineRange { start: 5, end: 10 }));

        let c = LineRange { start: 10, end: 12 };
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_repl_kind_display() {
        assert_eq!(ReplKind::Shell.to_string(), "shell");
        assert_eq!(ReplKind::Python.to_string(), "python");
        assert_eq!(ReplKind::R.to_string(), "r");
    }
}
