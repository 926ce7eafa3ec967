//! Inbound marker events and outbound registry events
//!
//! Inbound events are the typed form of the shell-integration side channel
//! (see [`crate::protocol`] for the wire grammar). Every positional event
//! carries the cursor's absolute buffer line at the moment the sequence
//! arrived; the registry immediately converts those lines into anchors.
//!
//! Outbound events accumulate in the registry and are drained by
//! `MarkerRegistry::poll_events`, so hosting UIs can repaint decorations
//! without rescanning the whole registry.

use crate::block::{BlockId, ReplCommandId, ReplKind};

/// One event from the shell-integration side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerEvent {
    /// A new command is about to be typed at `line`.
    PromptStart {
        /// Absolute cursor line when the marker arrived.
        line: usize,
        /// Per-command identity, present inside REPL sessions.
        repl_command_id: Option<ReplCommandId>,
    },
    /// Lightweight fallback completion signal with no exit code.
    PromptEnd {
        /// Absolute cursor line when the marker arrived.
        line: usize,
    },
    /// The current command's output begins at `line`.
    OutputStart {
        /// Absolute cursor line when the marker arrived.
        line: usize,
    },
    /// The current command finished with `exit_code`.
    Complete {
        /// Absolute cursor line when the marker arrived.
        line: usize,
        /// Exit code reported by the shell, if any.
        exit_code: Option<i32>,
    },
    /// An interactive sub-session started.
    ReplEnter {
        /// Which language REPL was entered.
        kind: ReplKind,
    },
    /// The active sub-session ended.
    ReplExit,
}

/// Registry state change, drained via `poll_events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A block was opened at an absolute line.
    BlockOpened {
        /// The new block.
        block_id: BlockId,
        /// Prompt line at creation time.
        line: usize,
        /// Context the block belongs to.
        repl_kind: ReplKind,
    },
    /// A block's output phase began.
    OutputStarted {
        /// The streaming block.
        block_id: BlockId,
        /// First output line at the time the marker arrived.
        line: usize,
    },
    /// A block was finalized, explicitly or via a fallback heuristic.
    BlockFinalized {
        /// The finalized block.
        block_id: BlockId,
        /// Exit code, `None` for fallback finalization.
        exit_code: Option<i32>,
    },
    /// A block was evicted to enforce the registry cap.
    BlockEvicted {
        /// The evicted block.
        block_id: BlockId,
    },
    /// A block's metadata was removed because its buffer anchor was disposed.
    BlockRemoved {
        /// The removed block.
        block_id: BlockId,
    },
}
