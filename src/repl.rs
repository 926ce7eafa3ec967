//! REPL context tracking
//!
//! Interactive language sub-sessions reuse the shell's marker vocabulary but
//! change its meaning: prompt markers carry a per-command identity and open
//! the output region immediately, and the shell-level block that launched
//! the REPL (e.g. `python`) must survive the whole session untouched.
//!
//! The context is a small explicit state struct owned by the registry; the
//! registry consults it on every event instead of keeping free-floating
//! "current block" variables.

use std::collections::HashMap;

use crate::block::{BlockId, ReplCommandId, ReplKind};

/// Tracks which block is currently open and which sub-session is active.
#[derive(Debug, Default)]
pub struct ReplContext {
    /// Block currently receiving events, if any.
    pub current_open: Option<BlockId>,
    /// Shell-level launcher block preserved while a REPL is active.
    pub preserved_outer: Option<BlockId>,
    /// Active sub-session kind (`Shell` = none).
    pub kind: ReplKind,
    /// REPL per-command identity lookup, for replay protection.
    by_command_id: HashMap<ReplCommandId, BlockId>,
    /// Identity of the most recent REPL command, used to route `Complete`.
    pub current_command: Option<ReplCommandId>,
}

impl ReplContext {
    /// Whether a REPL sub-session is active.
    pub fn in_repl(&self) -> bool {
        self.kind != ReplKind::Shell
    }

    /// Enter a sub-session, preserving an open shell-level block.
    ///
    /// Returns the block that was detached into the preserved slot, if any.
    pub fn enter(&mut self, kind: ReplKind, current_is_shell: bool) -> Option<BlockId> {
        self.kind = kind;
        if current_is_shell {
            if let Some(open) = self.current_open.take() {
                self.preserved_outer = Some(open);
                return Some(open);
            }
        }
        None
    }

    /// Leave the sub-session, restoring the preserved outer block.
    ///
    /// Returns the REPL block that was still open, if any; the registry
    /// finalizes it before the outer block takes the slot back.
    pub fn exit(&mut self) -> Option<BlockId> {
        let abandoned = self.current_open.take();
        self.kind = ReplKind::Shell;
        self.current_command = None;
        self.by_command_id.clear();
        self.current_open = self.preserved_outer.take();
        abandoned
    }

    /// Record a REPL command identity for replay protection.
    pub fn bind_command(&mut self, id: ReplCommandId, block: BlockId) {
        self.by_command_id.insert(id.clone(), block);
        self.current_command = Some(id);
    }

    /// Look up the block for a previously seen command identity.
    pub fn block_for_command(&self, id: &ReplCommandId) -> Option<BlockId> {
        self.by_command_id.get(id).copied()
    }

    /// Block a `Complete` event should close: the current REPL command's
    /// block when one is known, otherwise the current open block.
    pub fn completion_target(&self) -> Option<BlockId> {
        self.current_command
            .as_ref()
            .and_then(|id| self.block_for_command(id))
            .or(self.current_open)
    }

    /// Drop every reference to a block that was evicted or disposed.
    pub fn forget(&mut self, block: BlockId) {
        if self.current_open == Some(block) {
            self.current_open = None;
        }
        if self.preserved_outer == Some(block) {
            self.preserved_outer = None;
        }
        self.by_command_id.retain(|_, b| *b != block);
        if let Some(ref id) = self.current_command {
            if self.block_for_command(id).is_none() {
                self.current_command = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_preserves_open_shell_block() {
        let mut ctx = ReplContext::default();
        ctx.current_open = Some(5);
        let detached = ctx.enter(ReplKind::Python, true);
        assert_eq!(detached, Some(5));
        assert_eq!(ctx.current_open, None);
        assert_eq!(ctx.preserved_outer, Some(5));
        assert!(ctx.in_repl());
    }

    #[test]
    fn test_exit_restores_outer_block() {
        let mut ctx = ReplContext::default();
        ctx.current_open = Some(5);
        ctx.enter(ReplKind::Python, true);
        ctx.current_open = Some(9);
        let abandoned = ctx.exit();
        assert_eq!(abandoned, Some(9));
        assert_eq!(ctx.current_open, Some(5));
        assert_eq!(ctx.preserved_outer, None);
        assert!(!ctx.in_repl());
    }

    #[test]
    fn test_exit_clears_command_identity() {
        let mut ctx = ReplContext::default();
        ctx.enter(ReplKind::R, false);
        ctx.bind_command("c1".into(), 3);
        assert_eq!(ctx.block_for_command(&"c1".into()), Some(3));
        ctx.exit();
        assert_eq!(ctx.block_for_command(&"c1".into()), None);
        assert!(ctx.current_command.is_none());
    }

    #[test]
    fn test_completion_target_prefers_command_identity() {
        let mut ctx = ReplContext::default();
        ctx.current_open = Some(1);
        assert_eq!(ctx.completion_target(), Some(1));
        ctx.bind_command("c1".into(), 2);
        assert_eq!(ctx.completion_target(), Some(2));
    }

    #[test]
    fn test_forget_clears_all_references() {
        let mut ctx = ReplContext::default();
        ctx.current_open = Some(4);
        ctx.preserved_outer = Some(4);
        ctx.bind_command("c1".into(), 4);
        ctx.forget(4);
        assert_eq!(ctx.current_open, None);
        assert_eq!(ctx.preserved_outer, None);
        assert_eq!(ctx.block_for_command(&"c1".into()), None);
        assert!(ctx.current_command.is_none());
    }
}
