//! Highlight and decoration sync
//!
//! Keeps the on-screen highlight for a selected block in step with the
//! viewport. A block's lines may be partially visible or fully scrolled
//! away; the sync recomputes the visible window on scroll/resize, coalesced
//! to at most one recomputation per frame, and skips the redraw entirely
//! when the rendered window has not changed.

use crate::block::{Block, BlockId, ReplKind};
use crate::registry::MarkerRegistry;
use crate::surface::{BufferSurface, Viewport};

/// Visual state of a block's gutter decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationState {
    /// Still running, or finalized without a known exit code.
    Pending,
    /// Finalized with exit code 0.
    Success,
    /// Finalized with a non-zero exit code.
    Error,
    /// REPL block, styled by language.
    Repl(ReplKind),
}

/// Decoration state for a block.
pub fn decoration_state(block: &Block) -> DecorationState {
    if block.repl_kind != ReplKind::Shell {
        return DecorationState::Repl(block.repl_kind);
    }
    match block.exit_code {
        _ if block.is_open() => DecorationState::Pending,
        Some(0) => DecorationState::Success,
        Some(_) => DecorationState::Error,
        // Fallback-finalized without a completion event; the outcome is
        // unknown, so keep the neutral styling.
        None => DecorationState::Pending,
    }
}

/// Every block a decoration update should touch: the primary block plus,
/// for REPL blocks, every other block sharing its command identity.
pub fn decoration_targets(registry: &MarkerRegistry, primary: BlockId) -> Vec<BlockId> {
    let Some(block) = registry.get(primary) else {
        return Vec::new();
    };
    let Some(ref cmd_id) = block.repl_command_id else {
        return vec![primary];
    };
    registry
        .iter()
        .filter(|b| b.repl_command_id.as_ref() == Some(cmd_id))
        .map(|b| b.id)
        .collect()
}

/// Instruction for the renderer after a frame recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightUpdate {
    /// Render (or move) the highlight over this visible window.
    Render {
        /// First visible highlighted line.
        start: usize,
        /// Number of highlighted lines.
        height: usize,
    },
    /// The selection is entirely off-screen; clear any rendered highlight
    /// but keep the logical selection.
    Clear,
}

/// Per-selection highlight state with frame-coalesced recomputation.
#[derive(Debug, Default)]
pub struct HighlightSync {
    selected: Option<BlockId>,
    /// Last rendered (start, height), for redundant-redraw suppression.
    rendered: Option<(usize, usize)>,
    dirty: bool,
}

impl HighlightSync {
    /// Create an idle sync with no selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently selected block.
    pub fn selected(&self) -> Option<BlockId> {
        self.selected
    }

    /// Select a block and schedule a recomputation.
    pub fn select(&mut self, block: BlockId) {
        self.selected = Some(block);
        self.dirty = true;
    }

    /// Drop the selection and any rendered highlight.
    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.rendered = None;
        self.dirty = false;
    }

    /// Viewport scrolled; coalesces with any pending recomputation.
    pub fn on_scroll(&mut self) {
        self.dirty = true;
    }

    /// Viewport resized; coalesces with any pending recomputation.
    pub fn on_resize(&mut self) {
        self.dirty = true;
    }

    /// Recompute the visible highlight window, at most once per frame.
    ///
    /// Returns `None` when nothing needs repainting: no pending change, no
    /// selection, or the visible window is identical to the one already
    /// rendered.
    pub fn on_frame(
        &mut self,
        registry: &MarkerRegistry,
        surface: &dyn BufferSurface,
        viewport: Viewport,
    ) -> Option<HighlightUpdate> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;

        let selected = self.selected?;
        let Some(resolved) = registry.resolve(selected, surface) else {
            // Block vanished under the selection; clear the paint but keep
            // the logical selection so a reappearing anchor could restore it.
            return self.transition(None);
        };

        let visible = resolved.range().intersect(&viewport.range());
        self.transition(visible.map(|r| (r.start, r.len())))
    }

    fn transition(&mut self, window: Option<(usize, usize)>) -> Option<HighlightUpdate> {
        if window == self.rendered {
            return None;
        }
        self.rendered = window;
        Some(match window {
            Some((start, height)) => HighlightUpdate::Render { start, height },
            None => HighlightUpdate::Clear,
        })
    }
}
