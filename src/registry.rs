//! Marker lifecycle state machine
//!
//! Owns the ordered collection of tracked command blocks and consumes the
//! shell-integration event stream. All transitions are synchronous: every
//! mutation of a block and its derived state completes inside the handler
//! for one event, so an external renderer querying ranges mid-stream never
//! observes a half-applied update.
//!
//! The stream is unreliable. Completion events get dropped over lossy
//! transports, prompt markers get replayed, and the buffer underneath keeps
//! scrolling. Every handler therefore tolerates missing, duplicate, and
//! out-of-order events; the worst outcome is a block merged with its
//! neighbor, never a crash.

use std::collections::HashMap;

use tracing::debug;

use crate::block::{Block, BlockId, BlockState, ReplCommandId, ReplKind};
use crate::event::{MarkerEvent, RegistryEvent};
use crate::repl::ReplContext;
use crate::resolve::{resolve_block, text_for_range, ResolvedBlock};
use crate::surface::{AnchorId, BufferSurface};

/// Default cap on tracked blocks.
pub const DEFAULT_MAX_MARKERS: usize = 128;

/// Prompt markers in the first few lines of a session, before any command
/// has completed, are treated as the bootstrap prompt artifact. Tunable
/// heuristic, not a guaranteed detector.
pub const BOOTSTRAP_LINE_WINDOW: usize = 3;

/// Python traceback header used to reclassify falsely-clean exits.
const PYTHON_TRACEBACK_MARKER: &str = "Traceback (most recent call last";

/// Current unix time in milliseconds.
pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The command boundary tracking engine.
///
/// Blocks are kept in start-line order, which is also temporal order since
/// new blocks are only ever appended. The registry holds at most
/// `max_markers` blocks; inserting past the cap evicts the oldest.
pub struct MarkerRegistry {
    /// Block ids in start-line (= insertion) order.
    order: Vec<BlockId>,
    blocks: HashMap<BlockId, Block>,
    next_block_id: BlockId,
    max_markers: usize,
    context: ReplContext,
    events: Vec<RegistryEvent>,
    /// Whether any command has ever completed; gates the bootstrap heuristic.
    any_completed: bool,
    bootstrap_window: usize,
}

impl Default for MarkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerRegistry {
    /// Create a registry with the default block cap.
    pub fn new() -> Self {
        Self::with_max_markers(DEFAULT_MAX_MARKERS)
    }

    /// Create a registry holding at most `max_markers` blocks.
    pub fn with_max_markers(max_markers: usize) -> Self {
        Self {
            order: Vec::new(),
            blocks: HashMap::new(),
            next_block_id: 0,
            max_markers: max_markers.max(1),
            context: ReplContext::default(),
            events: Vec::new(),
            any_completed: false,
            bootstrap_window: BOOTSTRAP_LINE_WINDOW,
        }
    }

    /// Override the bootstrap detection window.
    pub fn set_bootstrap_window(&mut self, lines: usize) {
        self.bootstrap_window = lines;
    }

    /// Number of tracked blocks.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry tracks no blocks.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Block ids in start-line order.
    pub fn block_ids(&self) -> &[BlockId] {
        &self.order
    }

    /// Look up a block by id.
    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    /// Blocks in start-line order.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.order.iter().filter_map(|id| self.blocks.get(id))
    }

    /// The block currently receiving events, if any.
    pub fn current_open(&self) -> Option<BlockId> {
        self.context.current_open
    }

    /// The shell-level block preserved while a REPL is active.
    pub fn preserved_outer(&self) -> Option<BlockId> {
        self.context.preserved_outer
    }

    /// Active REPL kind (`Shell` when no sub-session is active).
    pub fn repl_kind(&self) -> ReplKind {
        self.context.kind
    }

    /// Drain accumulated registry events.
    pub fn poll_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.events)
    }

    /// Parse a raw marker payload and apply it. Unknown payloads are ignored.
    pub fn handle_payload(&mut self, payload: &str, line: usize, surface: &mut dyn BufferSurface) {
        if let Some(event) = crate::protocol::parse_marker_payload(payload, line) {
            self.handle_event(event, surface);
        }
    }

    /// Apply one marker event.
    pub fn handle_event(&mut self, event: MarkerEvent, surface: &mut dyn BufferSurface) {
        match event {
            MarkerEvent::PromptStart {
                line,
                repl_command_id,
            } => self.handle_prompt_start(line, repl_command_id, surface),
            MarkerEvent::PromptEnd { line } => self.handle_prompt_end(line, surface),
            MarkerEvent::OutputStart { line } => self.handle_output_start(line, surface),
            MarkerEvent::Complete { line, exit_code } => {
                self.handle_complete(line, exit_code, surface)
            }
            MarkerEvent::ReplEnter { kind } => self.handle_repl_enter(kind),
            MarkerEvent::ReplExit => self.handle_repl_exit(surface),
        }
    }

    fn handle_prompt_start(
        &mut self,
        line: usize,
        repl_command_id: Option<ReplCommandId>,
        surface: &mut dyn BufferSurface,
    ) {
        // Idempotent replay protection: the same REPL command identity always
        // resolves to the same block, however many prompt signals arrive.
        if self.context.in_repl() {
            if let Some(ref id) = repl_command_id {
                if let Some(existing) = self.context.block_for_command(id) {
                    if self.blocks.contains_key(&existing) {
                        self.context.current_open = Some(existing);
                        self.context.current_command = Some(id.clone());
                        return;
                    }
                }
            }
        }

        // Primary fallback for lost completion events: a prompt implies the
        // previous command in this context is done.
        if let Some(open_id) = self.context.current_open {
            let had_output = self
                .blocks
                .get(&open_id)
                .is_some_and(|b| b.is_open() && b.output_anchor.is_some());
            let is_open = self.blocks.get(&open_id).is_some_and(|b| b.is_open());
            if is_open {
                let done_line = if had_output { Some(line) } else { None };
                self.finalize_block(open_id, None, done_line, surface);
            }
            self.context.current_open = None;
        }

        let id = self.next_block_id;
        self.next_block_id += 1;
        let start_anchor = surface.register_anchor(line);
        let mut block = Block::new(id, start_anchor, unix_millis());
        block.is_bootstrap = !self.any_completed && line < self.bootstrap_window;

        if self.context.in_repl() {
            block.repl_kind = self.context.kind;
            block.repl_command_id = repl_command_id.clone();
            // REPLs emit no separate output-start marker: the prompt opens
            // the output region immediately, one line past the command echo.
            block.output_anchor = Some(surface.register_anchor(line + 1));
            block.state = BlockState::Open { streaming: true };
        }

        let repl_kind = block.repl_kind;
        self.order.push(id);
        self.blocks.insert(id, block);
        self.context.current_open = Some(id);
        match repl_command_id {
            Some(cmd_id) if self.context.in_repl() => self.context.bind_command(cmd_id, id),
            _ => self.context.current_command = None,
        }

        self.events.push(RegistryEvent::BlockOpened {
            block_id: id,
            line,
            repl_kind,
        });

        self.enforce_cap(surface);
    }

    fn handle_prompt_end(&mut self, line: usize, surface: &mut dyn BufferSurface) {
        // Fallback-only signal, shell context only: some environments emit
        // this instead of a completion code.
        if self.context.in_repl() {
            return;
        }
        if let Some(open_id) = self.context.current_open {
            let ready = self
                .blocks
                .get(&open_id)
                .is_some_and(|b| b.is_open() && b.output_anchor.is_some());
            if ready {
                self.finalize_block(open_id, None, Some(line), surface);
                self.context.current_open = None;
            }
        }
    }

    fn handle_output_start(&mut self, line: usize, surface: &mut dyn BufferSurface) {
        // The prompt marker may have been dropped; synthesize the block so
        // the output still gets tracked.
        if self.context.current_open.is_none() {
            let id = self.next_block_id;
            self.next_block_id += 1;
            let start_anchor = surface.register_anchor(line);
            let mut block = Block::new(id, start_anchor, unix_millis());
            if self.context.in_repl() {
                block.repl_kind = self.context.kind;
            }
            let repl_kind = block.repl_kind;
            self.order.push(id);
            self.blocks.insert(id, block);
            self.context.current_open = Some(id);
            self.events.push(RegistryEvent::BlockOpened {
                block_id: id,
                line,
                repl_kind,
            });
            self.enforce_cap(surface);
        }

        let Some(open_id) = self.context.current_open else {
            return;
        };
        let Some(block) = self.blocks.get_mut(&open_id) else {
            return;
        };
        if !block.is_open() {
            return;
        }
        if block.output_anchor.is_none() {
            block.output_anchor = Some(surface.register_anchor(line));
        }
        block.state = BlockState::Open { streaming: true };
        self.events.push(RegistryEvent::OutputStarted {
            block_id: open_id,
            line,
        });
    }

    fn handle_complete(
        &mut self,
        line: usize,
        exit_code: Option<i32>,
        surface: &mut dyn BufferSurface,
    ) {
        let Some(target) = self.context.completion_target() else {
            // Completion for a block that was evicted or disposed: dropped.
            debug!(line, "completion event with no open block, dropping");
            return;
        };
        if !self.blocks.contains_key(&target) {
            return;
        }
        self.finalize_block(target, exit_code, Some(line), surface);
        if self.context.current_open == Some(target) {
            self.context.current_open = None;
        }
        self.context.current_command = None;
    }

    fn handle_repl_enter(&mut self, kind: ReplKind) {
        let current_is_shell = self
            .context
            .current_open
            .and_then(|id| self.blocks.get(&id))
            .is_some_and(|b| b.repl_kind == ReplKind::Shell);
        self.context.enter(kind, current_is_shell);
    }

    fn handle_repl_exit(&mut self, surface: &mut dyn BufferSurface) {
        if let Some(abandoned) = self.context.exit() {
            if self.blocks.get(&abandoned).is_some_and(Block::is_open) {
                self.finalize_block(abandoned, None, None, surface);
            }
        }
    }

    /// Finalize a block. Idempotent: re-finalizing is a no-op.
    fn finalize_block(
        &mut self,
        id: BlockId,
        exit_code: Option<i32>,
        done_line: Option<usize>,
        surface: &mut dyn BufferSurface,
    ) {
        let Some(block) = self.blocks.get_mut(&id) else {
            return;
        };
        if !block.is_open() {
            return;
        }

        if let Some(line) = done_line {
            if block.done_anchor.is_none() {
                block.done_anchor = Some(surface.register_anchor(line));
            }
        }
        let now = unix_millis();
        block.exit_code = exit_code;
        block.end_time = Some(now);
        block.duration_ms = Some(now.saturating_sub(block.start_time));
        block.state = BlockState::Finalized;
        let is_bootstrap = block.is_bootstrap;
        let is_python = block.repl_kind == ReplKind::Python;

        // REPLs do not reliably propagate exit status: a Python block that
        // reports clean but printed a traceback actually failed.
        let mut final_code = exit_code;
        if is_python && final_code.unwrap_or(0) == 0 {
            if let Some(resolved) = self.resolve(id, surface) {
                if let Some(output) = resolved.output {
                    let text = text_for_range(output, surface);
                    if text.contains(PYTHON_TRACEBACK_MARKER) {
                        final_code = Some(1);
                        if let Some(block) = self.blocks.get_mut(&id) {
                            block.exit_code = final_code;
                        }
                    }
                }
            }
        }

        if exit_code.is_some() && !is_bootstrap {
            self.any_completed = true;
        }
        self.events.push(RegistryEvent::BlockFinalized {
            block_id: id,
            exit_code: final_code,
        });
    }

    /// Enforce the block cap, evicting oldest-first.
    fn enforce_cap(&mut self, surface: &mut dyn BufferSurface) {
        while self.order.len() > self.max_markers {
            let oldest = self.order.remove(0);
            if let Some(block) = self.blocks.remove(&oldest) {
                for anchor in block.anchors() {
                    surface.dispose_anchor(anchor);
                }
            }
            self.context.forget(oldest);
            debug!(block_id = oldest, "evicted oldest block at registry cap");
            self.events.push(RegistryEvent::BlockEvicted { block_id: oldest });
        }
    }

    /// Notification that the buffer evicted the line an anchor was on.
    ///
    /// Removes the owning block's metadata; late events for the vanished
    /// block are silently dropped from then on.
    pub fn anchor_disposed(&mut self, anchor: AnchorId, surface: &mut dyn BufferSurface) {
        let Some(owner) = self
            .blocks
            .values()
            .find(|b| b.anchors().any(|a| a == anchor))
            .map(|b| b.id)
        else {
            return;
        };
        self.order.retain(|id| *id != owner);
        if let Some(block) = self.blocks.remove(&owner) {
            for a in block.anchors() {
                if a != anchor {
                    surface.dispose_anchor(a);
                }
            }
        }
        self.context.forget(owner);
        self.events.push(RegistryEvent::BlockRemoved { block_id: owner });
    }

    /// Resolve a block's current line ranges.
    ///
    /// Returns `None` for unknown blocks and for blocks whose start anchor
    /// has been disposed.
    pub fn resolve(&self, id: BlockId, surface: &dyn BufferSurface) -> Option<ResolvedBlock> {
        let block = self.blocks.get(&id)?;
        let pos = self.order.iter().position(|b| *b == id)?;
        let next_start = self.order[pos + 1..]
            .iter()
            .filter_map(|b| self.blocks.get(b))
            .find_map(|b| surface.resolve_line(b.start_anchor));
        resolve_block(block, next_start, surface)
    }
}
