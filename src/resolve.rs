//! Range resolution
//!
//! Pure derivation of a block's command and output line ranges from its
//! current anchor positions. The resolver holds no state of its own, so it
//! can be re-run at any time and cannot drift from the registry.
//!
//! Ranges are half-open: the done anchor sits on the line the shell reuses
//! for the next prompt, so it is the exclusive end of the block.

use std::sync::OnceLock;

use regex::Regex;

use crate::block::{Block, BlockId, LineRange, ReplKind};
use crate::surface::BufferSurface;

/// Resolved line geometry for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBlock {
    /// The block this geometry belongs to.
    pub block_id: BlockId,
    /// Prompt/command text range.
    pub command: LineRange,
    /// Output range, when an output phase exists within the block.
    pub output: Option<LineRange>,
    /// Exclusive end of the whole block.
    pub end: usize,
    /// Bootstrap blocks are never interactable.
    pub disabled: bool,
}

impl ResolvedBlock {
    /// The whole block as one range.
    pub fn range(&self) -> LineRange {
        LineRange {
            start: self.command.start,
            end: self.end,
        }
    }

    /// Whether the block has an observable output region.
    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }
}

/// Lines that look like a REPL continuation or result prompt rather than
/// real output. The completion signal for REPLs frequently lands one line
/// early, on the result line itself, so such a done line is still content.
fn looks_like_repl_prompt(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^(>>> ?|\.\.\. ?|In \[\d*\]|Out\[\d*\]|\[\d+\] |> )").unwrap()
    });
    re.is_match(text)
}

/// Resolve a block's ranges from current anchor positions.
///
/// `next_start` is the resolved start line of the next block in start-line
/// order, if any. Returns `None` when the block's start anchor has been
/// disposed by the buffer surface.
pub fn resolve_block(
    block: &Block,
    next_start: Option<usize>,
    surface: &dyn BufferSurface,
) -> Option<ResolvedBlock> {
    let start = surface.resolve_line(block.start_anchor)?;
    let buffer_len = surface.buffer_len();

    let output_start = block
        .output_anchor
        .and_then(|anchor| surface.resolve_line(anchor));

    let command_end = output_start.unwrap_or(start + 1).max(start + 1);

    let done_line = block
        .done_anchor
        .and_then(|anchor| surface.resolve_line(anchor));

    let mut end = match done_line {
        // A done anchor is only trusted when it still lands inside the buffer
        // and after the block's own start.
        Some(done) if done > start && done <= buffer_len => {
            let mut end = done;
            if block.repl_kind != ReplKind::Shell {
                if let Some(text) = surface.line_text(done) {
                    if looks_like_repl_prompt(&text) {
                        end = (done + 1).min(buffer_len);
                    }
                }
            }
            end
        }
        _ => next_start.unwrap_or(buffer_len),
    };
    end = end.max(command_end).min(buffer_len.max(command_end));

    let output = match output_start {
        Some(out) if out > start && out < end => Some(LineRange { start: out, end }),
        _ => None,
    };

    Some(ResolvedBlock {
        block_id: block.id,
        command: LineRange {
            start,
            end: command_end,
        },
        output,
        end,
        disabled: block.is_bootstrap,
    })
}

/// Concatenated text of a range, one line per entry, skipping evicted lines.
pub fn text_for_range(range: LineRange, surface: &dyn BufferSurface) -> String {
    let mut lines = Vec::with_capacity(range.len());
    for line in range.start..range.end {
        if let Some(text) = surface.line_text(line) {
            lines.push(text);
        }
    }
    lines.join("\n")
}
