//! Terminal buffer surface interface
//!
//! The registry never owns buffer content. It talks to the emulation surface
//! through [`BufferSurface`]: anchors are opaque handles whose resolved line
//! can shift as the buffer scrolls and can become invalid when the line is
//! evicted. Resolved line numbers must never be cached across an event
//! boundary; the surface is the source of truth.
//!
//! [`MemoryBuffer`] is an in-process implementation with scrollback-style
//! eviction, used by hosts that embed the engine directly and by tests.

use std::collections::HashMap;

/// Opaque handle to a line in the terminal buffer.
pub type AnchorId = u64;

/// The terminal emulation surface, as seen by the registry.
pub trait BufferSurface {
    /// Total number of absolute lines the buffer has ever held.
    fn buffer_len(&self) -> usize;

    /// Register an anchor at an absolute line. The surface owns the anchor
    /// until [`BufferSurface::dispose_anchor`] is called.
    fn register_anchor(&mut self, line: usize) -> AnchorId;

    /// Current absolute line of an anchor, or `None` once its line has been
    /// evicted or the anchor was disposed.
    fn resolve_line(&self, anchor: AnchorId) -> Option<usize>;

    /// Release an anchor. Disposing an unknown anchor is a no-op.
    fn dispose_anchor(&mut self, anchor: AnchorId);

    /// Text of an absolute line, or `None` if evicted / out of range.
    fn line_text(&self, line: usize) -> Option<String>;
}

/// Visible line window of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// First visible absolute line.
    pub top: usize,
    /// Number of visible lines.
    pub height: usize,
}

impl Viewport {
    /// The visible window as a half-open range.
    pub fn range(&self) -> crate::block::LineRange {
        crate::block::LineRange {
            start: self.top,
            end: self.top + self.height,
        }
    }
}

/// In-memory buffer with bounded retention.
///
/// Lines are addressed by absolute index; once more than `max_retained`
/// lines exist, the oldest are evicted and anchors attached to them are
/// invalidated. Invalidated anchor ids accumulate until drained with
/// [`MemoryBuffer::drain_disposed`], so the host can forward disposal
/// notifications to the registry.
#[derive(Debug, Default)]
pub struct MemoryBuffer {
    lines: Vec<String>,
    /// Number of lines evicted off the top.
    floor: usize,
    anchors: HashMap<AnchorId, usize>,
    next_anchor: AnchorId,
    max_retained: usize,
    disposed: Vec<AnchorId>,
}

impl MemoryBuffer {
    /// Create a buffer retaining at most `max_retained` lines (0 = unbounded).
    pub fn new(max_retained: usize) -> Self {
        Self {
            max_retained,
            ..Default::default()
        }
    }

    /// Append one line, evicting from the top if over capacity.
    pub fn push_line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
        if self.max_retained > 0 {
            while self.lines.len() > self.max_retained {
                self.lines.remove(0);
                self.floor += 1;
            }
            self.invalidate_below_floor();
        }
    }

    /// Append several lines at once.
    pub fn push_lines<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.push_line(line);
        }
    }

    /// Grow the buffer with empty lines until it holds `len` absolute lines.
    pub fn extend_to(&mut self, len: usize) {
        while self.buffer_len() < len {
            self.push_line("");
        }
    }

    /// First absolute line still retained.
    pub fn floor(&self) -> usize {
        self.floor
    }

    /// Anchor ids invalidated by eviction since the last drain.
    pub fn drain_disposed(&mut self) -> Vec<AnchorId> {
        std::mem::take(&mut self.disposed)
    }

    fn invalidate_below_floor(&mut self) {
        let floor = self.floor;
        let dead: Vec<AnchorId> = self
            .anchors
            .iter()
            .filter(|(_, line)| **line < floor)
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            self.anchors.remove(&id);
            self.disposed.push(id);
        }
    }
}

impl BufferSurface for MemoryBuffer {
    fn buffer_len(&self) -> usize {
        self.floor + self.lines.len()
    }

    fn register_anchor(&mut self, line: usize) -> AnchorId {
        let id = self.next_anchor;
        self.next_anchor += 1;
        self.anchors.insert(id, line);
        id
    }

    fn resolve_line(&self, anchor: AnchorId) -> Option<usize> {
        self.anchors.get(&anchor).copied()
    }

    fn dispose_anchor(&mut self, anchor: AnchorId) {
        self.anchors.remove(&anchor);
    }

    fn line_text(&self, line: usize) -> Option<String> {
        if line < self.floor {
            return None;
        }
        self.lines.get(line - self.floor).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_buffer_push_and_len() {
        let mut buf = MemoryBuffer::new(0);
        assert_eq!(buf.buffer_len(), 0);
        buf.push_line("one");
        buf.push_line("two");
        assert_eq!(buf.buffer_len(), 2);
        assert_eq!(buf.line_text(0).as_deref(), Some("one"));
        assert_eq!(buf.line_text(1).as_deref(), Some("two"));
        assert!(buf.line_text(2).is_none());
    }

    #[test]
    fn test_memory_buffer_anchor_resolve() {
        let mut buf = MemoryBuffer::new(0);
        buf.push_lines(["a", "b", "c"]);
        let anchor = buf.register_anchor(1);
        assert_eq!(buf.resolve_line(anchor), Some(1));
        buf.dispose_anchor(anchor);
        assert_eq!(buf.resolve_line(anchor), None);
    }

    #[test]
    fn test_memory_buffer_eviction_invalidates_anchors() {
        let mut buf = MemoryBuffer::new(2);
        buf.push_lines(["a", "b"]);
        let low = buf.register_anchor(0);
        let high = buf.register_anchor(1);
        buf.push_line("c");

        assert_eq!(buf.floor(), 1);
        assert_eq!(buf.resolve_line(low), None);
        assert_eq!(buf.resolve_line(high), Some(1));
        assert_eq!(buf.drain_disposed(), vec![low]);
        assert!(buf.drain_disposed().is_empty());
        assert!(buf.line_text(0).is_none());
        assert_eq!(buf.line_text(2).as_deref(), Some("c"));
    }

    #[test]
    fn test_memory_buffer_extend_to() {
        let mut buf = MemoryBuffer::new(0);
        buf.extend_to(5);
        assert_eq!(buf.buffer_len(), 5);
        assert_eq!(buf.line_text(4).as_deref(), Some(""));
    }

    #[test]
    fn test_viewport_range() {
        let vp = Viewport { top: 10, height: 24 };
        let range = vp.range();
        assert_eq!(range.start, 10);
        assert_eq!(range.end, 34);
    }
}
