//! Command boundary tracking engine
//!
//! Turns a raw, continuously-scrolling terminal output stream plus an
//! embedded side channel of shell-integration markers into a structured,
//! queryable history of discrete command executions (prompt, command text,
//! output, completion).
//!
//! The marker stream is unreliable: completion events get dropped over lossy
//! transports, prompt markers get replayed, and the buffer underneath keeps
//! evicting old lines. The engine reconstructs exact half-open line ranges
//! anyway, and supports nested interactive sub-sessions (Python and R REPLs)
//! that emit a different event cadence over the same channel.
//!
//! ## Components
//! - [`registry::MarkerRegistry`] - the lifecycle state machine: opens,
//!   advances, and finalizes blocks, with a bounded-size eviction policy
//! - [`resolve`] - pure range resolution from current anchor positions
//! - [`repl`] - REPL context tracking (preserved launcher block, per-command
//!   identity replay protection)
//! - [`capture`] - history listing, capture-last-N export, copy/jump by line
//! - [`highlight`] - viewport-synced block highlighting and decorations
//! - [`surface`] - the terminal buffer boundary (anchors, line text)
//! - [`protocol`] - marker payload parsing
//!
//! The engine is single-threaded and event-driven; every state transition
//! completes synchronously inside one event handler, and callers receive
//! copies of resolved data, never references into registry internals.

pub mod block;
pub mod capture;
pub mod context;
pub mod error;
pub mod event;
pub mod highlight;
pub mod protocol;
pub mod registry;
pub mod repl;
pub mod resolve;
pub mod surface;

pub use block::{Block, BlockId, BlockState, LineRange, ReplCommandId, ReplKind};
pub use capture::{CopyMenuRecord, HistoryEntry, RegistryStats};
pub use context::{ContextItem, ContextItemKind, ContextStore, MemoryContextStore};
pub use error::RegistryError;
pub use event::{MarkerEvent, RegistryEvent};
pub use highlight::{decoration_state, DecorationState, HighlightSync, HighlightUpdate};
pub use registry::{MarkerRegistry, DEFAULT_MAX_MARKERS};
pub use resolve::ResolvedBlock;
pub use surface::{AnchorId, BufferSurface, MemoryBuffer, Viewport};
