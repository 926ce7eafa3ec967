//! Registry error types
//!
//! Nothing in the engine is fatal to the hosting session: event handlers
//! never fail, and query-side errors describe "not found" conditions that
//! callers surface as empty results.

use crate::block::BlockId;

/// Errors returned by query-side registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No block exists with the given id.
    BlockNotFound(BlockId),
    /// No block's anchor matches the requested line.
    NoBlockAtLine(usize),
    /// The block's start anchor was disposed by the buffer surface.
    AnchorDisposed(BlockId),
    /// The external context store rejected a write.
    ContextStore(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::BlockNotFound(id) => write!(f, "block {} not found", id),
            RegistryError::NoBlockAtLine(line) => {
                write!(f, "no block anchored at line {}", line)
            }
            RegistryError::AnchorDisposed(id) => {
                write!(f, "block {} anchor was disposed", id)
            }
            RegistryError::ContextStore(msg) => write!(f, "context store error: {}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}
