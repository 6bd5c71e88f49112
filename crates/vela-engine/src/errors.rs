//! Engine error taxonomy.

use thiserror::Error;
use vela_core::{FragmentError, GraphError};

use crate::store::StoreError;

/// Errors surfaced by engine operations.
///
/// Nothing here terminates the process: operation-level errors abort the
/// operation and leave history unchanged; collaborator errors are wrapped
/// and propagated the same way.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A summarize request matched no known entity.
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    /// An undo request exceeded the available history.
    #[error("cannot undo {requested} step(s); {available} available")]
    NothingToUndo {
        /// Steps the caller asked for.
        requested: usize,
        /// Steps that could actually be undone.
        available: usize,
    },

    /// Redo was requested with nothing undone.
    #[error("nothing to redo")]
    NothingToRedo,

    /// The current primary action was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A fragment failed to materialize.
    #[error(transparent)]
    Fragment(#[from] FragmentError),

    /// The graph collaborator failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// File I/O outside a fragment (undo restoration, backups).
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
