//! Core error types.

use crate::entity::ProjectFile;

/// Errors raised while materializing a fragment's text.
#[derive(Debug, thiserror::Error)]
pub enum FragmentError {
    /// The fragment's backing file could not be read.
    ///
    /// Callers treat this as fragment corruption: the fragment is dropped
    /// from the snapshot with a warning, never fatal to the snapshot.
    #[error("unreadable fragment {file}: {source}")]
    Unreadable {
        /// The file that failed to read.
        file: ProjectFile,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
