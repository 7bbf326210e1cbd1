//! Error types for corpus loading.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for corpus operations.
pub type Result<T> = std::result::Result<T, CorpusError>;

/// Errors that can occur while loading a corpus.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// No non-empty documents were found under the root.
    #[error("no documents found in {root} (searched {extensions})")]
    CorpusEmpty { root: PathBuf, extensions: String },

    /// Invalid exclude pattern.
    #[error("invalid exclude pattern: {0}")]
    InvalidPattern(String),
}
