//! Error types for the retrieval engine.

use std::path::PathBuf;

use docrag_corpus::CorpusError;
use docrag_embeddings::EmbeddingError;
use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
///
/// Startup classifies these three ways: artifact problems trigger a rebuild,
/// rebuild problems abort startup, and query-time problems degrade to an
/// empty context.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The corpus root produced no usable documents.
    #[error("corpus is empty: no documents found in {root} (searched {extensions})")]
    CorpusEmpty { root: PathBuf, extensions: String },

    /// Corpus scanning failed for another reason.
    #[error("corpus error: {0}")]
    Corpus(CorpusError),

    /// No artifact exists at the configured location.
    #[error("no index artifact at {0}")]
    ArtifactMissing(PathBuf),

    /// The artifact exists but cannot be trusted.
    #[error("index artifact {path} is corrupt: {reason}")]
    ArtifactCorrupt { path: PathBuf, reason: String },

    /// The artifact is intact but was built for a different format or model.
    #[error("index artifact {path} is stale: {reason}")]
    ArtifactStale { path: PathBuf, reason: String },

    /// Document and embedding counts differ.
    #[error("shape mismatch: {documents} documents but {embeddings} embeddings")]
    ShapeMismatch { documents: usize, embeddings: usize },

    /// An embedding does not have the index dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    /// The embedding provider failed while answering a query.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(#[source] EmbeddingError),

    /// The embedding provider failed while building the index.
    #[error("embedding error: {0}")]
    Embedding(#[source] EmbeddingError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Blocking task failed to complete.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    /// Artifact problems that a full rebuild resolves.
    pub fn is_recoverable_at_startup(&self) -> bool {
        matches!(
            self,
            Self::ArtifactMissing(_) | Self::ArtifactCorrupt { .. } | Self::ArtifactStale { .. }
        )
    }

    /// Problems a query caller should absorb by proceeding without context.
    ///
    /// Applies to errors returned by `retrieve`.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::RetrievalUnavailable(_) | Self::EmbeddingDimensionMismatch { .. }
        )
    }

    /// Problems that must stop the engine from becoming ready.
    ///
    /// Applies to errors returned by `start` or `rebuild`. A dimension
    /// mismatch is both fatal here and degradable at query time.
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable_at_startup() && !matches!(self, Self::RetrievalUnavailable(_))
    }
}

impl From<CorpusError> for RetrievalError {
    fn from(err: CorpusError) -> Self {
        match err {
            CorpusError::CorpusEmpty { root, extensions } => Self::CorpusEmpty { root, extensions },
            other => Self::Corpus(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let missing = RetrievalError::ArtifactMissing(PathBuf::from("rag_index.json"));
        assert!(missing.is_recoverable_at_startup());
        assert!(!missing.is_fatal());

        let empty: RetrievalError = CorpusError::CorpusEmpty {
            root: PathBuf::from("docs"),
            extensions: ".md".to_string(),
        }
        .into();
        assert!(matches!(empty, RetrievalError::CorpusEmpty { .. }));
        assert!(empty.is_fatal());

        let unavailable = RetrievalError::RetrievalUnavailable(EmbeddingError::ApiRequest(
            "timeout".to_string(),
        ));
        assert!(unavailable.is_degradable());
        assert!(!unavailable.is_fatal());
    }

    #[test]
    fn test_dimension_mismatch_depends_on_phase() {
        let mismatch = RetrievalError::EmbeddingDimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert!(mismatch.is_degradable());
        assert!(mismatch.is_fatal());
        assert!(!mismatch.is_recoverable_at_startup());
    }
}
