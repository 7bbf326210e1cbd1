//! Index construction from documents and their embeddings.

use docrag_corpus::Document;
use docrag_embeddings::{DimensionGuard, Embedding, EmbeddingError, FlatIndex};
use tracing::debug;

use crate::error::{Result, RetrievalError};

/// Builds a [`FlatIndex`] whose ordinals line up with the document array.
pub struct IndexBuilder {
    guard: DimensionGuard,
}

impl IndexBuilder {
    /// Builder that learns the dimension from the first embedding.
    pub fn new() -> Self {
        Self {
            guard: DimensionGuard::new(),
        }
    }

    /// Builder that requires every embedding to have `dimension` components.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            guard: DimensionGuard::with_dimension(dimension),
        }
    }

    /// Build an index where embedding `i` belongs to document `i`.
    pub fn build(&self, documents: &[Document], embeddings: &[Embedding]) -> Result<FlatIndex> {
        if documents.len() != embeddings.len() {
            return Err(RetrievalError::ShapeMismatch {
                documents: documents.len(),
                embeddings: embeddings.len(),
            });
        }

        self.guard.check_all(embeddings).map_err(dimension_error)?;

        let dimension = self
            .guard
            .dimension()
            .or_else(|| embeddings.first().map(Vec::len))
            .unwrap_or(0);

        let mut index = FlatIndex::with_capacity(dimension, embeddings.len());
        for embedding in embeddings {
            index.add(embedding).map_err(dimension_error)?;
        }

        debug!(
            "Built flat index over {} documents (dimension {dimension})",
            index.size()
        );
        Ok(index)
    }
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn dimension_error(err: EmbeddingError) -> RetrievalError {
    match err {
        EmbeddingError::DimensionMismatch { expected, actual } => {
            RetrievalError::EmbeddingDimensionMismatch { expected, actual }
        }
        other => RetrievalError::Embedding(other),
    }
}
