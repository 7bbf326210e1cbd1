//! Dimension tracking across embedding calls.

use std::sync::OnceLock;

use tracing::debug;

use crate::error::{EmbeddingError, Result};

/// Records the embedding dimension once and rejects any later drift.
///
/// The dimension is either declared up front or taken from the first vector
/// checked. Safe to share between threads.
#[derive(Debug, Default)]
pub struct DimensionGuard {
    dimension: OnceLock<usize>,
}

impl DimensionGuard {
    /// Create a guard that learns the dimension from the first vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a guard with a known dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        let guard = Self::new();
        let _ = guard.dimension.set(dimension);
        guard
    }

    /// The recorded dimension, if any vector has been seen.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    /// Check one vector, recording its length if none is known yet.
    pub fn check(&self, vector: &[f32]) -> Result<()> {
        let expected = *self.dimension.get_or_init(|| {
            debug!("Recorded embedding dimension {}", vector.len());
            vector.len()
        });

        if vector.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Check every vector in a batch.
    pub fn check_all<V: AsRef<[f32]>>(&self, vectors: &[V]) -> Result<()> {
        vectors.iter().try_for_each(|v| self.check(v.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_learns_from_first_vector() {
        let guard = DimensionGuard::new();
        assert_eq!(guard.dimension(), None);

        guard.check(&[1.0, 2.0]).unwrap();
        assert_eq!(guard.dimension(), Some(2));
        guard.check(&[3.0, 4.0]).unwrap();
    }

    #[test]
    fn test_rejects_drift() {
        let guard = DimensionGuard::with_dimension(3);
        assert!(matches!(
            guard.check(&[1.0, 2.0]),
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_check_all_mixed_batch() {
        let guard = DimensionGuard::new();
        let batch = vec![vec![1.0, 0.0], vec![0.0, 1.0, 0.0]];
        assert!(guard.check_all(&batch).is_err());
    }
}
