//! Exact nearest-neighbor index over embeddings.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EmbeddingError, Result};
use crate::similarity::squared_l2_unchecked;

/// Distance metric an index ranks neighbors by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance.
    L2,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::L2 => f.write_str("l2"),
        }
    }
}

/// A single search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Position of the matched vector in insertion order.
    pub ordinal: usize,

    /// Euclidean distance to the query.
    pub distance: f32,
}

/// A flat (brute-force) L2 index.
///
/// Vectors are stored contiguously in insertion order, so the ordinal of a
/// vector is simply its position. The index owns geometry only; callers keep
/// whatever payload the ordinals refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    /// Dimension every stored and queried vector must have.
    dimension: usize,

    /// Row-major vector storage, `len() == size() * dimension`.
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Create an empty index with room for `capacity` vectors.
    pub fn with_capacity(dimension: usize, capacity: usize) -> Self {
        Self {
            dimension,
            data: Vec::with_capacity(dimension * capacity),
        }
    }

    /// Metric this index ranks by.
    pub fn metric(&self) -> DistanceMetric {
        DistanceMetric::L2
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn size(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector and return its ordinal.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        self.check_dimension(vector)?;
        let ordinal = self.size();
        self.data.extend_from_slice(vector);
        Ok(ordinal)
    }

    /// Borrow the vector stored at `ordinal`.
    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        let start = ordinal.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Find the `k` nearest vectors to `query`.
    ///
    /// Results are ordered by ascending distance, ties broken by ascending
    /// ordinal. At most `min(k, size())` neighbors are returned.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimension(query)?;

        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(OrderedFloat<f32>, usize)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(ordinal, row)| (OrderedFloat(squared_l2_unchecked(query, row)), ordinal))
            .collect();

        let k = k.min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable(k - 1);
            scored.truncate(k);
        }
        scored.sort_unstable();

        debug!("Flat index search returned {k} of {} vectors", self.size());

        Ok(scored
            .into_iter()
            .map(|(squared, ordinal)| Neighbor {
                ordinal,
                distance: squared.0.sqrt(),
            })
            .collect())
    }

    /// Serialize the geometry as little-endian `f32` values.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Rebuild an index from bytes produced by [`FlatIndex::to_bytes`].
    pub fn from_bytes(dimension: usize, bytes: &[u8]) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbeddingError::InvalidBlob(
                "dimension must be positive".to_string(),
            ));
        }

        let row_bytes = dimension * size_of::<f32>();
        if bytes.len() % row_bytes != 0 {
            return Err(EmbeddingError::InvalidBlob(format!(
                "{} bytes is not a whole number of {dimension}-dimensional rows",
                bytes.len()
            )));
        }

        let data: Vec<f32> = bytes
            .chunks_exact(size_of::<f32>())
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        if data.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::InvalidBlob(
                "non-finite component".to_string(),
            ));
        }

        Ok(Self { dimension, data })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}
