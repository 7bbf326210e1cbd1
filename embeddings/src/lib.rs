//! # Embeddings
//!
//! This crate provides embedding generation and exact nearest-neighbor
//! search for the docrag retrieval engine.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors through a provider
//! - **Multiple Providers**: OpenAI-compatible HTTP endpoints and an offline hashing model
//! - **Dimension Guarding**: Reject vectors whose length drifts from the index dimension
//! - **Flat Index**: Exact L2 k-NN search with deterministic tie-breaking
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► FlatIndex                 │
//! │       │                    │              │                     │
//! │       ▼                    ▼              ▼                     │
//! │  OpenAI/Hashing      DimensionGuard    Neighbor                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod guard;
pub mod index;
pub mod provider;
pub mod similarity;

pub use error::{EmbeddingError, Result};
pub use guard::DimensionGuard;
pub use index::{DistanceMetric, FlatIndex, Neighbor};
pub use provider::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, HashingProvider, OpenAIProvider,
};
pub use similarity::{euclidean_distance, squared_euclidean_distance};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Dimension produced by the offline hashing provider, matching all-MiniLM-L6-v2.
pub const DEFAULT_DIMENSION: usize = 384;
