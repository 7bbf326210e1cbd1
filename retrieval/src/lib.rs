//! # Retrieval Engine
//!
//! This crate turns a directory of text documents into a persisted vector
//! index and answers nearest-neighbor queries against it:
//!
//! - **Corpus Loader**: ordered, non-empty documents from the corpus root
//! - **Index Builder**: exact L2 index whose ordinals match the document array
//! - **Index Store**: versioned, checksummed artifact written atomically
//! - **Query Engine**: load-or-build at start, then read-only `retrieve`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Retrieval Engine                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   start ──► ArtifactStore::load ──ok──────────────┐             │
//! │                  │                                 │             │
//! │          missing/corrupt/stale                     │             │
//! │                  ▼                                 ▼             │
//! │   CorpusLoader ──► EmbeddingProvider ──► IndexBuilder            │
//! │                                            │                     │
//! │                                  ArtifactStore::save             │
//! │                                            │                     │
//! │                                            ▼                     │
//! │                                    RetrievalEngine (ready)       │
//! │                                            │                     │
//! │                                   retrieve(query, k)             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docrag_retrieval::{RetrievalConfig, SharedRetrieval};
//!
//! let retrieval = SharedRetrieval::from_config(RetrievalConfig::from_env()?)?;
//! retrieval.start().await?;
//!
//! let context = retrieval.retrieve_relevant("How do I close a period?", 3).await;
//! ```

pub mod artifact;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod shared;

pub use artifact::{ArtifactExpectation, ArtifactHeader, ArtifactStore, IndexArtifact};
pub use builder::IndexBuilder;
pub use config::{EmbeddingConfig, EmbeddingProviderType, RetrievalConfig};
pub use engine::{EngineStats, IndexOrigin, RetrievalEngine, RetrievalEngineBuilder, RetrievedDocument};
pub use error::{Result, RetrievalError};
pub use shared::{EngineState, SharedRetrieval};

// Re-export from dependencies for convenience
pub use docrag_corpus::{CorpusConfig, Document};
pub use docrag_embeddings::{EmbeddingProvider, HashingProvider, OpenAIProvider};
