//! # Corpus
//!
//! This crate turns a directory of text documents into an ordered,
//! deterministic list of [`Document`]s for the retrieval engine.
//!
//! ## Features
//!
//! - **Recursive Scan**: Walk the corpus root and every subdirectory
//! - **Format Filtering**: Keep only plain or lightly structured text files
//! - **Exclusion Patterns**: Skip VCS, dependency and build directories
//! - **Stable Ordinals**: Lexicographic path order, empty files dropped
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Corpus Loader                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  CorpusConfig ──► CorpusLoader ──► Vec<Document>               │
//! │       │                │                                        │
//! │       ▼                ▼                                        │
//! │  ExcludePatterns   LoadStats                                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod loader;

pub use config::CorpusConfig;
pub use error::{CorpusError, Result};
pub use loader::{CorpusLoader, Document, LoadStats};
