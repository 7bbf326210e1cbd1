//! Configuration for the retrieval engine.
//!
//! Every setting has a documented default and an environment override:
//!
//! | Variable            | Default                 | Meaning                              |
//! |---------------------|-------------------------|--------------------------------------|
//! | `DOCS_DIR`          | `../docs`               | corpus root                          |
//! | `RAG_INDEX_FILE`    | `rag_index.json`        | index artifact location              |
//! | `EMBED_PROVIDER`    | `hashing`               | `hashing` or `openai`                |
//! | `EMBED_MODEL`       | provider default        | embedding model identity             |
//! | `EMBED_API_BASE`    | OpenAI API              | OpenAI-compatible base URL           |
//! | `EMBED_DIMENSIONS`  | model default           | vector dimension the model produces  |
//! | `EMBED_REQUEST_DIMENSIONS` | unset            | shortened length sent to the endpoint |
//! | `EMBED_BATCH_SIZE`  | `256`                   | texts per embedding call at build    |
//! | `OPENAI_API_KEY`    | unset                   | bearer token for the `openai` provider |
//! | `RAG_TOP_K`         | `3`                     | default number of documents returned |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use docrag_corpus::CorpusConfig;
use docrag_embeddings::{DEFAULT_DIMENSION, EmbeddingProvider, HashingProvider, OpenAIProvider};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Default corpus root.
pub const DEFAULT_DOCS_DIR: &str = "../docs";

/// Default artifact location.
pub const DEFAULT_INDEX_FILE: &str = "rag_index.json";

/// Default number of documents handed to the language model.
pub const DEFAULT_TOP_K: usize = 3;

/// Configuration for the retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Corpus scanning configuration (root, formats, exclusions).
    pub corpus: CorpusConfig,

    /// Where the index artifact is stored.
    pub index_file: PathBuf,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Default `k` for callers that do not choose one.
    pub default_k: usize,
}

impl RetrievalConfig {
    /// Create a new configuration with default values.
    pub fn new(docs_dir: impl Into<PathBuf>, index_file: impl Into<PathBuf>) -> Self {
        Self {
            corpus: CorpusConfig::new(docs_dir),
            index_file: index_file.into(),
            embedding: EmbeddingConfig::default(),
            default_k: DEFAULT_TOP_K,
        }
    }

    /// Build a configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::default();

        if let Some(dir) = get("DOCS_DIR") {
            config.corpus.root = PathBuf::from(dir);
        }
        if let Some(file) = get("RAG_INDEX_FILE") {
            config.index_file = PathBuf::from(file);
        }
        if let Some(provider) = get("EMBED_PROVIDER") {
            config.embedding.provider = provider.parse()?;
        }
        config.embedding.model = get("EMBED_MODEL");
        config.embedding.api_base = get("EMBED_API_BASE");
        config.embedding.api_key = get("OPENAI_API_KEY");
        if let Some(dims) = get("EMBED_DIMENSIONS") {
            config.embedding.dimensions = Some(parse_positive("EMBED_DIMENSIONS", &dims)?);
        }
        if let Some(dims) = get("EMBED_REQUEST_DIMENSIONS") {
            config.embedding.request_dimensions =
                Some(parse_positive("EMBED_REQUEST_DIMENSIONS", &dims)?);
        }
        if let Some(size) = get("EMBED_BATCH_SIZE") {
            config.embedding.batch_size = parse_positive("EMBED_BATCH_SIZE", &size)?;
        }
        if let Some(k) = get("RAG_TOP_K") {
            config.default_k = parse_positive("RAG_TOP_K", &k)?;
        }

        Ok(config)
    }

    /// Set the corpus root.
    pub fn with_docs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.corpus.root = dir.into();
        self
    }

    /// Set the artifact location.
    pub fn with_index_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.index_file = file.into();
        self
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Set the corpus configuration.
    pub fn with_corpus(mut self, corpus: CorpusConfig) -> Self {
        self.corpus = corpus;
        self
    }

    /// Corpus root.
    pub fn docs_dir(&self) -> &std::path::Path {
        &self.corpus.root
    }

    /// Instantiate the configured embedding provider.
    pub fn build_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        self.embedding.build_provider()
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DOCS_DIR, DEFAULT_INDEX_FILE)
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model identity (provider default when unset).
    pub model: Option<String>,

    /// Base URL for OpenAI-compatible endpoints.
    pub api_base: Option<String>,

    /// API key for OpenAI-compatible endpoints.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Vector dimension the model produces. Unknown OpenAI-compatible models
    /// learn it from the first embedding when unset.
    pub dimensions: Option<usize>,

    /// Shortened output length requested from endpoints that support it.
    #[serde(default)]
    pub request_dimensions: Option<usize>,

    /// Number of documents embedded per provider call during a build.
    pub batch_size: usize,
}

impl EmbeddingConfig {
    /// Instantiate the configured embedding provider.
    pub fn build_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match self.provider {
            EmbeddingProviderType::Hashing => {
                let mut provider = HashingProvider::with_dimension(
                    self.dimensions
                        .or(self.request_dimensions)
                        .unwrap_or(DEFAULT_DIMENSION),
                );
                if let Some(model) = &self.model {
                    provider = provider.with_model(model);
                }
                Ok(Arc::new(provider))
            }
            EmbeddingProviderType::OpenAI => {
                let mut provider = OpenAIProvider::new();
                if let Some(model) = &self.model {
                    provider = provider.with_model(model);
                }
                if let Some(base) = &self.api_base {
                    provider = provider.with_base_url(base);
                }
                if let Some(key) = &self.api_key {
                    provider = provider.with_api_key(key);
                }
                if let Some(dims) = self.dimensions {
                    provider = provider.with_known_dimension(dims);
                }
                if let Some(dims) = self.request_dimensions {
                    provider = provider.with_dimensions(dims);
                }
                if !provider.is_available() {
                    return Err(RetrievalError::Config(
                        "the openai embedding provider requires OPENAI_API_KEY".to_string(),
                    ));
                }
                Ok(Arc::new(provider))
            }
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Hashing,
            model: None,
            api_base: None,
            api_key: None,
            dimensions: None,
            request_dimensions: None,
            batch_size: 256,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderType {
    /// Offline feature-hashing embeddings.
    Hashing,
    /// OpenAI-compatible embeddings API.
    OpenAI,
}

impl FromStr for EmbeddingProviderType {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hashing" | "local" => Ok(Self::Hashing),
            "openai" => Ok(Self::OpenAI),
            other => Err(RetrievalError::Config(format!(
                "unknown embedding provider '{other}' (expected 'hashing' or 'openai')"
            ))),
        }
    }
}

fn parse_positive(key: &str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(RetrievalError::Config(format!(
            "{key} must be a positive integer, got '{value}'"
        ))),
    }
}
