//! Retrieval engine implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use docrag_corpus::{CorpusLoader, Document};
use docrag_embeddings::{
    DimensionGuard, EmbeddingError, EmbeddingProvider, EmbeddingRequest, FlatIndex,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactExpectation, ArtifactStore, IndexArtifact};
use crate::builder::{IndexBuilder, dimension_error};
use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};

/// How the resident index came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrigin {
    /// Loaded from an existing artifact.
    Loaded,
    /// Built from the corpus during this start.
    Built,
}

/// One retrieved document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Position of the document in the corpus.
    pub ordinal: usize,

    /// Document text.
    pub text: String,

    /// Euclidean distance between the query and document embeddings.
    pub distance: f32,
}

/// A ready retrieval engine.
///
/// Values of this type only exist after the load-or-build sequence has
/// succeeded, so every method serves from a complete index. The index and
/// documents are never mutated afterwards; share the engine behind an `Arc`
/// and call [`RetrievalEngine::retrieve`] from any number of tasks.
pub struct RetrievalEngine {
    /// Embedding provider used for queries.
    provider: Arc<dyn EmbeddingProvider>,

    /// Resident index geometry.
    index: FlatIndex,

    /// Documents, ordinal `i` at position `i`.
    documents: Vec<Document>,

    /// Rejects query vectors of the wrong dimension.
    guard: DimensionGuard,

    /// Where the artifact lives.
    artifact_path: PathBuf,

    /// Whether the index was loaded or built.
    origin: IndexOrigin,

    /// When the index was built.
    built_at: DateTime<Utc>,
}

impl RetrievalEngine {
    /// Create a new retrieval engine builder.
    pub fn builder() -> RetrievalEngineBuilder {
        RetrievalEngineBuilder::new()
    }

    /// Load the stored artifact, or rebuild it from the corpus.
    ///
    /// Missing, corrupt and stale artifacts fall through to a rebuild. Any
    /// failure on the rebuild path (an empty corpus, an embedding failure, an
    /// unwritable artifact location) is returned and the engine never starts.
    pub async fn start(
        config: &RetrievalConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        info!("Starting retrieval engine");

        let store = ArtifactStore::new(&config.index_file);
        let expected = ArtifactExpectation::for_provider(provider.as_ref());

        let loaded = {
            let store = store.clone();
            tokio::task::spawn_blocking(move || store.load(&expected)).await?
        };

        match loaded {
            Ok(artifact) => {
                info!(
                    "Loaded existing index from {} ({} docs)",
                    store.path().display(),
                    artifact.documents.len()
                );
                return Ok(Self::ready(
                    provider,
                    artifact,
                    store.path().to_path_buf(),
                    IndexOrigin::Loaded,
                ));
            }
            Err(RetrievalError::ArtifactMissing(path)) => {
                info!("No index file found at {}; building a new one", path.display());
            }
            Err(e) => {
                warn!("Discarding index artifact and rebuilding: {e}");
            }
        }

        Self::rebuild(config, provider).await
    }

    /// Rebuild the index from the corpus, ignoring any stored artifact.
    pub async fn rebuild(
        config: &RetrievalConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let start = Instant::now();
        info!(
            "Building index from {} with {} model {}",
            config.docs_dir().display(),
            provider.name(),
            provider.model()
        );

        let loader = CorpusLoader::new(config.corpus.clone());
        let documents = tokio::task::spawn_blocking(move || loader.load()).await??;

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let batch_size = config.embedding.batch_size.max(1);
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let vectors = provider
                .embed_texts(batch)
                .await
                .map_err(RetrievalError::Embedding)?;
            embeddings.extend(vectors);
        }

        let builder = match provider.dimension() {
            Some(dimension) => IndexBuilder::with_dimension(dimension),
            None => IndexBuilder::new(),
        };
        let index = builder.build(&documents, &embeddings)?;
        if index.dimension() == 0 {
            return Err(RetrievalError::Embedding(EmbeddingError::InvalidResponse(
                "provider returned empty embeddings".to_string(),
            )));
        }
        if provider.dimension().is_none() {
            info!(
                "Learned embedding dimension {} from {} model {}",
                index.dimension(),
                provider.name(),
                provider.model()
            );
        }
        let artifact = IndexArtifact::new(index, documents, provider.model(), provider.name());

        let store = ArtifactStore::new(&config.index_file);
        let artifact = {
            let store = store.clone();
            tokio::task::spawn_blocking(move || store.save(&artifact).map(|()| artifact)).await??
        };

        info!(
            "Built & saved index ({} docs, dimension {}) in {}ms",
            artifact.documents.len(),
            artifact.index.dimension(),
            start.elapsed().as_millis()
        );

        Ok(Self::ready(
            provider,
            artifact,
            store.path().to_path_buf(),
            IndexOrigin::Built,
        ))
    }

    fn ready(
        provider: Arc<dyn EmbeddingProvider>,
        artifact: IndexArtifact,
        artifact_path: PathBuf,
        origin: IndexOrigin,
    ) -> Self {
        let guard = DimensionGuard::with_dimension(artifact.index.dimension());
        Self {
            provider,
            index: artifact.index,
            documents: artifact.documents,
            guard,
            artifact_path,
            origin,
            built_at: artifact.built_at,
        }
    }

    /// Return up to `k` documents nearest to `query`, closest first.
    ///
    /// `k` larger than the corpus returns the whole corpus; `k == 0` returns
    /// nothing without calling the provider.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        debug!("Retrieving {k} documents for query ({} chars)", query.len());

        let response = self
            .provider
            .embed(EmbeddingRequest::new(query))
            .await
            .map_err(RetrievalError::RetrievalUnavailable)?;

        self.guard
            .check(&response.embedding)
            .map_err(dimension_error)?;

        let neighbors = self
            .index
            .search(&response.embedding, k)
            .map_err(dimension_error)?;

        Ok(neighbors
            .into_iter()
            .filter_map(|n| {
                self.documents.get(n.ordinal).map(|doc| RetrievedDocument {
                    ordinal: n.ordinal,
                    text: doc.text.clone(),
                    distance: n.distance,
                })
            })
            .collect())
    }

    /// Texts of the `k` nearest documents, or nothing if retrieval fails.
    ///
    /// Retrieval only augments a reply, so failures are logged and the
    /// caller proceeds without context.
    pub async fn retrieve_relevant(&self, query: &str, k: usize) -> Vec<String> {
        match self.retrieve(query, k).await {
            Ok(results) => {
                debug!("Retrieved {} documents", results.len());
                results.into_iter().map(|r| r.text).collect()
            }
            Err(e) => {
                warn!("Retrieval failed, continuing without context: {e}");
                Vec::new()
            }
        }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if no documents are indexed.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Indexed documents in ordinal order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Resident index.
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    /// Whether the index was loaded or built.
    pub fn origin(&self) -> IndexOrigin {
        self.origin
    }

    /// Get engine statistics.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            documents: self.documents.len(),
            dimension: self.index.dimension(),
            metric: self.index.metric().to_string(),
            model: self.provider.model().to_string(),
            provider: self.provider.name().to_string(),
            origin: self.origin,
            artifact_path: self.artifact_path.clone(),
            built_at: self.built_at,
        }
    }
}

/// Builder for the retrieval engine.
pub struct RetrievalEngineBuilder {
    config: RetrievalConfig,
    provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl RetrievalEngineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RetrievalConfig::default(),
            provider: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the corpus root.
    pub fn with_docs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.corpus.root = dir.into();
        self
    }

    /// Set the artifact location.
    pub fn with_index_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.config.index_file = file.into();
        self
    }

    /// Use a specific embedding provider instead of the configured one.
    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    fn into_parts(self) -> Result<(RetrievalConfig, Arc<dyn EmbeddingProvider>)> {
        let provider = match self.provider {
            Some(provider) => provider,
            None => self.config.build_provider()?,
        };
        Ok((self.config, provider))
    }

    /// Load or build, then return the ready engine.
    pub async fn start(self) -> Result<RetrievalEngine> {
        let (config, provider) = self.into_parts()?;
        RetrievalEngine::start(&config, provider).await
    }

    /// Force a rebuild, then return the ready engine.
    pub async fn rebuild(self) -> Result<RetrievalEngine> {
        let (config, provider) = self.into_parts()?;
        RetrievalEngine::rebuild(&config, provider).await
    }
}

impl Default for RetrievalEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    /// Number of indexed documents.
    pub documents: usize,

    /// Vector dimension.
    pub dimension: usize,

    /// Distance metric.
    pub metric: String,

    /// Embedding model identity.
    pub model: String,

    /// Embedding provider name.
    pub provider: String,

    /// Whether the index was loaded or built.
    pub origin: IndexOrigin,

    /// Artifact location.
    pub artifact_path: PathBuf,

    /// When the index was built.
    pub built_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag_embeddings::HashingProvider;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn corpus(docs: &[(&str, &str)]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        for (name, body) in docs {
            fs::write(temp_dir.path().join(name), body).unwrap();
        }
        temp_dir
    }

    #[tokio::test]
    async fn test_builder_pattern() {
        let docs = corpus(&[("a.md", "alpha document"), ("b.md", "beta document")]);
        let state = TempDir::new().unwrap();

        let engine = RetrievalEngine::builder()
            .with_docs_dir(docs.path())
            .with_index_file(state.path().join("index.json"))
            .with_provider(Arc::new(HashingProvider::with_dimension(32)))
            .start()
            .await
            .unwrap();

        assert_eq!(engine.len(), 2);
        assert_eq!(engine.origin(), IndexOrigin::Built);
        assert_eq!(engine.stats().dimension, 32);
    }

    #[tokio::test]
    async fn test_second_start_loads_artifact() {
        let docs = corpus(&[("a.md", "alpha document"), ("b.md", "beta document")]);
        let state = TempDir::new().unwrap();
        let config = RetrievalConfig::new(docs.path(), state.path().join("index.json"));
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new());

        let first = RetrievalEngine::start(&config, provider.clone()).await.unwrap();
        let second = RetrievalEngine::start(&config, provider).await.unwrap();

        assert_eq!(first.origin(), IndexOrigin::Built);
        assert_eq!(second.origin(), IndexOrigin::Loaded);
        assert_eq!(second.documents(), first.documents());
        assert_eq!(second.index(), first.index());
    }

    #[tokio::test]
    async fn test_retrieve_zero_k() {
        let docs = corpus(&[("a.md", "alpha")]);
        let state = TempDir::new().unwrap();
        let engine = RetrievalEngine::builder()
            .with_docs_dir(docs.path())
            .with_index_file(state.path().join("index.json"))
            .start()
            .await
            .unwrap();

        assert!(engine.retrieve("alpha", 0).await.unwrap().is_empty());
        assert!(engine.retrieve_relevant("alpha", 0).await.is_empty());
    }
}
