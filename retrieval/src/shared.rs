//! Process-wide retrieval handle.

use std::sync::Arc;

use docrag_embeddings::EmbeddingProvider;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::config::RetrievalConfig;
use crate::engine::RetrievalEngine;
use crate::error::Result;

/// Lifecycle state of a [`SharedRetrieval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Start has not completed.
    Uninitialized,
    /// The index is resident and queries are served.
    Ready,
}

/// Single owning handle for the process's retrieval engine.
///
/// [`SharedRetrieval::start`] runs the load-or-build sequence at most once,
/// even when many tasks call it concurrently; every caller receives the same
/// engine. Queries issued before start has completed are answered with an
/// empty context.
pub struct SharedRetrieval {
    config: RetrievalConfig,
    provider: Arc<dyn EmbeddingProvider>,
    engine: OnceCell<Arc<RetrievalEngine>>,
}

impl SharedRetrieval {
    /// Create an uninitialized handle.
    pub fn new(config: RetrievalConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            config,
            provider,
            engine: OnceCell::new(),
        }
    }

    /// Create an uninitialized handle using the configured provider.
    pub fn from_config(config: RetrievalConfig) -> Result<Self> {
        let provider = config.build_provider()?;
        Ok(Self::new(config, provider))
    }

    /// Bring the engine to ready, or return the already-ready engine.
    ///
    /// A failed start leaves the handle uninitialized.
    pub async fn start(&self) -> Result<Arc<RetrievalEngine>> {
        self.engine
            .get_or_try_init(|| async {
                RetrievalEngine::start(&self.config, Arc::clone(&self.provider))
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }

    /// The engine, if start has completed.
    pub fn engine(&self) -> Option<Arc<RetrievalEngine>> {
        self.engine.get().cloned()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        if self.engine.initialized() {
            EngineState::Ready
        } else {
            EngineState::Uninitialized
        }
    }

    /// Configuration the engine starts from.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Texts of the `k` nearest documents; empty when not ready or on failure.
    pub async fn retrieve_relevant(&self, query: &str, k: usize) -> Vec<String> {
        match self.engine.get() {
            Some(engine) => engine.retrieve_relevant(query, k).await,
            None => {
                warn!("Retrieval requested before the engine was started");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag_embeddings::HashingProvider;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_concurrent_start_builds_once() {
        let docs = TempDir::new().unwrap();
        fs::write(docs.path().join("a.md"), "ledger reconciliation").unwrap();
        fs::write(docs.path().join("b.md"), "inventory valuation").unwrap();
        let state = TempDir::new().unwrap();

        let shared = Arc::new(SharedRetrieval::new(
            RetrievalConfig::new(docs.path(), state.path().join("index.json")),
            Arc::new(HashingProvider::new()),
        ));
        assert_eq!(shared.state(), EngineState::Uninitialized);
        assert!(shared.retrieve_relevant("ledger", 1).await.is_empty());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { shared.start().await.unwrap() })
            })
            .collect();

        let mut engines = Vec::new();
        for handle in handles {
            engines.push(handle.await.unwrap());
        }

        assert_eq!(shared.state(), EngineState::Ready);
        assert!(engines.iter().all(|e| Arc::ptr_eq(e, &engines[0])));
        assert_eq!(
            shared.retrieve_relevant("ledger reconciliation", 1).await,
            vec!["ledger reconciliation".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_start_stays_uninitialized() {
        let docs = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();

        let shared = SharedRetrieval::new(
            RetrievalConfig::new(docs.path(), state.path().join("index.json")),
            Arc::new(HashingProvider::new()),
        );

        assert!(shared.start().await.is_err());
        assert_eq!(shared.state(), EngineState::Uninitialized);
        assert!(shared.engine().is_none());
    }
}
