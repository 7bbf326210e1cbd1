//! End-to-end tests for the load-or-build lifecycle and query behavior.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use docrag_embeddings::{
    EmbeddingError, EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, HashingProvider,
    OpenAIProvider,
};
use docrag_retrieval::{
    ArtifactStore, IndexOrigin, RetrievalConfig, RetrievalEngine, RetrievalError,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const FIVE_DOCS: [(&str, &str); 5] = [
    ("01-invoices.md", "Creating invoices from sales orders and posting them to the ledger."),
    ("02-payroll.md", "Running payroll, withholding taxes and paying employees."),
    ("03-inventory.txt", "Inventory valuation with FIFO and weighted average cost."),
    ("04-reports.md", "Exporting the balance sheet and profit and loss reports."),
    ("05-users.txt", "Inviting users and assigning roles and permissions."),
];

fn write_corpus(dir: &Path, docs: &[(&str, &str)]) {
    for (name, body) in docs {
        fs::write(dir.join(name), body).unwrap();
    }
}

struct Fixture {
    docs: TempDir,
    state: TempDir,
}

impl Fixture {
    fn new(docs: &[(&str, &str)]) -> Self {
        let fixture = Self {
            docs: TempDir::new().unwrap(),
            state: TempDir::new().unwrap(),
        };
        write_corpus(fixture.docs.path(), docs);
        fixture
    }

    fn config(&self) -> RetrievalConfig {
        RetrievalConfig::new(self.docs.path(), self.state.path().join("rag_index.json"))
    }

    fn index_file(&self) -> std::path::PathBuf {
        self.state.path().join("rag_index.json")
    }
}

fn hashing() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingProvider::new())
}

/// Embeds normally until `fail` is set.
struct SwitchableProvider {
    inner: HashingProvider,
    fail: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for SwitchableProvider {
    fn name(&self) -> &str {
        "switchable"
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }

    async fn embed(&self, request: EmbeddingRequest) -> docrag_embeddings::Result<EmbeddingResponse> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::ApiRequest("connection reset".to_string()));
        }
        self.inner.embed(request).await
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Claims one dimension but produces another.
struct MislabeledProvider;

#[async_trait]
impl EmbeddingProvider for MislabeledProvider {
    fn name(&self) -> &str {
        "mislabeled"
    }

    fn model(&self) -> &str {
        "mislabeled-v1"
    }

    fn dimension(&self) -> Option<usize> {
        Some(8)
    }

    async fn embed(&self, _request: EmbeddingRequest) -> docrag_embeddings::Result<EmbeddingResponse> {
        Ok(EmbeddingResponse {
            embedding: vec![0.5; 4],
            model: "mislabeled-v1".to_string(),
            dimension: 4,
            tokens_used: None,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Hashing vectors published under another provider's name.
struct RelabeledProvider {
    name: &'static str,
    inner: HashingProvider,
}

#[async_trait]
impl EmbeddingProvider for RelabeledProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }

    async fn embed(&self, request: EmbeddingRequest) -> docrag_embeddings::Result<EmbeddingResponse> {
        self.inner.embed(request).await
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Produces `wide` vectors until `narrowed` is set, then `narrow` ones.
struct NarrowingProvider {
    wide: HashingProvider,
    narrow: HashingProvider,
    narrowed: AtomicBool,
}

impl NarrowingProvider {
    fn current(&self) -> &HashingProvider {
        if self.narrowed.load(Ordering::SeqCst) {
            &self.narrow
        } else {
            &self.wide
        }
    }
}

#[async_trait]
impl EmbeddingProvider for NarrowingProvider {
    fn name(&self) -> &str {
        "narrowing"
    }

    fn model(&self) -> &str {
        "narrowing-v1"
    }

    fn dimension(&self) -> Option<usize> {
        self.current().dimension()
    }

    async fn embed(&self, request: EmbeddingRequest) -> docrag_embeddings::Result<EmbeddingResponse> {
        self.current().embed(request).await
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// OpenAI-compatible endpoint answering every input with a 3-component vector.
struct ThreeDimensionalEmbeddings;

impl Respond for ThreeDimensionalEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let texts: Vec<String> = match &body["input"] {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().unwrap_or_default().to_string())
                .collect(),
            other => vec![other.as_str().unwrap_or_default().to_string()],
        };

        let hasher = HashingProvider::with_dimension(3);
        let data: Vec<serde_json::Value> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                serde_json::json!({ "index": index, "embedding": hasher.embed_text(text).0 })
            })
            .collect();

        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "model": "mxbai-embed-large", "data": data }))
    }
}

#[tokio::test]
async fn query_matching_a_document_returns_it_first() {
    let fixture = Fixture::new(&FIVE_DOCS);
    let engine = RetrievalEngine::start(&fixture.config(), hashing())
        .await
        .unwrap();

    let query = FIVE_DOCS[2].1;
    let results = engine.retrieve(query, 3).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].ordinal, 2);
    assert_eq!(results[0].text, query);
    assert!(results[0].distance.abs() < 1e-5);
}

#[tokio::test]
async fn empty_corpus_fails_startup_without_writing_artifact() {
    let fixture = Fixture::new(&[("blank.md", "   \n")]);

    let result = RetrievalEngine::start(&fixture.config(), hashing()).await;

    assert!(matches!(result, Err(RetrievalError::CorpusEmpty { .. })));
    assert!(!fixture.index_file().exists());
}

#[tokio::test]
async fn k_larger_than_corpus_returns_every_document() {
    let fixture = Fixture::new(&FIVE_DOCS[..2]);
    let engine = RetrievalEngine::start(&fixture.config(), hashing())
        .await
        .unwrap();

    let results = engine.retrieve("payroll taxes", 10).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(engine.retrieve_relevant("payroll taxes", 10).await.len(), 2);
}

#[tokio::test]
async fn results_are_bounded_and_ordered_by_distance() {
    let fixture = Fixture::new(&FIVE_DOCS);
    let engine = RetrievalEngine::start(&fixture.config(), hashing())
        .await
        .unwrap();

    for k in 0..=7 {
        let results = engine.retrieve("roles for new users", k).await.unwrap();
        assert_eq!(results.len(), k.min(FIVE_DOCS.len()));
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
            if pair[0].distance == pair[1].distance {
                assert!(pair[0].ordinal < pair[1].ordinal);
            }
        }
    }
}

#[tokio::test]
async fn truncated_artifact_triggers_identical_rebuild() {
    let fixture = Fixture::new(&FIVE_DOCS);
    let config = fixture.config();

    let original = RetrievalEngine::start(&config, hashing()).await.unwrap();
    assert_eq!(original.origin(), IndexOrigin::Built);

    let bytes = fs::read(fixture.index_file()).unwrap();
    fs::write(fixture.index_file(), &bytes[..bytes.len() - 17]).unwrap();
    assert!(matches!(
        ArtifactStore::new(fixture.index_file()).inspect(),
        Err(RetrievalError::ArtifactCorrupt { .. })
    ));

    let rebuilt = RetrievalEngine::start(&config, hashing()).await.unwrap();
    assert_eq!(rebuilt.origin(), IndexOrigin::Built);
    assert_eq!(rebuilt.documents(), original.documents());
    assert_eq!(rebuilt.index(), original.index());

    let reloaded = RetrievalEngine::start(&config, hashing()).await.unwrap();
    assert_eq!(reloaded.origin(), IndexOrigin::Loaded);
}

#[tokio::test]
async fn repeated_queries_are_identical() {
    let fixture = Fixture::new(&FIVE_DOCS);
    let engine = RetrievalEngine::start(&fixture.config(), hashing())
        .await
        .unwrap();

    let first = engine.retrieve("ledger posting", 4).await.unwrap();
    let second = engine.retrieve("ledger posting", 4).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn independent_builds_agree() {
    let fixture = Fixture::new(&FIVE_DOCS);
    let other_state = TempDir::new().unwrap();

    let a = RetrievalEngine::rebuild(&fixture.config(), hashing())
        .await
        .unwrap();
    let b = RetrievalEngine::rebuild(
        &fixture
            .config()
            .with_index_file(other_state.path().join("rag_index.json")),
        hashing(),
    )
    .await
    .unwrap();

    for probe in ["balance sheet", "weighted average", "employees"] {
        assert_eq!(
            a.retrieve(probe, 5).await.unwrap(),
            b.retrieve(probe, 5).await.unwrap()
        );
    }
}

#[tokio::test]
async fn loaded_engine_answers_like_built_engine() {
    let fixture = Fixture::new(&FIVE_DOCS);
    let built = RetrievalEngine::start(&fixture.config(), hashing())
        .await
        .unwrap();
    let loaded = RetrievalEngine::start(&fixture.config(), hashing())
        .await
        .unwrap();

    assert_eq!(loaded.origin(), IndexOrigin::Loaded);
    assert_eq!(loaded.len(), built.len());
    for probe in ["invoices", "inventory cost", "permissions"] {
        assert_eq!(
            loaded.retrieve(probe, 3).await.unwrap(),
            built.retrieve(probe, 3).await.unwrap()
        );
    }
}

#[tokio::test]
async fn model_dimension_change_rebuilds_stale_artifact() {
    let fixture = Fixture::new(&FIVE_DOCS);
    let config = fixture.config();

    RetrievalEngine::start(&config, Arc::new(HashingProvider::with_dimension(64)))
        .await
        .unwrap();

    let upgraded = RetrievalEngine::start(&config, Arc::new(HashingProvider::with_dimension(128)))
        .await
        .unwrap();

    assert_eq!(upgraded.origin(), IndexOrigin::Built);
    assert_eq!(upgraded.index().dimension(), 128);
    assert_eq!(
        ArtifactStore::new(fixture.index_file())
            .inspect()
            .unwrap()
            .dimension,
        128
    );
}

#[tokio::test]
async fn provider_failure_degrades_to_empty_context() {
    let fixture = Fixture::new(&FIVE_DOCS);
    let provider = Arc::new(SwitchableProvider {
        inner: HashingProvider::new(),
        fail: AtomicBool::new(false),
    });

    let engine = RetrievalEngine::start(&fixture.config(), provider.clone())
        .await
        .unwrap();
    provider.fail.store(true, Ordering::SeqCst);

    let err = engine.retrieve("invoices", 3).await.unwrap_err();
    assert!(matches!(err, RetrievalError::RetrievalUnavailable(_)));
    assert!(err.is_degradable());
    assert!(engine.retrieve_relevant("invoices", 3).await.is_empty());
}

#[tokio::test]
async fn provider_dimension_drift_is_fatal_at_build() {
    let fixture = Fixture::new(&FIVE_DOCS);

    let result = RetrievalEngine::start(&fixture.config(), Arc::new(MislabeledProvider)).await;

    assert!(matches!(
        result,
        Err(RetrievalError::EmbeddingDimensionMismatch {
            expected: 8,
            actual: 4
        })
    ));
    assert!(result.err().is_some_and(|e| e.is_fatal()));
    assert!(!fixture.index_file().exists());
}

#[tokio::test]
async fn query_dimension_drift_degrades_then_rebuilds() {
    let fixture = Fixture::new(&FIVE_DOCS);
    let config = fixture.config();
    let provider = Arc::new(NarrowingProvider {
        wide: HashingProvider::with_dimension(64),
        narrow: HashingProvider::with_dimension(32),
        narrowed: AtomicBool::new(false),
    });

    let engine = RetrievalEngine::start(&config, provider.clone())
        .await
        .unwrap();
    assert_eq!(engine.index().dimension(), 64);
    provider.narrowed.store(true, Ordering::SeqCst);

    let err = engine.retrieve("invoices", 3).await.unwrap_err();
    assert!(matches!(
        err,
        RetrievalError::EmbeddingDimensionMismatch {
            expected: 64,
            actual: 32
        }
    ));
    assert!(err.is_degradable());
    assert!(engine.retrieve_relevant("invoices", 3).await.is_empty());

    let restarted = RetrievalEngine::start(&config, provider).await.unwrap();
    assert_eq!(restarted.origin(), IndexOrigin::Built);
    assert_eq!(restarted.index().dimension(), 32);
    assert_eq!(restarted.retrieve("invoices", 3).await.unwrap().len(), 3);
}

#[tokio::test]
async fn provider_change_with_same_model_rebuilds() {
    let fixture = Fixture::new(&FIVE_DOCS);
    let config = fixture.config();

    let first = RetrievalEngine::start(
        &config,
        Arc::new(HashingProvider::new().with_model("all-MiniLM-L6-v2")),
    )
    .await
    .unwrap();
    assert_eq!(first.origin(), IndexOrigin::Built);

    let switched = Arc::new(RelabeledProvider {
        name: "openai",
        inner: HashingProvider::new().with_model("all-MiniLM-L6-v2"),
    });
    let second = RetrievalEngine::start(&config, switched).await.unwrap();

    assert_eq!(second.origin(), IndexOrigin::Built);
    assert_eq!(
        ArtifactStore::new(fixture.index_file())
            .inspect()
            .unwrap()
            .provider,
        "openai"
    );
}

#[tokio::test]
async fn unlisted_model_learns_dimension_from_first_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ThreeDimensionalEmbeddings)
        .mount(&server)
        .await;

    let fixture = Fixture::new(&FIVE_DOCS);
    let config = fixture.config();
    let provider = || -> Arc<dyn EmbeddingProvider> {
        Arc::new(
            OpenAIProvider::new()
                .with_api_key("test-key")
                .with_base_url(server.uri())
                .with_model("mxbai-embed-large"),
        )
    };
    assert_eq!(provider().dimension(), None);

    let built = RetrievalEngine::start(&config, provider()).await.unwrap();
    assert_eq!(built.origin(), IndexOrigin::Built);
    assert_eq!(built.index().dimension(), 3);
    assert_eq!(
        ArtifactStore::new(fixture.index_file())
            .inspect()
            .unwrap()
            .dimension,
        3
    );

    let results = built.retrieve(FIVE_DOCS[1].1, 3).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].distance.abs() < 1e-5);

    let reloaded = RetrievalEngine::start(&config, provider()).await.unwrap();
    assert_eq!(reloaded.origin(), IndexOrigin::Loaded);
    assert_eq!(reloaded.len(), FIVE_DOCS.len());
}
