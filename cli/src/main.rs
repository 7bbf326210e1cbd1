//! Command-line front end for the docrag retrieval engine.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser as _;
use docrag_retrieval::{
    ArtifactExpectation, ArtifactStore, EmbeddingProviderType, RetrievalConfig, RetrievalEngine,
    RetrievalError,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser)]
#[command(name = "docrag")]
#[command(about = "Build and query a semantic index over a directory of documents")]
struct Args {
    /// Corpus root (overrides DOCS_DIR)
    #[arg(long, global = true)]
    docs_dir: Option<PathBuf>,

    /// Index artifact location (overrides RAG_INDEX_FILE)
    #[arg(long, global = true)]
    index_file: Option<PathBuf>,

    /// Embedding provider: hashing or openai (overrides EMBED_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Embedding model identity (overrides EMBED_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Rebuild the index from the corpus, replacing any stored artifact
    Build,

    /// Retrieve the documents nearest to a query
    Query {
        /// The query text
        text: String,

        /// Number of documents to return (defaults to RAG_TOP_K)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Describe the stored artifact and whether the next start would reuse it
    Status,
}

impl Args {
    fn apply(&self, mut config: RetrievalConfig) -> anyhow::Result<RetrievalConfig> {
        if let Some(dir) = &self.docs_dir {
            config.corpus.root = dir.clone();
        }
        if let Some(file) = &self.index_file {
            config.index_file = file.clone();
        }
        if let Some(provider) = &self.provider {
            config.embedding.provider = provider.parse::<EmbeddingProviderType>()?;
        }
        if let Some(model) = &self.model {
            config.embedding.model = Some(model.clone());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args
        .apply(RetrievalConfig::from_env()?)
        .context("invalid configuration")?;
    debug!(
        docs_dir = %config.docs_dir().display(),
        index_file = %config.index_file.display(),
        provider = ?config.embedding.provider,
        "Resolved configuration"
    );

    match &args.command {
        Command::Build => build(&config).await,
        Command::Query { text, k } => query(&config, text, k.unwrap_or(config.default_k)).await,
        Command::Status => status(&config),
    }
}

async fn build(config: &RetrievalConfig) -> anyhow::Result<()> {
    let provider = config.build_provider()?;
    let engine = RetrievalEngine::rebuild(config, provider)
        .await
        .context("index build failed")?;

    let stats = engine.stats();
    println!(
        "Indexed {} documents (dimension {}, model {}) -> {}",
        stats.documents,
        stats.dimension,
        stats.model,
        stats.artifact_path.display()
    );
    Ok(())
}

async fn query(config: &RetrievalConfig, text: &str, k: usize) -> anyhow::Result<()> {
    let provider = config.build_provider()?;
    let engine = RetrievalEngine::start(config, provider)
        .await
        .context("retrieval engine failed to start")?;

    let results = engine.retrieve(text, k).await?;
    if results.is_empty() {
        println!("No documents retrieved.");
    }
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. [doc {}] distance {:.4}\n{}\n",
            rank + 1,
            result.ordinal,
            result.distance,
            preview(&result.text, 400)
        );
    }
    Ok(())
}

fn status(config: &RetrievalConfig) -> anyhow::Result<()> {
    let store = ArtifactStore::new(&config.index_file);
    println!("Artifact: {}", store.path().display());

    match store.inspect() {
        Ok(header) => {
            println!("  format:    {} v{}", header.format, header.version);
            println!("  metric:    {}", header.metric);
            println!("  dimension: {}", header.dimension);
            println!("  model:     {} ({})", header.model, header.provider);
            println!("  documents: {}", header.count);
            println!("  built at:  {}", header.built_at.to_rfc3339());
        }
        Err(RetrievalError::ArtifactMissing(_)) => {
            println!("  missing; the next start will build from {}", config.docs_dir().display());
            return Ok(());
        }
        Err(e) => {
            println!("  unusable ({e}); the next start will rebuild");
            return Ok(());
        }
    }

    let provider = config.build_provider()?;
    match store.load(&ArtifactExpectation::for_provider(provider.as_ref())) {
        Ok(_) => println!("  status:    current"),
        Err(e) => println!("  status:    will rebuild ({e})"),
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
