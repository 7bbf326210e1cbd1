//! Index artifact persistence.
//!
//! An artifact pairs the index geometry with the parallel document texts in
//! one self-describing JSON record:
//!
//! ```text
//! { format, version, metric, dimension, model, provider, count, built_at,
//!   documents: [..], index_blob: base64(le f32 rows), checksum: sha256(blob, documents) }
//! ```
//!
//! Writes go to a temp file in the destination directory and are renamed into
//! place, so a reader sees either the previous artifact or the new one.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use docrag_corpus::Document;
use docrag_embeddings::{DistanceMetric, EmbeddingProvider, FlatIndex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{Result, RetrievalError};

/// Format tag written into every artifact.
pub const ARTIFACT_FORMAT: &str = "docrag-index";

/// Current artifact layout version.
pub const ARTIFACT_VERSION: u32 = 1;

/// Descriptive fields of an artifact, readable without decoding the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Format tag, always [`ARTIFACT_FORMAT`].
    pub format: String,

    /// Layout version.
    pub version: u32,

    /// Distance metric the index ranks by.
    pub metric: String,

    /// Vector dimension.
    pub dimension: usize,

    /// Embedding model identity the vectors came from.
    pub model: String,

    /// Embedding provider name.
    #[serde(default)]
    pub provider: String,

    /// Number of documents (and vectors).
    pub count: usize,

    /// When the artifact was built.
    pub built_at: DateTime<Utc>,
}

/// On-disk record.
#[derive(Debug, Serialize, Deserialize)]
struct ArtifactRecord {
    #[serde(flatten)]
    header: ArtifactHeader,
    documents: Vec<String>,
    index_blob: String,
    checksum: String,
}

/// What the running process requires of a loaded artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactExpectation {
    /// Name of the current provider.
    pub provider: String,

    /// Model identity of the current provider.
    pub model: String,

    /// Dimension the current provider produces, when it declares one.
    pub dimension: Option<usize>,
}

impl ArtifactExpectation {
    /// Expectation matching a provider.
    pub fn for_provider(provider: &dyn EmbeddingProvider) -> Self {
        Self {
            provider: provider.name().to_string(),
            model: provider.model().to_string(),
            dimension: provider.dimension(),
        }
    }
}

/// A built index together with its documents.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexArtifact {
    /// Index geometry.
    pub index: FlatIndex,

    /// Documents, ordinal `i` at position `i`.
    pub documents: Vec<Document>,

    /// Embedding model identity.
    pub model: String,

    /// Embedding provider name.
    pub provider: String,

    /// When the index was built.
    pub built_at: DateTime<Utc>,
}

impl IndexArtifact {
    /// Pair an index with its documents.
    pub fn new(
        index: FlatIndex,
        documents: Vec<Document>,
        model: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            index,
            documents,
            model: model.into(),
            provider: provider.into(),
            built_at: Utc::now(),
        }
    }

    /// Header describing this artifact.
    pub fn header(&self) -> ArtifactHeader {
        ArtifactHeader {
            format: ARTIFACT_FORMAT.to_string(),
            version: ARTIFACT_VERSION,
            metric: self.index.metric().to_string(),
            dimension: self.index.dimension(),
            model: self.model.clone(),
            provider: self.provider.clone(),
            count: self.documents.len(),
            built_at: self.built_at,
        }
    }
}

/// Reads and writes the index artifact at one location.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    /// Store for the artifact at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Artifact location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an artifact file is present.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Atomically write `artifact`, replacing any previous one.
    pub fn save(&self, artifact: &IndexArtifact) -> Result<()> {
        if artifact.documents.len() != artifact.index.size() {
            return Err(RetrievalError::ShapeMismatch {
                documents: artifact.documents.len(),
                embeddings: artifact.index.size(),
            });
        }

        let blob = artifact.index.to_bytes();
        let documents: Vec<String> = artifact.documents.iter().map(|d| d.text.clone()).collect();
        let record = ArtifactRecord {
            header: artifact.header(),
            checksum: checksum(&blob, &documents),
            documents,
            index_blob: BASE64.encode(&blob),
        };
        let content = serde_json::to_vec(&record)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(&content)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| RetrievalError::Io(e.error))?;

        info!(
            "Saved index artifact ({} docs, dimension {}) to {}",
            record.header.count,
            record.header.dimension,
            self.path.display()
        );
        Ok(())
    }

    /// Load and validate the artifact against the current provider.
    pub fn load(&self, expected: &ArtifactExpectation) -> Result<IndexArtifact> {
        let value = self.read_value()?;
        let header = self.parse_header(&value)?;
        self.check_fresh(&header, expected)?;

        let record = ArtifactRecord::deserialize(&value)
            .map_err(|e| self.corrupt(format!("malformed record: {e}")))?;

        let blob = BASE64
            .decode(record.index_blob.as_bytes())
            .map_err(|e| self.corrupt(format!("index blob is not base64: {e}")))?;

        if checksum(&blob, &record.documents) != record.checksum {
            return Err(self.corrupt("checksum mismatch"));
        }

        let index = FlatIndex::from_bytes(header.dimension, &blob)
            .map_err(|e| self.corrupt(e.to_string()))?;

        if index.size() != header.count || record.documents.len() != header.count {
            return Err(self.corrupt(format!(
                "header count {} but {} vectors and {} documents",
                header.count,
                index.size(),
                record.documents.len()
            )));
        }

        debug!(
            "Decoded index artifact {} ({} docs)",
            self.path.display(),
            header.count
        );

        Ok(IndexArtifact {
            index,
            documents: Document::from_texts(record.documents),
            model: header.model,
            provider: header.provider,
            built_at: header.built_at,
        })
    }

    /// Read only the header, without validating freshness.
    pub fn inspect(&self) -> Result<ArtifactHeader> {
        let value = self.read_value()?;
        self.parse_header(&value)
    }

    /// Delete the artifact so the next start rebuilds.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_value(&self) -> Result<serde_json::Value> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RetrievalError::ArtifactMissing(self.path.clone()));
            }
            Err(e) => return Err(self.corrupt(format!("unreadable: {e}"))),
        };

        serde_json::from_slice(&bytes).map_err(|e| self.corrupt(format!("invalid JSON: {e}")))
    }

    fn parse_header(&self, value: &serde_json::Value) -> Result<ArtifactHeader> {
        let header = ArtifactHeader::deserialize(value)
            .map_err(|e| self.corrupt(format!("malformed header: {e}")))?;

        if header.format != ARTIFACT_FORMAT {
            return Err(self.stale(format!("unknown format '{}'", header.format)));
        }
        if header.version != ARTIFACT_VERSION {
            return Err(self.stale(format!(
                "layout version {} (expected {ARTIFACT_VERSION})",
                header.version
            )));
        }
        Ok(header)
    }

    fn check_fresh(&self, header: &ArtifactHeader, expected: &ArtifactExpectation) -> Result<()> {
        let metric = DistanceMetric::L2.to_string();
        if header.metric != metric {
            return Err(self.stale(format!(
                "metric '{}' (expected '{metric}')",
                header.metric
            )));
        }
        if header.provider != expected.provider {
            return Err(self.stale(format!(
                "built by provider '{}' (current provider '{}')",
                header.provider, expected.provider
            )));
        }
        if header.model != expected.model {
            return Err(self.stale(format!(
                "built with model '{}' (current model '{}')",
                header.model, expected.model
            )));
        }
        match expected.dimension {
            Some(dimension) if dimension != header.dimension => {
                return Err(self.stale(format!(
                    "dimension {} (provider produces {dimension})",
                    header.dimension
                )));
            }
            _ => {}
        }
        Ok(())
    }

    fn corrupt(&self, reason: impl Into<String>) -> RetrievalError {
        RetrievalError::ArtifactCorrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn stale(&self, reason: impl Into<String>) -> RetrievalError {
        RetrievalError::ArtifactStale {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

/// SHA-256 over the index blob followed by each document's length and bytes.
fn checksum(blob: &[u8], documents: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(blob);
    for text in documents {
        hasher.update((text.len() as u64).to_le_bytes());
        hasher.update(text.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
