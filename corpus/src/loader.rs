//! Document loading for corpus scanning.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::error::{CorpusError, Result};

/// One corpus document.
///
/// Identity is positional: `ordinal` is the document's index in the text
/// array the index is built over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Position in the corpus.
    pub ordinal: usize,

    /// Trimmed, non-empty document text.
    pub text: String,
}

impl Document {
    /// Create a document.
    pub fn new(ordinal: usize, text: impl Into<String>) -> Self {
        Self {
            ordinal,
            text: text.into(),
        }
    }

    /// Assign dense ordinals to a sequence of texts.
    pub fn from_texts<I, S>(texts: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| Self::new(ordinal, text))
            .collect()
    }
}

/// Loads documents from a corpus root.
pub struct CorpusLoader {
    /// Configuration.
    config: CorpusConfig,
}

impl CorpusLoader {
    /// Create a new corpus loader.
    pub fn new(config: CorpusConfig) -> Self {
        Self { config }
    }

    /// The loader's configuration.
    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    /// Scan the root and load every non-empty text document.
    ///
    /// Files are read in lexicographic path order so repeated loads of an
    /// unchanged tree assign identical ordinals.
    pub fn load(&self) -> Result<Vec<Document>> {
        self.load_with_stats().map(|(documents, _)| documents)
    }

    /// Like [`CorpusLoader::load`], also reporting what was skipped.
    pub fn load_with_stats(&self) -> Result<(Vec<Document>, LoadStats)> {
        let start = Instant::now();
        let mut stats = LoadStats::default();

        let paths = self.candidate_paths(&mut stats)?;

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to read {}: {e}", path.display());
                    stats.unreadable += 1;
                    continue;
                }
            };

            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Skipping non UTF-8 document {}", path.display());
                    stats.unreadable += 1;
                    continue;
                }
            };

            let trimmed = text.trim();
            if trimmed.is_empty() {
                debug!("Skipping empty document {}", path.display());
                stats.empty += 1;
                continue;
            }

            debug!("Loaded document #{} from {}", documents.len(), path.display());
            documents.push(Document::new(documents.len(), trimmed));
        }

        stats.documents = documents.len();
        stats.duration_ms = start.elapsed().as_millis() as u64;

        if documents.is_empty() {
            return Err(CorpusError::CorpusEmpty {
                root: self.config.root.clone(),
                extensions: self.config.extensions_display(),
            });
        }

        info!(
            "Loaded {} documents from {} in {}ms (empty: {}, unreadable: {}, excluded: {})",
            stats.documents,
            self.config.root.display(),
            stats.duration_ms,
            stats.empty,
            stats.unreadable,
            stats.excluded
        );

        Ok((documents, stats))
    }

    /// Sorted list of files that pass the extension and exclusion filters.
    fn candidate_paths(&self, stats: &mut LoadStats) -> Result<Vec<PathBuf>> {
        let root = &self.config.root;
        if !root.is_dir() {
            warn!("Corpus root {} does not exist or is not a directory", root.display());
            return Ok(Vec::new());
        }

        let patterns = self.config.compile_excludes()?;

        let walker = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .max_depth(self.config.max_depth.unwrap_or(usize::MAX))
            .sort_by_file_name();

        let mut paths = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable corpus entry: {e}");
                    continue;
                }
            };

            // Skip directories (we only index files)
            if !entry.file_type().is_file() && !entry.path().is_file() {
                continue;
            }

            let path = entry.path();
            if !self.config.accepts_extension(path) {
                continue;
            }

            if CorpusConfig::is_excluded(&patterns, root, path) {
                stats.excluded += 1;
                continue;
            }

            paths.push(path.to_path_buf());
        }

        paths.sort();
        stats.files_scanned = paths.len();
        Ok(paths)
    }
}

/// Statistics about one corpus load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    /// Candidate files after filtering.
    pub files_scanned: usize,

    /// Documents produced.
    pub documents: usize,

    /// Files dropped because they were blank after trimming.
    pub empty: usize,

    /// Files that could not be read or were not UTF-8.
    pub unreadable: usize,

    /// Text files matched by an exclude pattern.
    pub excluded: usize,

    /// Time taken in milliseconds.
    pub duration_ms: u64,
}
