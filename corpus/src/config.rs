//! Configuration types for corpus loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CorpusError, Result};

/// Configuration for a corpus root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Path to the corpus root directory.
    pub root: PathBuf,

    /// File extensions (without the dot) treated as text documents.
    pub extensions: Vec<String>,

    /// Patterns to exclude (glob patterns, matched relative to the root).
    pub exclude_patterns: Vec<String>,

    /// Maximum depth to recurse (None = unlimited).
    pub max_depth: Option<usize>,

    /// Whether to follow symbolic links.
    pub follow_symlinks: bool,
}

impl CorpusConfig {
    /// Create a new corpus config.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: Self::default_extensions(),
            exclude_patterns: Self::default_excludes(),
            max_depth: None,
            follow_symlinks: false,
        }
    }

    /// Replace the accepted extensions.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Set the maximum depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Enable following symbolic links.
    pub fn follow_symlinks(mut self) -> Self {
        self.follow_symlinks = true;
        self
    }

    fn default_extensions() -> Vec<String> {
        vec!["md".to_string(), "markdown".to_string(), "txt".to_string()]
    }

    /// Get default exclude patterns.
    fn default_excludes() -> Vec<String> {
        vec![
            // Version control
            "**/.git/**".to_string(),
            "**/.svn/**".to_string(),
            "**/.hg/**".to_string(),
            // Dependencies
            "**/node_modules/**".to_string(),
            "**/target/**".to_string(),
            "**/.venv/**".to_string(),
            "**/venv/**".to_string(),
            // IDE/Editor
            "**/.idea/**".to_string(),
            "**/.vscode/**".to_string(),
            "**/*~".to_string(),
        ]
    }

    /// Whether a file's extension marks it as a text document.
    pub fn accepts_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }

    /// Compile the exclude patterns, rejecting malformed ones.
    pub fn compile_excludes(&self) -> Result<Vec<glob::Pattern>> {
        self.exclude_patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| CorpusError::InvalidPattern(format!("{p}: {e}")))
            })
            .collect()
    }

    /// Check if a path should be excluded.
    ///
    /// Paths under the root are matched relative to it, so the location of
    /// the root itself never causes an exclusion.
    pub fn should_exclude(&self, path: &Path) -> bool {
        let Ok(patterns) = self.compile_excludes() else {
            return false;
        };
        Self::is_excluded(&patterns, &self.root, path)
    }

    pub(crate) fn is_excluded(patterns: &[glob::Pattern], root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let path_str = relative.to_string_lossy();
        patterns.iter().any(|glob| glob.matches(&path_str))
    }

    /// Human-readable list of the accepted extensions.
    pub fn extensions_display(&self) -> String {
        self.extensions
            .iter()
            .map(|e| format!(".{e}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
