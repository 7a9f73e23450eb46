//! Phase 1: file discovery
//!
//! Walks a root directory applying include and exclude globs on top of a
//! set of built-in exclusions, and emits the candidate set of
//! (path, size, mtime) with a detected language tag.

use crate::error::{IndexingError, IndexingResult};
use chunkhound_parsing::detect_language;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// Directories no code index should ever descend into
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "__pycache__",
    "node_modules",
    ".git",
    ".venv",
    "venv",
    ".mypy_cache",
    "target",
];

/// Include/exclude configuration for a walk
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Include globs; empty means everything not excluded
    pub include: Vec<String>,
    /// Exclude globs applied on top of the built-in directory exclusions
    pub exclude: Vec<String>,
}

/// One discovered file
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Absolute path under the canonicalized root
    pub path: PathBuf,
    pub size_bytes: i64,
    /// Modification time, floating seconds since epoch
    pub mtime: f64,
    /// Detected language tag; `"unknown"` when nothing matched
    pub language: &'static str,
}

/// Walk `root` and emit candidates, sorted by path
///
/// Language detection is filename match first (`Makefile`), then the
/// extension map, then `unknown`. Unreadable entries are logged and
/// dropped rather than failing the walk.
///
/// # Errors
/// `InvalidGlob` for malformed include/exclude patterns, IO errors for an
/// unreadable root.
pub fn discover(root: &Path, options: &DiscoveryOptions) -> IndexingResult<Vec<Candidate>> {
    let root = root.canonicalize()?;

    let mut overrides = OverrideBuilder::new(&root);
    for pattern in &options.include {
        overrides
            .add(pattern)
            .map_err(|e| IndexingError::InvalidGlob(e.to_string()))?;
    }
    for pattern in &options.exclude {
        // An override prefixed with ! is an exclusion
        overrides
            .add(&format!("!{pattern}"))
            .map_err(|e| IndexingError::InvalidGlob(e.to_string()))?;
    }
    for dir in DEFAULT_EXCLUDED_DIRS {
        overrides
            .add(&format!("!{dir}/"))
            .map_err(|e| IndexingError::InvalidGlob(e.to_string()))?;
    }
    let overrides = overrides
        .build()
        .map_err(|e| IndexingError::InvalidGlob(e.to_string()))?;

    let walker = WalkBuilder::new(&root)
        .overrides(overrides)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .build();

    let mut candidates = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path().to_path_buf();
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping file without metadata");
                continue;
            }
        };

        candidates.push(Candidate {
            language: detect_language(&path),
            size_bytes: metadata.len() as i64,
            mtime: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0.0, |d| d.as_secs_f64()),
            path,
        });
    }

    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(root = %root.display(), count = candidates.len(), "Discovery complete");
    Ok(candidates)
}

/// CRC32 content fingerprint of raw bytes, the second tier of the
/// change-detection cascade
pub fn content_crc32(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}
