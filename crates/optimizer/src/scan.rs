//! Scanner module for discovering source assets under an input root.
//!
//! Recursively walks the input tree and yields every file whose extension is
//! accepted by the pipeline, together with its path relative to the root.
//! Unreadable directories and entries are logged and skipped; the walk carries
//! on with the rest of the tree.

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Raster and vector sources handled by the image pipeline (case-insensitive matching).
pub const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpeg", ".jpg", ".svg"];

/// Sources handled by the video pipeline (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov"];

/// A source file discovered during scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Full path to the file (root joined with `relative_path`).
    pub path: PathBuf,
    /// Path relative to the scanned root.
    pub relative_path: PathBuf,
}

impl SourceFile {
    /// Relative path with `/` separators, used for pattern matching.
    pub fn relative_slash_path(&self) -> String {
        to_slash_path(&self.relative_path)
    }
}

/// Joins path components with `/` regardless of platform.
pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Checks if a path has one of the given extensions (case-insensitive).
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            extensions.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Scans `root` for files with one of the accepted extensions.
///
/// Traversal order is whatever the filesystem returns; callers must not rely
/// on it.
pub fn scan_sources(root: &Path, extensions: &[&str]) -> Vec<SourceFile> {
    let mut sources = Vec::new();

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    path = ?e.path(),
                    error = %e,
                    "failed to read entry while scanning; skipping"
                );
                continue;
            }
        };

        if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }

        let relative_path = match entry.path().strip_prefix(root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };

        sources.push(SourceFile {
            path: entry.path().to_path_buf(),
            relative_path,
        });
    }

    sources
}
