//! Cache store module for remembering which sources were already optimised.
//!
//! The cache maps an absolute source path to the content hash and encoder
//! settings used the last time the file was processed. It is loaded once at
//! the start of a run, updated in memory from per-file outcomes and written
//! back at the end. A missing or corrupt cache only costs re-encoding time, so
//! loading never fails.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while persisting the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to move cache into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// A cached record of how a source file was processed.
pub trait CacheEntry {
    /// SHA-256 hex digest of the source at processing time.
    fn content_hash(&self) -> &str;

    /// Whether both entries were produced with identical encoder settings.
    fn same_settings(&self, other: &Self) -> bool;
}

/// Outcome of comparing a cached entry against the current state of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVerdict {
    /// Hash, settings and outputs all match; nothing to do.
    Fresh,
    /// No entry for this source.
    Missing,
    /// Source content changed.
    HashMismatch,
    /// At least one expected output file is gone.
    OutputsMissing,
    /// Encoder settings differ from the cached snapshot.
    SettingsChanged,
}

impl CacheVerdict {
    pub fn is_fresh(self) -> bool {
        self == CacheVerdict::Fresh
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CacheVerdict::Fresh => "already processed",
            CacheVerdict::Missing => "no cache entry",
            CacheVerdict::HashMismatch => "file hash mismatch",
            CacheVerdict::OutputsMissing => "one or more output files missing",
            CacheVerdict::SettingsChanged => "encoder settings changed",
        }
    }
}

impl std::fmt::Display for CacheVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compares `cached` with the `current` entry for a file.
///
/// Checks run in order: entry present, hash equal, every expected output
/// exists, settings equal. The first failing check decides the verdict.
pub fn verdict<E: CacheEntry>(
    cached: Option<&E>,
    current: &E,
    expected_outputs: &[PathBuf],
) -> CacheVerdict {
    let Some(cached) = cached else {
        return CacheVerdict::Missing;
    };

    if cached.content_hash() != current.content_hash() {
        return CacheVerdict::HashMismatch;
    }

    if !expected_outputs.iter().all(|p| p.exists()) {
        return CacheVerdict::OutputsMissing;
    }

    if !cached.same_settings(current) {
        return CacheVerdict::SettingsChanged;
    }

    CacheVerdict::Fresh
}

/// True when `cached` proves the file was already processed with the current settings.
pub fn is_valid<E: CacheEntry>(cached: Option<&E>, current: &E, expected_outputs: &[PathBuf]) -> bool {
    verdict(cached, current, expected_outputs).is_fresh()
}

/// JSON-backed map from absolute source path to cache entry.
#[derive(Debug)]
pub struct CacheStore<E> {
    path: PathBuf,
    entries: BTreeMap<PathBuf, E>,
}

impl<E: Serialize + DeserializeOwned> CacheStore<E> {
    /// Load the cache at `path`.
    ///
    /// A missing file yields an empty cache. An unreadable or unparsable file
    /// is logged as a warning and also yields an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let entries = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to parse cache; starting with an empty cache"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cache file yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to read cache; starting with an empty cache"
                );
                BTreeMap::new()
            }
        };

        Self { path, entries }
    }

    /// Location the cache is persisted to
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, source: &Path) -> Option<&E> {
        self.entries.get(source)
    }

    pub fn insert(&mut self, source: PathBuf, entry: E) -> Option<E> {
        self.entries.insert(source, entry)
    }

    pub fn remove(&mut self, source: &Path) -> Option<E> {
        self.entries.remove(source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Source paths currently cached
    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    /// Drop entries whose source file no longer exists.
    ///
    /// Returns the removed source paths.
    pub fn prune_missing(&mut self) -> Vec<PathBuf> {
        let stale: Vec<PathBuf> = self
            .entries
            .keys()
            .filter(|source| !source.exists())
            .cloned()
            .collect();

        for source in &stale {
            info!(path = %source.display(), "removing from cache (file does not exist)");
            self.entries.remove(source);
        }

        stale
    }

    /// Write the cache as pretty-printed JSON.
    ///
    /// The JSON goes to a temporary file next to the cache which is then
    /// renamed over it, so a crash leaves either the old or the new cache.
    pub fn save(&self) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(&self.entries)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        debug!(path = %self.path.display(), entries = self.entries.len(), "cache saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs::File;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestEntry {
        hash: String,
        quality: u8,
    }

    impl CacheEntry for TestEntry {
        fn content_hash(&self) -> &str {
            &self.hash
        }

        fn same_settings(&self, other: &Self) -> bool {
            self.quality == other.quality
        }
    }

    fn entry(hash: &str, quality: u8) -> TestEntry {
        TestEntry {
            hash: hash.to_string(),
            quality,
        }
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let cache: CacheStore<TestEntry> = CacheStore::load(temp.path().join("cache.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();

        let cache: CacheStore<TestEntry> = CacheStore::load(&path);
        assert!(cache.is_empty());
        assert_eq!(cache.path(), path.as_path());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("cache.json");

        let mut cache = CacheStore::load(&path);
        cache.insert(PathBuf::from("/assets/a.png"), entry("aa", 80));
        cache.insert(PathBuf::from("/assets/b.png"), entry("bb", 70));
        cache.save().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\n  \"/assets/a.png\": {"), "pretty JSON expected: {content}");

        let reloaded: CacheStore<TestEntry> = CacheStore::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(Path::new("/assets/b.png")), Some(&entry("bb", 70)));
    }

    #[test]
    fn test_save_overwrites_previous_contents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");

        let mut cache = CacheStore::load(&path);
        cache.insert(PathBuf::from("/a"), entry("1", 1));
        cache.save().unwrap();
        cache.remove(Path::new("/a"));
        cache.insert(PathBuf::from("/b"), entry("2", 2));
        cache.save().unwrap();

        let reloaded: CacheStore<TestEntry> = CacheStore::load(&path);
        assert_eq!(reloaded.sources().collect::<Vec<_>>(), vec![Path::new("/b")]);
    }

    #[test]
    fn test_prune_missing_removes_vanished_sources() {
        let temp = TempDir::new().unwrap();
        let kept = temp.path().join("kept.mp4");
        File::create(&kept).unwrap();
        let gone = temp.path().join("gone.mp4");

        let mut cache = CacheStore::load(temp.path().join("cache.json"));
        cache.insert(kept.clone(), entry("k", 1));
        cache.insert(gone.clone(), entry("g", 1));

        assert_eq!(cache.prune_missing(), vec![gone]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&kept).is_some());
    }

    #[test]
    fn test_verdict_order() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("out.webp");
        File::create(&present).unwrap();
        let absent = temp.path().join("out.avif");

        let current = entry("abc", 80);
        let outputs = vec![present.clone()];

        assert_eq!(verdict(None, &current, &outputs), CacheVerdict::Missing);
        assert_eq!(
            verdict(Some(&entry("xyz", 70)), &current, &[absent.clone()]),
            CacheVerdict::HashMismatch
        );
        assert_eq!(
            verdict(Some(&entry("abc", 70)), &current, &[present.clone(), absent]),
            CacheVerdict::OutputsMissing
        );
        assert_eq!(
            verdict(Some(&entry("abc", 70)), &current, &outputs),
            CacheVerdict::SettingsChanged
        );
        assert_eq!(verdict(Some(&entry("abc", 80)), &current, &outputs), CacheVerdict::Fresh);
        assert!(is_valid(Some(&entry("abc", 80)), &current, &outputs));
        assert!(!is_valid(Some(&entry("abc", 81)), &current, &outputs));
    }
}
