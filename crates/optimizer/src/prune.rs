//! Orphan pruner for output trees.
//!
//! Walks the output tree alongside the input tree and removes every output
//! whose source is gone. A file is kept when the mirrored input directory holds
//! an accepted source with the same stem (compared case-insensitively, after
//! stripping a known output suffix). Output directories with no input
//! counterpart are removed with everything below them.
//!
//! Must only run after every file task of the run has finished, otherwise an
//! output that is still being written could be deleted.

use crate::scan::{has_extension, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// What counts as a source and which output suffixes map back to one
#[derive(Debug, Clone, Copy)]
pub struct PruneRules {
    pub source_extensions: &'static [&'static str],
    /// Stem suffixes added by the encoders, e.g. `-h265`
    pub strip_suffixes: &'static [&'static str],
}

pub const IMAGE_PRUNE_RULES: PruneRules = PruneRules {
    source_extensions: IMAGE_EXTENSIONS,
    strip_suffixes: &[],
};

pub const VIDEO_PRUNE_RULES: PruneRules = PruneRules {
    source_extensions: VIDEO_EXTENSIONS,
    strip_suffixes: &["-h265"],
};

/// Totals from one pruning pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub files_removed: usize,
    pub dirs_removed: usize,
    /// Entries that could not be read or removed
    pub errors: usize,
}

impl PruneReport {
    pub fn removed(&self) -> usize {
        self.files_removed + self.dirs_removed
    }
}

/// Remove outputs under `output_root` that no longer have a source under `input_root`.
pub fn prune_orphans(input_root: &Path, output_root: &Path, rules: &PruneRules) -> PruneReport {
    let mut report = PruneReport::default();
    if !output_root.is_dir() {
        debug!(path = %output_root.display(), "output directory missing; nothing to prune");
        return report;
    }
    prune_dir(input_root, output_root, rules, &mut report);
    report
}

fn prune_dir(input_dir: &Path, output_dir: &Path, rules: &PruneRules, report: &mut PruneReport) {
    let entries = match fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %output_dir.display(), error = %e, "failed to read output directory");
            report.errors += 1;
            return;
        }
    };
    let stems = source_stems(input_dir, rules);

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %output_dir.display(), error = %e, "failed to read output entry");
                report.errors += 1;
                continue;
            }
        };
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

        if is_dir {
            let counterpart = input_dir.join(entry.file_name());
            if counterpart.is_dir() {
                prune_dir(&counterpart, &path, rules, report);
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "removed orphaned directory");
                    report.dirs_removed += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove orphaned directory");
                    report.errors += 1;
                }
            }
        } else if !has_source(&path, &stems, rules) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "removed orphaned output");
                    report.files_removed += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove orphaned output");
                    report.errors += 1;
                }
            }
        }
    }
}

/// Lowercased stems of the accepted sources directly inside `input_dir`
fn source_stems(input_dir: &Path, rules: &PruneRules) -> HashSet<String> {
    let Ok(entries) = fs::read_dir(input_dir) else {
        return HashSet::new();
    };

    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, rules.source_extensions))
        .filter_map(|path| lowercase_stem(&path))
        .collect()
}

fn lowercase_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_lowercase)
}

fn has_source(output: &Path, stems: &HashSet<String>, rules: &PruneRules) -> bool {
    let Some(stem) = lowercase_stem(output) else {
        return false;
    };
    if stems.contains(&stem) {
        return true;
    }
    rules.strip_suffixes.iter().any(|suffix| {
        stem.strip_suffix(suffix)
            .is_some_and(|base| stems.contains(base))
    })
}
