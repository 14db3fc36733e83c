//! Shared pipeline machinery
//!
//! Both pipelines follow the same shape: the controller loads the cache,
//! scans the input tree and spawns one task per source file. Tasks are bounded
//! by a semaphore, never touch the cache, and report a [`FileReport`]. The
//! controller applies the reports to the cache, prunes orphans and saves.

use crate::cache::{CacheStore, CacheVerdict};
use crate::encode::{EncodeError, ToolRunner};
use crate::prune::{prune_orphans, PruneReport, PruneRules};
use crate::scan::{to_slash_path, SourceFile};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{error, info, warn};

/// Error for a single source file. Never aborts the batch.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to hash source: {0}")]
    Hash(#[source] std::io::Error),

    #[error("{target} encode failed: {source}")]
    Encode {
        target: String,
        #[source]
        source: EncodeError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task failed: {0}")]
    Task(String),

    #[error("outputs would overwrite those of {}", other.display())]
    OutputCollision { other: PathBuf },
}

/// Error that stops a whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input directory {path} is not accessible: {source}")]
    InputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid override pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("failed to snapshot encoder settings: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Result of a file task that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome<E> {
    /// Outputs were (re)generated; the entry replaces the cached one
    Processed(E),
    /// Cache proved the outputs current
    Skipped,
}

/// What a file task hands back to the controller
#[derive(Debug)]
pub struct FileReport<E> {
    /// Absolute source path, also the cache key
    pub source: PathBuf,
    pub result: Result<FileOutcome<E>, ProcessError>,
}

/// Totals for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Output files and directories removed by the pruner
    pub pruned_outputs: usize,
    /// Cache entries dropped because their source is gone
    pub pruned_cache_entries: usize,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Whether a cached entry lets the file be skipped
pub(crate) fn should_skip(force: bool, verdict: CacheVerdict) -> bool {
    !force && verdict.is_fresh()
}

/// Canonical form of the input root, so cache keys are absolute
pub(crate) fn canonical_input(path: &Path) -> Result<PathBuf, PipelineError> {
    std::fs::canonicalize(path).map_err(|source| PipelineError::InputDirectory {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn create_output_root(path: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(path).map_err(|source| PipelineError::OutputDirectory {
        path: path.to_path_buf(),
        source,
    })
}

/// Split off sources whose outputs would overwrite another source's outputs.
///
/// Output names are compared case-insensitively, relative to the output root.
/// Sources are taken in relative path order and the first one to claim an
/// output keeps it; each rejected source is returned with the path of the
/// source it clashes with.
pub(crate) fn split_output_collisions<F>(
    mut sources: Vec<SourceFile>,
    outputs_of: F,
) -> (Vec<SourceFile>, Vec<(SourceFile, PathBuf)>)
where
    F: Fn(&SourceFile) -> Vec<PathBuf>,
{
    sources.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let mut claimed: HashMap<String, PathBuf> = HashMap::new();
    let mut kept = Vec::with_capacity(sources.len());
    let mut rejected = Vec::new();

    for source in sources {
        let names: Vec<String> = outputs_of(&source)
            .iter()
            .map(|p| to_slash_path(p).to_lowercase())
            .collect();

        if let Some(owner) = names.iter().find_map(|name| claimed.get(name)) {
            rejected.push((source, owner.clone()));
            continue;
        }
        for name in names {
            claimed.insert(name, source.path.clone());
        }
        kept.push(source);
    }

    (kept, rejected)
}

/// Failure reports for sources rejected by [`split_output_collisions`].
///
/// Their cache entries are dropped so they are retried once the clash is resolved.
pub(crate) fn collision_reports<E>(
    cache: &mut CacheStore<E>,
    collisions: Vec<(SourceFile, PathBuf)>,
) -> Vec<FileReport<E>>
where
    E: Serialize + DeserializeOwned,
{
    collisions
        .into_iter()
        .map(|(source, other)| {
            cache.remove(&source.path);
            FileReport {
                source: source.path,
                result: Err(ProcessError::OutputCollision { other }),
            }
        })
        .collect()
}

/// Run blocking work on the blocking pool
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ProcessError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProcessError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ProcessError::Task(e.to_string()))?
}

/// Run `commands` one after another through the runner on a blocking thread.
pub(crate) async fn run_commands<R: ToolRunner>(
    runner: Arc<R>,
    target: &str,
    commands: Vec<Command>,
) -> Result<(), ProcessError> {
    let target = target.to_string();
    run_blocking(move || {
        for cmd in commands {
            runner.run(cmd).map_err(|source| ProcessError::Encode {
                target: target.clone(),
                source,
            })?;
        }
        Ok(())
    })
    .await
}

/// Await every task in `set`; returns the first error once all have finished.
pub(crate) async fn join_all(mut set: JoinSet<Result<(), ProcessError>>) -> Result<(), ProcessError> {
    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        let result = joined.unwrap_or_else(|e| Err(ProcessError::Task(e.to_string())));
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Spawn `process` for every `(source, item)` pair with at most `limit`
/// running at once and collect the reports in completion order.
///
/// A task that panics is reported as a failure of its source.
pub(crate) async fn process_all<I, E, F, Fut>(
    items: Vec<(PathBuf, I)>,
    limit: usize,
    process: F,
) -> Vec<FileReport<E>>
where
    I: Send + 'static,
    E: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<FileOutcome<E>, ProcessError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();
    let mut sources: HashMap<Id, PathBuf> = HashMap::new();

    for (source, item) in items {
        let semaphore = Arc::clone(&semaphore);
        let task = process(item);
        let handle = set.spawn(async move {
            // The semaphore is never closed
            let _permit = semaphore.acquire_owned().await.ok();
            task.await
        });
        sources.insert(handle.id(), source);
    }

    let mut reports = Vec::new();
    while let Some(joined) = set.join_next_with_id().await {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => {
                error!(error = %e, "file task panicked");
                (e.id(), Err(ProcessError::Task(e.to_string())))
            }
        };
        let source = sources.remove(&id).unwrap_or_default();
        reports.push(FileReport { source, result });
    }
    reports
}

/// Fold task reports into the cache and the summary.
///
/// Failed files keep whatever entry they had so the next run retries them.
pub(crate) fn apply_reports<E>(cache: &mut CacheStore<E>, reports: Vec<FileReport<E>>, summary: &mut RunSummary)
where
    E: Serialize + DeserializeOwned,
{
    for report in reports {
        match report.result {
            Ok(FileOutcome::Processed(entry)) => {
                cache.insert(report.source, entry);
                summary.processed += 1;
            }
            Ok(FileOutcome::Skipped) => summary.skipped += 1,
            Err(e) => {
                error!(path = %report.source.display(), error = %e, "failed to process file");
                summary.failed += 1;
            }
        }
    }
}

/// End-of-run housekeeping: prune orphans, drop stale cache keys, save.
///
/// Runs on the blocking pool. Nothing here is fatal; failures are logged.
pub(crate) async fn finish_run<E>(
    mut cache: CacheStore<E>,
    summary: &mut RunSummary,
    sync_dir: bool,
    input_root: PathBuf,
    output_root: PathBuf,
    rules: PruneRules,
) where
    E: Serialize + DeserializeOwned + Send + 'static,
{
    let housekeeping = tokio::task::spawn_blocking(move || {
        let pruned = sync_dir.then(|| prune_orphans(&input_root, &output_root, &rules));
        let stale = cache.prune_missing().len();
        if let Err(e) = cache.save() {
            warn!(path = %cache.path().display(), error = %e, "failed to save cache");
        }
        (pruned, stale)
    })
    .await;

    match housekeeping {
        Ok((pruned, stale)) => {
            if let Some(PruneReport {
                files_removed,
                dirs_removed,
                errors,
            }) = pruned
            {
                if errors > 0 {
                    warn!(errors, "some orphaned outputs could not be removed");
                }
                summary.pruned_outputs = files_removed + dirs_removed;
            }
            summary.pruned_cache_entries = stale;
        }
        Err(e) => error!(error = %e, "end-of-run housekeeping panicked"),
    }

    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        pruned_outputs = summary.pruned_outputs,
        pruned_cache_entries = summary.pruned_cache_entries,
        "run finished"
    );
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::encode::{program_name, EncodeError, ToolRunner};
    use std::fs;
    use std::path::PathBuf;
    use std::process::Command;
    use std::sync::Mutex;

    const OUTPUT_FLAGS: &[&str] = &["-o", "-outfile", "--out", "--output"];

    /// Fake encoder that records invocations and writes a placeholder output
    #[derive(Debug, Default)]
    pub struct RecordingRunner {
        calls: Mutex<Vec<(String, Vec<String>)>>,
        failing_tools: Vec<String>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Runner that reports `tools` as failing
        pub fn failing(tools: &[&str]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failing_tools: tools.iter().map(|t| t.to_string()).collect(),
            }
        }

        pub fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn count_of(&self, tool: &str) -> usize {
            self.calls().iter().filter(|(p, _)| p == tool).count()
        }

        /// Outputs written by every recorded call
        pub fn outputs(&self) -> Vec<PathBuf> {
            self.calls()
                .iter()
                .filter_map(|(_, args)| output_arg(args))
                .collect()
        }
    }

    fn output_arg(args: &[String]) -> Option<PathBuf> {
        args.windows(2)
            .find(|w| OUTPUT_FLAGS.contains(&w[0].as_str()))
            .map(|w| PathBuf::from(&w[1]))
            .or_else(|| args.last().map(PathBuf::from))
    }

    impl ToolRunner for RecordingRunner {
        fn run(&self, cmd: Command) -> Result<(), EncodeError> {
            let tool = program_name(&cmd);
            let args: Vec<String> = cmd
                .get_args()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            self.calls.lock().unwrap().push((tool.clone(), args.clone()));

            if self.failing_tools.contains(&tool) {
                return Err(EncodeError::ToolFailed {
                    tool,
                    code: 1,
                    stderr: "simulated failure".to_string(),
                });
            }

            if let Some(output) = output_arg(&args) {
                fs::write(output, b"encoded")?;
            }
            Ok(())
        }
    }
}
