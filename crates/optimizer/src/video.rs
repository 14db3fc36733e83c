//! Video pipeline
//!
//! Every source is transcoded to H.264 MP4, H.265 MP4 and VP9 WebM, and its
//! first frame is saved as a WebP poster. Per-file settings come from the
//! override resolver; the cache remembers the resolved bitrates so a bitrate
//! change reprocesses just the affected files.

use crate::cache::{verdict, CacheEntry, CacheStore, CacheVerdict};
use crate::concurrency::ConcurrencyPlan;
use crate::encode::image::build_webp_command;
use crate::encode::{
    build_poster_frame_command, build_transcode_command, AudioParams, ToolRunner, VideoCodec,
    VideoTarget,
};
use crate::hash::hash_file;
use crate::overrides::{OverrideResolver, ResolvedSettings};
use crate::pipeline::{
    apply_reports, canonical_input, collision_reports, create_output_root, finish_run, join_all,
    process_all, run_blocking, run_commands, should_skip, split_output_collisions, FileOutcome,
    PipelineError, ProcessError, RunSummary,
};
use crate::prune::VIDEO_PRUNE_RULES;
use crate::scan::{scan_sources, SourceFile, VIDEO_EXTENSIONS};
use assetopt_config::{FormatSettings, PipelineConfig, VideoConfig, VideoFormats, WebpSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Cache record for one video source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCacheEntry {
    pub hash: String,
    /// Resolved per-format bitrates
    pub bitrates: VideoFormats,
    #[serde(default)]
    pub include_audio: bool,
}

impl CacheEntry for VideoCacheEntry {
    fn content_hash(&self) -> &str {
        &self.hash
    }

    fn same_settings(&self, other: &Self) -> bool {
        self.bitrates == other.bitrates && self.include_audio == other.include_audio
    }
}

/// Output locations for one source video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOutputs {
    pub dir: PathBuf,
    pub stem: String,
}

impl VideoOutputs {
    /// Outputs of `relative` (relative to the input root) under `output_root`.
    ///
    /// Names come from the source stem, so `.mov` and `.mp4` sources share a layout.
    pub fn new(relative: &Path, output_root: &Path) -> Self {
        let dir = match relative.parent() {
            Some(parent) => output_root.join(parent),
            None => output_root.to_path_buf(),
        };
        let stem = relative
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { dir, stem }
    }

    pub fn transcode(&self, codec: VideoCodec) -> PathBuf {
        self.dir.join(codec.file_name(&self.stem))
    }

    pub fn poster(&self) -> PathBuf {
        self.dir.join(format!("{}.webp", self.stem))
    }

    /// Every file a successful run leaves behind
    pub fn all(&self) -> Vec<PathBuf> {
        let mut outputs: Vec<PathBuf> = VideoCodec::ALL.iter().map(|c| self.transcode(*c)).collect();
        outputs.push(self.poster());
        outputs
    }
}

fn format_for(formats: &VideoFormats, codec: VideoCodec) -> &FormatSettings {
    match codec {
        VideoCodec::H264 => &formats.mp4,
        VideoCodec::H265 => &formats.h265,
        VideoCodec::Vp9 => &formats.webm,
    }
}

/// Transcode targets for resolved settings
pub fn video_targets(resolved: &ResolvedSettings, sample_rate: &str) -> Vec<VideoTarget> {
    VideoCodec::ALL
        .iter()
        .map(|&codec| {
            let format = format_for(&resolved.formats, codec);
            VideoTarget {
                codec,
                video_bitrate: format.video_bitrate.clone(),
                audio: AudioParams::for_format(resolved.include_audio, format, sample_rate),
            }
        })
        .collect()
}

struct VideoContext<R> {
    config: VideoConfig,
    runner: Arc<R>,
    resolver: OverrideResolver,
    output_root: PathBuf,
}

/// Runs the video pipeline over a configured input tree.
pub struct VideoPipeline<R> {
    config: VideoConfig,
    runner: Arc<R>,
    plan: ConcurrencyPlan,
}

impl<R: ToolRunner> VideoPipeline<R> {
    pub fn new(config: VideoConfig, runner: R, plan: ConcurrencyPlan) -> Self {
        Self {
            config,
            runner: Arc::new(runner),
            plan,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Process every video under the input directory.
    ///
    /// Per-file failures are counted in the summary; only setup problems
    /// return an error.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let resolver = OverrideResolver::new(&self.config)?;
        let input_root = canonical_input(&self.config.common.input_directory)?;
        let output_root = self.config.common.output_directory.clone();
        create_output_root(&output_root)?;

        let mut cache: CacheStore<VideoCacheEntry> = CacheStore::load(self.config.cache_file());
        let (sources, collisions) = split_output_collisions(scan_sources(&input_root, VIDEO_EXTENSIONS), |source| {
            VideoOutputs::new(&source.relative_path, Path::new("")).all()
        });
        info!(
            input = %input_root.display(),
            output = %output_root.display(),
            files = sources.len() + collisions.len(),
            overrides = self.config.individual_bitrates.len(),
            max_concurrent_files = self.plan.max_concurrent_files,
            "starting video pipeline"
        );

        let ctx = Arc::new(VideoContext {
            config: self.config.clone(),
            runner: Arc::clone(&self.runner),
            resolver,
            output_root: output_root.clone(),
        });

        let work: Vec<(PathBuf, (SourceFile, Option<VideoCacheEntry>))> = sources
            .into_iter()
            .map(|source| {
                let cached = cache.get(&source.path).cloned();
                (source.path.clone(), (source, cached))
            })
            .collect();

        let mut reports = process_all(work, self.plan.max_concurrent_files as usize, |(source, cached)| {
            let ctx = Arc::clone(&ctx);
            async move { process_video(&ctx, &source, cached).await }
        })
        .await;

        reports.extend(collision_reports(&mut cache, collisions));

        let mut summary = RunSummary::default();
        apply_reports(&mut cache, reports, &mut summary);
        finish_run(
            cache,
            &mut summary,
            self.config.common.sync_dir,
            input_root,
            output_root,
            VIDEO_PRUNE_RULES,
        )
        .await;
        Ok(summary)
    }
}

async fn process_video<R: ToolRunner>(
    ctx: &VideoContext<R>,
    source: &SourceFile,
    cached: Option<VideoCacheEntry>,
) -> Result<FileOutcome<VideoCacheEntry>, ProcessError> {
    let resolved = ctx.resolver.resolve(&source.relative_slash_path());
    if let Some(pattern) = &resolved.matched_pattern {
        debug!(path = %source.path.display(), pattern = %pattern, "override applied");
    }

    let path = source.path.clone();
    let hash = run_blocking(move || hash_file(&path).map_err(ProcessError::Hash)).await?;

    let current = VideoCacheEntry {
        hash,
        bitrates: resolved.formats.clone(),
        include_audio: resolved.include_audio,
    };
    let outputs = VideoOutputs::new(&source.relative_path, &ctx.output_root);
    let state = verdict(cached.as_ref(), &current, &outputs.all());

    if should_skip(ctx.config.common.force_optim, state) {
        info!(path = %source.path.display(), "skipping, already processed");
        return Ok(FileOutcome::Skipped);
    }
    if state == CacheVerdict::SettingsChanged {
        info!(path = %source.path.display(), "reprocessing due to settings change");
    } else {
        info!(path = %source.path.display(), reason = %state, "transcoding video");
    }

    tokio::fs::create_dir_all(&outputs.dir).await?;
    extract_poster(ctx, &source.path, &outputs).await?;

    let mut set = JoinSet::new();
    for target in video_targets(&resolved, &ctx.config.audio_frequency) {
        let cmd = build_transcode_command(&source.path, &outputs.transcode(target.codec), &target);
        let runner = Arc::clone(&ctx.runner);
        set.spawn(async move { run_commands(runner, target.codec.encoder(), vec![cmd]).await });
    }
    join_all(set).await?;

    info!(path = %source.path.display(), "video transcoded");
    Ok(FileOutcome::Processed(current))
}

/// First frame to a temporary PNG next to the outputs, then to the WebP poster.
///
/// The temporary frame is removed when it drops, on success and failure alike.
async fn extract_poster<R: ToolRunner>(
    ctx: &VideoContext<R>,
    input: &Path,
    outputs: &VideoOutputs,
) -> Result<(), ProcessError> {
    let runner = Arc::clone(&ctx.runner);
    let input = input.to_path_buf();
    let dir = outputs.dir.clone();
    let poster = outputs.poster();
    let webp = WebpSettings {
        quality: ctx.config.webp_quality,
        ..WebpSettings::default()
    };

    run_blocking(move || {
        let frame = tempfile::Builder::new()
            .prefix(".poster-")
            .suffix(".png")
            .tempfile_in(&dir)?;

        let as_poster_error = |source| ProcessError::Encode {
            target: "poster".to_string(),
            source,
        };
        runner
            .run(build_poster_frame_command(&input, frame.path()))
            .map_err(as_poster_error)?;
        runner
            .run(build_webp_command(frame.path(), &poster, &webp))
            .map_err(as_poster_error)?;
        Ok(())
    })
    .await
}
