//! Image pipeline
//!
//! Raster sources fan out to AVIF, WebP and a re-encode in their own format,
//! as enabled by the output flags. SVG sources are minified in place of that
//! fan-out. Outputs mirror the source's relative path under the output root.

use crate::cache::{verdict, CacheEntry, CacheStore};
use crate::concurrency::ConcurrencyPlan;
use crate::encode::{build_target_commands, ImageTarget, SvgOptimizer, ToolRunner};
use crate::hash::hash_file;
use crate::pipeline::{
    apply_reports, canonical_input, collision_reports, create_output_root, finish_run, join_all,
    process_all, run_blocking, run_commands, should_skip, split_output_collisions, FileOutcome,
    PipelineError, ProcessError, RunSummary,
};
use crate::prune::IMAGE_PRUNE_RULES;
use crate::scan::{has_extension, scan_sources, SourceFile, IMAGE_EXTENSIONS};
use assetopt_config::{ImageConfig, PipelineConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::info;

/// Cache record for one image source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCacheEntry {
    pub hash: String,
    /// Encoder settings in effect when the outputs were written
    pub compression: Value,
    #[serde(rename = "svgOptions")]
    pub svg_options: Value,
}

impl CacheEntry for ImageCacheEntry {
    fn content_hash(&self) -> &str {
        &self.hash
    }

    fn same_settings(&self, other: &Self) -> bool {
        self.compression == other.compression && self.svg_options == other.svg_options
    }
}

/// Which artifacts a source produces, and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageJob {
    Svg { output: PathBuf },
    Raster { targets: Vec<(ImageTarget, PathBuf)> },
}

impl ImageJob {
    /// Plan the outputs of `relative` (relative to the input root) under `output_root`.
    pub fn plan(relative: &Path, output_root: &Path, config: &ImageConfig) -> Self {
        let mirrored = output_root.join(relative);
        if has_extension(relative, &[".svg"]) {
            return ImageJob::Svg { output: mirrored };
        }

        let mut targets = Vec::new();
        if config.output.avif {
            targets.push((ImageTarget::Avif, mirrored.with_extension(ImageTarget::Avif.extension())));
        }
        if config.output.webp {
            targets.push((ImageTarget::Webp, mirrored.with_extension(ImageTarget::Webp.extension())));
        }
        if config.output.original {
            if let Some(target) = ImageTarget::original_for(relative) {
                // Re-encodes keep the source's file name
                targets.push((target, mirrored.clone()));
            }
        }
        ImageJob::Raster { targets }
    }

    pub fn outputs(&self) -> Vec<PathBuf> {
        match self {
            ImageJob::Svg { output } => vec![output.clone()],
            ImageJob::Raster { targets } => targets.iter().map(|(_, p)| p.clone()).collect(),
        }
    }
}

struct ImageContext<R> {
    config: ImageConfig,
    runner: Arc<R>,
    svg: SvgOptimizer,
    output_root: PathBuf,
    compression: Value,
    svg_options: Value,
}

/// Runs the image pipeline over a configured input tree.
pub struct ImagePipeline<R> {
    config: ImageConfig,
    runner: Arc<R>,
    plan: ConcurrencyPlan,
    svg: Option<SvgOptimizer>,
}

impl<R: ToolRunner> ImagePipeline<R> {
    pub fn new(config: ImageConfig, runner: R, plan: ConcurrencyPlan) -> Self {
        Self {
            config,
            runner: Arc::new(runner),
            plan,
            svg: None,
        }
    }

    /// Use a prepared SVG optimizer instead of loading system fonts
    pub fn with_svg_optimizer(mut self, svg: SvgOptimizer) -> Self {
        self.svg = Some(svg);
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Process every image under the input directory.
    ///
    /// Per-file failures are counted in the summary; only setup problems
    /// return an error.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let input_root = canonical_input(&self.config.common.input_directory)?;
        let output_root = self.config.common.output_directory.clone();
        create_output_root(&output_root)?;

        let mut cache: CacheStore<ImageCacheEntry> = CacheStore::load(self.config.cache_file());
        let (sources, collisions) = split_output_collisions(scan_sources(&input_root, IMAGE_EXTENSIONS), |source| {
            ImageJob::plan(&source.relative_path, Path::new(""), &self.config).outputs()
        });
        info!(
            input = %input_root.display(),
            output = %output_root.display(),
            files = sources.len() + collisions.len(),
            max_concurrent_files = self.plan.max_concurrent_files,
            "starting image pipeline"
        );

        let has_svg = sources.iter().any(|s| has_extension(&s.path, &[".svg"]));
        let svg = match &self.svg {
            Some(svg) => svg.clone(),
            None if has_svg => SvgOptimizer::new(self.config.svg_options.clone()),
            None => SvgOptimizer::with_fontdb(self.config.svg_options.clone(), Default::default()),
        };
        let ctx = Arc::new(ImageContext {
            config: self.config.clone(),
            runner: Arc::clone(&self.runner),
            svg,
            output_root: output_root.clone(),
            compression: serde_json::to_value(&self.config.compression)?,
            svg_options: serde_json::to_value(&self.config.svg_options)?,
        });

        let work: Vec<(PathBuf, (SourceFile, Option<ImageCacheEntry>))> = sources
            .into_iter()
            .map(|source| {
                let cached = cache.get(&source.path).cloned();
                (source.path.clone(), (source, cached))
            })
            .collect();

        let mut reports = process_all(work, self.plan.max_concurrent_files as usize, |(source, cached)| {
            let ctx = Arc::clone(&ctx);
            async move { process_image(&ctx, &source, cached).await }
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
            IMAGE_PRUNE_RULES,
        )
        .await;
        Ok(summary)
    }
}

async fn process_image<R: ToolRunner>(
    ctx: &ImageContext<R>,
    source: &SourceFile,
    cached: Option<ImageCacheEntry>,
) -> Result<FileOutcome<ImageCacheEntry>, ProcessError> {
    let path = source.path.clone();
    let hash = run_blocking(move || hash_file(&path).map_err(ProcessError::Hash)).await?;

    let current = ImageCacheEntry {
        hash,
        compression: ctx.compression.clone(),
        svg_options: ctx.svg_options.clone(),
    };
    let job = ImageJob::plan(&source.relative_path, &ctx.output_root, &ctx.config);
    let state = verdict(cached.as_ref(), &current, &job.outputs());

    if should_skip(ctx.config.common.force_optim, state) {
        info!(path = %source.path.display(), "skipping, already processed");
        return Ok(FileOutcome::Skipped);
    }
    info!(path = %source.path.display(), reason = %state, "optimising image");

    match job {
        ImageJob::Svg { output } => {
            let svg = ctx.svg.clone();
            let input = source.path.clone();
            run_blocking(move || {
                svg.optimize_file(&input, &output)
                    .map_err(|source| ProcessError::Encode {
                        target: "svg".to_string(),
                        source,
                    })
            })
            .await?;
        }
        ImageJob::Raster { targets } => {
            if let Some(parent) = targets.first().and_then(|(_, p)| p.parent()) {
                tokio::fs::create_dir_all(parent).await?;
            }

            let mut set = JoinSet::new();
            for (target, output) in targets {
                let commands = build_target_commands(target, &source.path, &output, &ctx.config.compression);
                let runner = Arc::clone(&ctx.runner);
                set.spawn(async move { run_commands(runner, target.extension(), commands).await });
            }
            join_all(set).await?;
        }
    }

    info!(path = %source.path.display(), "image optimised");
    Ok(FileOutcome::Processed(current))
}
