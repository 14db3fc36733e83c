//! Asset optimiser
//!
//! Batch image and video optimisation pipelines with a content-hash cache,
//! per-file override rules and orphan pruning of the output tree.

pub mod cache;
pub mod concurrency;
pub mod encode;
pub mod hash;
pub mod image;
pub mod overrides;
pub mod pipeline;
pub mod prune;
pub mod scan;
pub mod startup;
pub mod video;

pub use assetopt_config as config;
pub use assetopt_config::{ImageConfig, PipelineConfig, VideoConfig};
pub use cache::{is_valid, verdict, CacheEntry, CacheError, CacheStore, CacheVerdict};
pub use concurrency::{derive_plan, ConcurrencyPlan, PipelineKind};
pub use encode::{EncodeError, SvgOptimizer, SystemRunner, ToolRunner};
pub use hash::hash_file;
pub use image::{ImageCacheEntry, ImagePipeline};
pub use overrides::{matches_wildcard, wildcard_to_regex, OverrideResolver, ResolvedSettings};
pub use pipeline::{FileOutcome, PipelineError, ProcessError, RunSummary};
pub use prune::{prune_orphans, PruneReport, PruneRules, IMAGE_PRUNE_RULES, VIDEO_PRUNE_RULES};
pub use scan::{scan_sources, SourceFile, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
pub use startup::{
    check_ffmpeg_encoders, check_tool_available, missing_ffmpeg_encoders, required_image_tools,
    required_video_tools, run_image_startup_checks, run_video_startup_checks, StartupError,
};
pub use video::{VideoCacheEntry, VideoPipeline};
