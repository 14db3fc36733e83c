//! CLI entry point for the asset optimiser
//!
//! Parses command line arguments, loads the pipeline configuration and runs
//! the image or video pipeline once.

use assetopt::{
    derive_plan, run_image_startup_checks, run_video_startup_checks, ImageConfig, ImagePipeline,
    PipelineConfig, PipelineKind, RunSummary, SystemRunner, VideoConfig, VideoPipeline,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Asset optimiser - batch image and video optimisation with a content-hash cache
#[derive(Parser, Debug)]
#[command(name = "assetopt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Skip checking that the external encoders are installed
    #[arg(long, global = true, default_value = "false")]
    skip_checks: bool,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Optimise PNG, JPEG and SVG images
    Image(RunArgs),
    /// Transcode MP4 and MOV videos
    Video(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the configuration file (YAML or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache file location
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Reprocess every file regardless of the cache
    #[arg(long, default_value = "false")]
    force: bool,

    /// Maximum files processed at once (0 = derive from CPU cores)
    #[arg(short, long)]
    jobs: Option<u32>,
}

impl RunArgs {
    fn load<C: PipelineConfig>(&self, default_path: &str) -> Option<C> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_path));
        info!(config = %path.display(), "loading configuration");

        let mut config = match C::load(&path) {
            Ok(config) => config,
            Err(e) => {
                error!(config = %path.display(), error = %e, "failed to load configuration");
                return None;
            }
        };

        let common = config.common_mut();
        if let Some(cache) = &self.cache {
            common.cache_file = Some(cache.clone());
        }
        if self.force {
            common.force_optim = true;
        }
        if let Some(jobs) = self.jobs {
            common.jobs = jobs;
        }
        Some(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .init();
}

fn exit_code(summary: &RunSummary) -> ExitCode {
    if summary.has_failures() {
        error!(failed = summary.failed, "some files failed to process");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run_image(args: &RunArgs, skip_checks: bool) -> ExitCode {
    let Some(config) = args.load::<ImageConfig>("configImage.yml") else {
        return ExitCode::FAILURE;
    };

    if skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
    } else if let Err(e) = run_image_startup_checks(&config) {
        error!(error = %e, "startup check failed");
        return ExitCode::FAILURE;
    }

    let plan = derive_plan(PipelineKind::Image, config.common.jobs);
    match ImagePipeline::new(config, SystemRunner, plan).run().await {
        Ok(summary) => exit_code(&summary),
        Err(e) => {
            error!(error = %e, "image pipeline failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_video(args: &RunArgs, skip_checks: bool) -> ExitCode {
    let Some(config) = args.load::<VideoConfig>("configVideo.yml") else {
        return ExitCode::FAILURE;
    };

    if skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
    } else if let Err(e) = run_video_startup_checks() {
        error!(error = %e, "startup check failed");
        return ExitCode::FAILURE;
    }

    let plan = derive_plan(PipelineKind::Video, config.common.jobs);
    match VideoPipeline::new(config, SystemRunner, plan).run().await {
        Ok(summary) => exit_code(&summary),
        Err(e) => {
            error!(error = %e, "video pipeline failed");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Image(args) => run_image(args, cli.skip_checks).await,
        Command::Video(args) => run_video(args, cli.skip_checks).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_video_with_overrides() {
        let cli = Cli::try_parse_from([
            "assetopt", "-v", "video", "-c", "cfg.toml", "--force", "--jobs", "2", "--skip-checks",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert!(cli.skip_checks);
        match cli.command {
            Command::Video(args) => {
                assert_eq!(args.config, Some(PathBuf::from("cfg.toml")));
                assert!(args.force);
                assert_eq!(args.jobs, Some(2));
                assert_eq!(args.cache, None);
            }
            other => panic!("expected video command, got {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["assetopt"]).is_err());
    }
}
