//! Startup checks module
//!
//! Preflight checks run before a pipeline starts so a missing encoder is
//! reported once up front rather than as a failure on every file:
//! - Every external tool the configuration will invoke can be spawned
//! - ffmpeg was built with the three video encoders

use crate::encode::{ImageTarget, VideoCodec};
use assetopt_config::ImageConfig;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{tool} not available: {reason}; is it installed and in PATH?")]
    ToolUnavailable { tool: String, reason: String },

    #[error("ffmpeg is missing encoders: {0}")]
    MissingFfmpegEncoders(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flag that makes a tool print its version and exit
fn version_flag(tool: &str) -> &'static str {
    match tool {
        "ffmpeg" | "cwebp" | "cjpeg" => "-version",
        _ => "--version",
    }
}

/// Check that `tool` can be spawned.
///
/// Only the spawn is checked; some encoders exit non-zero from their version
/// flag.
pub fn check_tool_available(tool: &str) -> Result<(), StartupError> {
    Command::new(tool)
        .arg(version_flag(tool))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|_| ())
        .map_err(|e| StartupError::ToolUnavailable {
            tool: tool.to_string(),
            reason: e.to_string(),
        })
}

/// Tools the image pipeline will call with this configuration
pub fn required_image_tools(cfg: &ImageConfig) -> Vec<&'static str> {
    let mut targets = Vec::new();
    if cfg.output.avif {
        targets.push(ImageTarget::Avif);
    }
    if cfg.output.webp {
        targets.push(ImageTarget::Webp);
    }
    if cfg.output.original {
        targets.extend([ImageTarget::Jpeg, ImageTarget::Png]);
    }

    let mut tools: Vec<&'static str> = Vec::new();
    for tool in targets.into_iter().flat_map(|t| t.tools(&cfg.compression.png)) {
        if !tools.contains(tool) {
            tools.push(*tool);
        }
    }
    tools
}

/// Tools the video pipeline will call
pub fn required_video_tools() -> Vec<&'static str> {
    vec!["ffmpeg", "cwebp"]
}

/// Video encoders absent from `ffmpeg -encoders` output
///
/// Encoder lines look like ` V....D libx264   libx264 H.264 / AVC ...`; the
/// second column is the encoder name.
pub fn missing_ffmpeg_encoders(encoders_output: &str) -> Vec<&'static str> {
    let available: Vec<&str> = encoders_output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .collect();

    VideoCodec::ALL
        .iter()
        .map(|codec| codec.encoder())
        .filter(|encoder| !available.contains(encoder))
        .collect()
}

/// Check that ffmpeg can encode H.264, H.265 and VP9
pub fn check_ffmpeg_encoders() -> Result<(), StartupError> {
    let output = Command::new("ffmpeg")
        .arg("-hide_banner")
        .arg("-encoders")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| StartupError::ToolUnavailable {
            tool: "ffmpeg".to_string(),
            reason: e.to_string(),
        })?;

    let missing = missing_ffmpeg_encoders(&String::from_utf8_lossy(&output.stdout));
    if !missing.is_empty() {
        return Err(StartupError::MissingFfmpegEncoders(missing.join(", ")));
    }
    Ok(())
}

/// Run the checks for a list of tools in order, stopping at the first failure
pub fn check_tools(tools: &[&str]) -> Result<(), StartupError> {
    tools.iter().try_for_each(|tool| check_tool_available(tool))
}

/// Run all image pipeline startup checks
pub fn run_image_startup_checks(cfg: &ImageConfig) -> Result<(), StartupError> {
    check_tools(&required_image_tools(cfg))
}

/// Run all video pipeline startup checks
///
/// Checks are run in the following order:
/// 1. Tool availability
/// 2. ffmpeg encoders
pub fn run_video_startup_checks() -> Result<(), StartupError> {
    check_tools(&required_video_tools())?;
    check_ffmpeg_encoders()?;
    Ok(())
}
