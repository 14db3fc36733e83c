//! Configuration for the asset optimisation pipelines
//!
//! Handles loading image/video pipeline configuration from YAML or TOML files
//! and environment variable overrides.

pub mod config;
pub mod image;
pub mod video;

pub use config::*;
pub use image::*;
pub use video::*;
