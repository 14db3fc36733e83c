//! Encoder command builders and the runner that executes them.

pub mod image;
pub mod runner;
pub mod svg;
pub mod video;

pub use image::{build_target_commands, ImageTarget};
pub use runner::{program_name, EncodeError, SystemRunner, ToolRunner};
pub use svg::SvgOptimizer;
pub use video::{build_poster_frame_command, build_transcode_command, AudioParams, VideoCodec, VideoTarget};
