//! ffmpeg command builders for video transcodes and poster frames.

use assetopt_config::FormatSettings;
use std::path::Path;
use std::process::Command;

/// Video codec of a transcode target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    /// H.264 in MP4
    H264,
    /// H.265 in MP4
    H265,
    /// VP9 in WebM
    Vp9,
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 3] = [VideoCodec::H264, VideoCodec::H265, VideoCodec::Vp9];

    /// ffmpeg encoder name
    pub fn encoder(self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
            VideoCodec::Vp9 => "libvpx-vp9",
        }
    }

    /// Suffix appended to the output file stem
    pub fn suffix(self) -> &'static str {
        match self {
            VideoCodec::H265 => "-h265",
            VideoCodec::H264 | VideoCodec::Vp9 => "",
        }
    }

    /// Container extension
    pub fn extension(self) -> &'static str {
        match self {
            VideoCodec::H264 | VideoCodec::H265 => "mp4",
            VideoCodec::Vp9 => "webm",
        }
    }

    /// Output file name for a source stem, e.g. `intro` -> `intro-h265.mp4`
    pub fn file_name(self, stem: &str) -> String {
        format!("{}{}.{}", stem, self.suffix(), self.extension())
    }
}

/// Audio parameters for a target with audio enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioParams {
    pub bitrate: String,
    pub sample_rate: String,
}

impl AudioParams {
    /// Audio for a format, or `None` when the audio stream must be dropped.
    ///
    /// Audio is only kept when it is enabled and the format has a bitrate.
    pub fn for_format(
        include_audio: bool,
        format: &FormatSettings,
        sample_rate: &str,
    ) -> Option<Self> {
        if !include_audio {
            return None;
        }
        format.audio_bitrate.as_ref().map(|bitrate| AudioParams {
            bitrate: bitrate.clone(),
            sample_rate: sample_rate.to_string(),
        })
    }
}

/// One transcode of a source video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTarget {
    pub codec: VideoCodec,
    pub video_bitrate: String,
    pub audio: Option<AudioParams>,
}

/// ffmpeg transcode to `output`
///
/// Streams are always yuv420p with `+faststart`; without audio params the
/// audio stream is stripped with `-an`.
pub fn build_transcode_command(input: &Path, output: &Path, target: &VideoTarget) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner").arg("-loglevel").arg("error");
    cmd.arg("-y");
    cmd.arg("-i").arg(input);
    cmd.arg("-c:v").arg(target.codec.encoder());
    cmd.arg("-pix_fmt").arg("yuv420p");
    cmd.arg("-b:v").arg(&target.video_bitrate);

    match &target.audio {
        Some(audio) => {
            cmd.arg("-b:a").arg(&audio.bitrate);
            cmd.arg("-ar").arg(&audio.sample_rate);
        }
        None => {
            cmd.arg("-an");
        }
    }

    cmd.arg("-movflags").arg("+faststart");
    cmd.arg(output);
    cmd
}

/// ffmpeg extraction of the first frame into `frame_png`
pub fn build_poster_frame_command(input: &Path, frame_png: &Path) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner").arg("-loglevel").arg("error");
    cmd.arg("-y");
    cmd.arg("-i").arg(input);
    cmd.arg("-vf").arg("select=eq(n\\,0)");
    cmd.arg("-q:v").arg("3");
    cmd.arg("-frames:v").arg("1");
    cmd.arg(frame_png);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::test_util::{get_command_args, has_flag, has_flag_with_value};
    use proptest::prelude::*;
    use std::ffi::OsStr;

    #[test]
    fn test_file_names() {
        assert_eq!(VideoCodec::H264.file_name("intro"), "intro.mp4");
        assert_eq!(VideoCodec::H265.file_name("intro"), "intro-h265.mp4");
        assert_eq!(VideoCodec::Vp9.file_name("intro"), "intro.webm");
    }

    #[test]
    fn test_audio_params() {
        let with = FormatSettings::new("2M", Some("128k"));
        let without = FormatSettings::new("2M", None);

        assert_eq!(
            AudioParams::for_format(true, &with, "44100"),
            Some(AudioParams { bitrate: "128k".into(), sample_rate: "44100".into() })
        );
        assert_eq!(AudioParams::for_format(false, &with, "44100"), None);
        assert_eq!(AudioParams::for_format(true, &without, "44100"), None);
    }

    #[test]
    fn test_audio_disabled_strips_stream() {
        let target = VideoTarget { codec: VideoCodec::Vp9, video_bitrate: "1M".into(), audio: None };
        let args = get_command_args(&build_transcode_command(Path::new("a.mov"), Path::new("a.webm"), &target));

        assert!(has_flag(&args, "-an"));
        assert!(!has_flag(&args, "-b:a"));
        assert!(!has_flag(&args, "-ar"));
        assert!(has_flag_with_value(&args, "-c:v", "libvpx-vp9"));
    }

    #[test]
    fn test_poster_frame_command() {
        let cmd = build_poster_frame_command(Path::new("clip.mp4"), Path::new("/tmp/frame.png"));
        let args = get_command_args(&cmd);

        assert_eq!(cmd.get_program(), OsStr::new("ffmpeg"));
        assert!(has_flag_with_value(&args, "-i", "clip.mp4"));
        assert!(has_flag_with_value(&args, "-vf", "select=eq(n\\,0)"));
        assert!(has_flag_with_value(&args, "-frames:v", "1"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/frame.png"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_transcode_command_completeness(
            codec in prop_oneof![Just(VideoCodec::H264), Just(VideoCodec::H265), Just(VideoCodec::Vp9)],
            video_bitrate in "[1-9][0-9]{0,4}[kM]",
            audio_bitrate in proptest::option::of("[1-9][0-9]{1,2}k"),
            sample_rate in prop_oneof![Just("44100"), Just("48000")],
        ) {
            let target = VideoTarget {
                codec,
                video_bitrate: video_bitrate.clone(),
                audio: audio_bitrate.clone().map(|bitrate| AudioParams {
                    bitrate,
                    sample_rate: sample_rate.to_string(),
                }),
            };
            let output = format!("out/clip{}.{}", codec.suffix(), codec.extension());
            let cmd = build_transcode_command(Path::new("in/clip.mp4"), Path::new(&output), &target);
            let args = get_command_args(&cmd);

            prop_assert_eq!(cmd.get_program(), OsStr::new("ffmpeg"));
            prop_assert!(has_flag(&args, "-y"));
            prop_assert!(has_flag_with_value(&args, "-i", "in/clip.mp4"));
            prop_assert!(has_flag_with_value(&args, "-c:v", codec.encoder()));
            prop_assert!(has_flag_with_value(&args, "-pix_fmt", "yuv420p"));
            prop_assert!(has_flag_with_value(&args, "-b:v", &video_bitrate));
            prop_assert!(has_flag_with_value(&args, "-movflags", "+faststart"));
            match &audio_bitrate {
                Some(b) => {
                    prop_assert!(has_flag_with_value(&args, "-b:a", b));
                    prop_assert!(has_flag_with_value(&args, "-ar", sample_rate));
                    prop_assert!(!has_flag(&args, "-an"));
                }
                None => prop_assert!(has_flag(&args, "-an")),
            }
            prop_assert_eq!(args.last(), Some(&output));
        }
    }
}
