//! Raster image encoder commands
//!
//! Builds the command lines for the external still-image encoders:
//! `avifenc` (AVIF), `cwebp` (WebP), mozjpeg's `cjpeg` (JPEG), and
//! `pngquant` + `oxipng` (PNG).

use assetopt_config::{AvifSettings, ChromaSubsampling, Compression, JpegSettings, PngSettings, WebpSettings};
use std::path::Path;
use std::process::Command;

/// An artifact produced from a raster source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageTarget {
    Avif,
    Webp,
    /// JPEG re-encode of a `.jpg`/`.jpeg` source
    Jpeg,
    /// PNG re-encode of a `.png` source
    Png,
}

impl ImageTarget {
    /// Extension of the produced file
    pub fn extension(self) -> &'static str {
        match self {
            ImageTarget::Avif => "avif",
            ImageTarget::Webp => "webp",
            ImageTarget::Jpeg => "jpg",
            ImageTarget::Png => "png",
        }
    }

    /// Re-encode target for a source extension, if it is a raster format
    pub fn original_for(source: &Path) -> Option<Self> {
        let ext = source.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(ImageTarget::Jpeg),
            "png" => Some(ImageTarget::Png),
            _ => None,
        }
    }

    /// External tools this target needs
    pub fn tools(self, png: &PngSettings) -> &'static [&'static str] {
        match self {
            ImageTarget::Avif => &["avifenc"],
            ImageTarget::Webp => &["cwebp"],
            ImageTarget::Jpeg => &["cjpeg"],
            ImageTarget::Png if png.palette => &["pngquant", "oxipng"],
            ImageTarget::Png => &["oxipng"],
        }
    }
}

/// libavif speed (0 slowest - 10 fastest) for an effort of 0 (fastest) - 9 (slowest)
pub fn avif_speed(effort: u8) -> u8 {
    9 - effort.min(9)
}

/// cwebp `-m` method 0-6
pub fn webp_method(effort: u8) -> u8 {
    effort.min(6)
}

/// oxipng `--opt` 0-6 scaled from a zlib-style level 0-9
pub fn oxipng_level(compression_level: u8) -> u8 {
    ((u32::from(compression_level.min(9)) * 6 + 4) / 9) as u8
}

/// `avifenc` with 4:4:4 chroma
pub fn build_avif_command(input: &Path, output: &Path, settings: &AvifSettings) -> Command {
    let mut cmd = Command::new("avifenc");
    cmd.arg("--qcolor").arg(settings.quality.min(100).to_string());
    cmd.arg("--speed").arg(avif_speed(settings.effort).to_string());
    cmd.arg("--yuv").arg("444");
    cmd.arg(input).arg(output);
    cmd
}

/// `cwebp` at the given quality/effort
pub fn build_webp_command(input: &Path, output: &Path, settings: &WebpSettings) -> Command {
    let mut cmd = Command::new("cwebp");
    cmd.arg("-quiet");
    cmd.arg("-q").arg(settings.quality.min(100).to_string());
    cmd.arg("-m").arg(webp_method(settings.effort).to_string());
    cmd.arg(input);
    cmd.arg("-o").arg(output);
    cmd
}

/// mozjpeg `cjpeg` re-encode
pub fn build_jpeg_command(input: &Path, output: &Path, settings: &JpegSettings) -> Command {
    let mut cmd = Command::new("cjpeg");

    if !settings.mozjpeg {
        cmd.arg("-revert");
    }

    cmd.arg("-quality").arg(settings.quality.min(100).to_string());

    let sample = match settings.chroma_subsampling {
        ChromaSubsampling::Yuv444 => "1x1",
        ChromaSubsampling::Yuv420 => "2x2",
    };
    cmd.arg("-sample").arg(sample);

    if settings.mozjpeg {
        if !settings.trellis_quantisation {
            cmd.arg("-notrellis");
        }
        if !settings.overshoot_deringing {
            cmd.arg("-noovershoot");
        }
    }

    cmd.arg("-outfile").arg(output);
    cmd.arg(input);
    cmd
}

/// `pngquant` palette quantisation into `output`
pub fn build_pngquant_command(input: &Path, output: &Path, settings: &PngSettings) -> Command {
    let mut cmd = Command::new("pngquant");
    cmd.arg("--force");

    if let Some(quality) = settings.quality {
        cmd.arg(format!("--quality=0-{}", quality.min(100)));
    }

    match settings.dither {
        Some(d) if d <= 0.0 => {
            cmd.arg("--nofs");
        }
        Some(d) => {
            cmd.arg(format!("--floyd={}", d.min(1.0)));
        }
        None => {}
    }

    cmd.arg("--output").arg(output);
    cmd.arg("--").arg(input);
    cmd
}

/// `oxipng` lossless optimisation; in place when `output` is `None`
pub fn build_oxipng_command(input: &Path, output: Option<&Path>, settings: &PngSettings) -> Command {
    let mut cmd = Command::new("oxipng");
    cmd.arg("--opt").arg(oxipng_level(settings.compression_level).to_string());
    cmd.arg("--interlace").arg(if settings.progressive { "1" } else { "0" });
    cmd.arg("--strip").arg("safe");

    if let Some(output) = output {
        cmd.arg("--out").arg(output);
    }

    cmd.arg(input);
    cmd
}

/// PNG re-encode: quantise first when palette mode is on, then optimise losslessly
pub fn build_png_commands(input: &Path, output: &Path, settings: &PngSettings) -> Vec<Command> {
    if settings.palette {
        vec![
            build_pngquant_command(input, output, settings),
            build_oxipng_command(output, None, settings),
        ]
    } else {
        vec![build_oxipng_command(input, Some(output), settings)]
    }
}

/// Commands producing `target` from `input`, run in order
pub fn build_target_commands(
    target: ImageTarget,
    input: &Path,
    output: &Path,
    compression: &Compression,
) -> Vec<Command> {
    match target {
        ImageTarget::Avif => vec![build_avif_command(input, output, &compression.avif)],
        ImageTarget::Webp => vec![build_webp_command(input, output, &compression.webp)],
        ImageTarget::Jpeg => vec![build_jpeg_command(input, output, &compression.jpeg)],
        ImageTarget::Png => build_png_commands(input, output, &compression.png),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::test_util::{get_command_args, has_flag, has_flag_with_value};
    use proptest::prelude::*;
    use std::ffi::OsStr;

    #[test]
    fn test_original_target_for_source() {
        assert_eq!(ImageTarget::original_for(Path::new("a.jpg")), Some(ImageTarget::Jpeg));
        assert_eq!(ImageTarget::original_for(Path::new("a.JPEG")), Some(ImageTarget::Jpeg));
        assert_eq!(ImageTarget::original_for(Path::new("a.png")), Some(ImageTarget::Png));
        assert_eq!(ImageTarget::original_for(Path::new("a.svg")), None);
    }

    #[test]
    fn test_jpeg_defaults() {
        let cmd = build_jpeg_command(Path::new("in.jpeg"), Path::new("out.jpg"), &JpegSettings::default());
        let args = get_command_args(&cmd);

        assert_eq!(cmd.get_program(), OsStr::new("cjpeg"));
        assert!(has_flag_with_value(&args, "-quality", "70"));
        assert!(has_flag_with_value(&args, "-sample", "1x1"));
        assert!(has_flag_with_value(&args, "-outfile", "out.jpg"));
        assert!(!has_flag(&args, "-revert"));
        assert!(!has_flag(&args, "-notrellis"));
        assert!(!has_flag(&args, "-noovershoot"));
        assert_eq!(args.last().map(String::as_str), Some("in.jpeg"));
    }

    #[test]
    fn test_jpeg_disabled_features() {
        let settings = JpegSettings {
            chroma_subsampling: ChromaSubsampling::Yuv420,
            trellis_quantisation: false,
            overshoot_deringing: false,
            ..JpegSettings::default()
        };
        let args = get_command_args(&build_jpeg_command(Path::new("i"), Path::new("o"), &settings));
        assert!(has_flag_with_value(&args, "-sample", "2x2"));
        assert!(has_flag(&args, "-notrellis"));
        assert!(has_flag(&args, "-noovershoot"));

        let plain = JpegSettings { mozjpeg: false, trellis_quantisation: false, ..JpegSettings::default() };
        let args = get_command_args(&build_jpeg_command(Path::new("i"), Path::new("o"), &plain));
        assert_eq!(args[0], "-revert");
        assert!(!has_flag(&args, "-notrellis"));
    }

    #[test]
    fn test_png_without_palette_is_single_oxipng_pass() {
        let cmds = build_png_commands(Path::new("in.png"), Path::new("out.png"), &PngSettings::default());
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].get_program(), OsStr::new("oxipng"));

        let args = get_command_args(&cmds[0]);
        assert!(has_flag_with_value(&args, "--opt", "6"));
        assert!(has_flag_with_value(&args, "--interlace", "0"));
        assert!(has_flag_with_value(&args, "--out", "out.png"));
        assert_eq!(args.last().map(String::as_str), Some("in.png"));
    }

    #[test]
    fn test_png_palette_quantises_then_optimises_in_place() {
        let settings = PngSettings {
            palette: true,
            progressive: true,
            quality: Some(65),
            dither: Some(0.5),
            ..PngSettings::default()
        };
        let cmds = build_png_commands(Path::new("in.png"), Path::new("out.png"), &settings);
        assert_eq!(cmds.len(), 2);

        let quant = get_command_args(&cmds[0]);
        assert_eq!(cmds[0].get_program(), OsStr::new("pngquant"));
        assert!(has_flag(&quant, "--quality=0-65"));
        assert!(has_flag(&quant, "--floyd=0.5"));
        assert!(has_flag_with_value(&quant, "--output", "out.png"));
        assert!(has_flag_with_value(&quant, "--", "in.png"));

        let opt = get_command_args(&cmds[1]);
        assert!(has_flag_with_value(&opt, "--interlace", "1"));
        assert!(!has_flag(&opt, "--out"));
        assert_eq!(opt.last().map(String::as_str), Some("out.png"));
    }

    #[test]
    fn test_zero_dither_disables_floyd() {
        let settings = PngSettings { palette: true, dither: Some(0.0), ..PngSettings::default() };
        let args = get_command_args(&build_pngquant_command(Path::new("i"), Path::new("o"), &settings));
        assert!(has_flag(&args, "--nofs"));
        assert!(!args.iter().any(|a| a.starts_with("--floyd")));
    }

    #[test]
    fn test_target_tools() {
        let png = PngSettings::default();
        assert_eq!(ImageTarget::Avif.tools(&png), &["avifenc"]);
        assert_eq!(ImageTarget::Png.tools(&png), &["oxipng"]);
        let palette = PngSettings { palette: true, ..png };
        assert_eq!(ImageTarget::Png.tools(&palette), &["pngquant", "oxipng"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_avif_command_completeness(
            quality in 0u8..=100,
            effort in 0u8..=9,
            input in "[a-zA-Z0-9_/.-]{1,30}",
            output in "[a-zA-Z0-9_/.-]{1,30}",
        ) {
            let settings = AvifSettings { quality, effort };
            let cmd = build_avif_command(Path::new(&input), Path::new(&output), &settings);
            let args = get_command_args(&cmd);

            prop_assert_eq!(cmd.get_program(), OsStr::new("avifenc"));
            prop_assert!(has_flag_with_value(&args, "--qcolor", &quality.to_string()));
            prop_assert!(has_flag_with_value(&args, "--speed", &(9 - effort).to_string()));
            prop_assert!(has_flag_with_value(&args, "--yuv", "444"));
            prop_assert_eq!(&args[args.len() - 2], &input);
            prop_assert_eq!(&args[args.len() - 1], &output);
        }

        #[test]
        fn prop_webp_command_completeness(quality in 0u8..=100, effort in 0u8..=20) {
            let settings = WebpSettings { quality, effort };
            let cmd = build_webp_command(Path::new("in.png"), Path::new("out.webp"), &settings);
            let args = get_command_args(&cmd);

            prop_assert_eq!(cmd.get_program(), OsStr::new("cwebp"));
            prop_assert!(has_flag_with_value(&args, "-q", &quality.to_string()));
            prop_assert!(has_flag_with_value(&args, "-m", &effort.min(6).to_string()));
            prop_assert!(has_flag_with_value(&args, "-o", "out.webp"));
        }

        #[test]
        fn prop_oxipng_level_in_range(level in 0u8..=255) {
            let scaled = oxipng_level(level);
            prop_assert!(scaled <= 6);
            if level >= 9 {
                prop_assert_eq!(scaled, 6);
            }
        }
    }
}
