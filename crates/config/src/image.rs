//! Image pipeline configuration

use crate::config::{CommonConfig, PipelineConfig};
use serde::{Deserialize, Serialize};

/// AVIF encoder settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AvifSettings {
    /// Quality 0-100
    pub quality: u8,
    /// CPU effort 0 (fastest) - 9 (slowest)
    pub effort: u8,
}

impl Default for AvifSettings {
    fn default() -> Self {
        Self {
            quality: 50,
            effort: 4,
        }
    }
}

/// WebP encoder settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WebpSettings {
    /// Quality 0-100
    pub quality: u8,
    /// CPU effort 0 (fastest) - 6 (slowest)
    pub effort: u8,
}

impl Default for WebpSettings {
    fn default() -> Self {
        Self {
            quality: 80,
            effort: 4,
        }
    }
}

/// Chroma subsampling for JPEG output
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ChromaSubsampling {
    #[default]
    #[serde(rename = "4:4:4")]
    Yuv444,
    #[serde(rename = "4:2:0")]
    Yuv420,
}

/// JPEG re-encode settings (mozjpeg)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct JpegSettings {
    pub quality: u8,
    pub chroma_subsampling: ChromaSubsampling,
    /// Use mozjpeg defaults; when false the encoder reverts to plain libjpeg behaviour
    pub mozjpeg: bool,
    pub trellis_quantisation: bool,
    pub overshoot_deringing: bool,
}

impl Default for JpegSettings {
    fn default() -> Self {
        Self {
            quality: 70,
            chroma_subsampling: ChromaSubsampling::Yuv444,
            mozjpeg: true,
            trellis_quantisation: true,
            overshoot_deringing: true,
        }
    }
}

/// PNG re-encode settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PngSettings {
    /// zlib-style level 0-9
    pub compression_level: u8,
    /// Interlaced output
    pub progressive: bool,
    /// Quantise to a palette before lossless optimisation
    pub palette: bool,
    /// Palette quality ceiling 0-100 (palette mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    /// Floyd-Steinberg dithering level 0.0-1.0 (palette mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dither: Option<f32>,
}

impl Default for PngSettings {
    fn default() -> Self {
        Self {
            compression_level: 9,
            progressive: false,
            palette: false,
            quality: None,
            dither: None,
        }
    }
}

/// Per-format encoder parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Compression {
    pub avif: AvifSettings,
    pub webp: WebpSettings,
    pub jpeg: JpegSettings,
    pub png: PngSettings,
}

/// Which artifacts to emit for each raster source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputFlags {
    pub avif: bool,
    pub webp: bool,
    /// Re-encode in the source's own format
    pub original: bool,
}

impl Default for OutputFlags {
    fn default() -> Self {
        Self {
            avif: true,
            webp: true,
            original: true,
        }
    }
}

/// SVG minification options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SvgOptions {
    /// Decimal places kept for coordinates
    pub coordinates_precision: u8,
    /// Decimal places kept for transform matrices
    pub transforms_precision: u8,
    /// Keep `<text>` elements instead of converting them to paths
    pub preserve_text: bool,
    /// Prefix applied to every generated id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_prefix: Option<String>,
    pub use_single_quote: bool,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            coordinates_precision: 3,
            transforms_precision: 5,
            preserve_text: true,
            id_prefix: None,
            use_single_quote: false,
        }
    }
}

/// Image pipeline configuration (`configImage.yml`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub svg_options: SvgOptions,
    #[serde(default)]
    pub output: OutputFlags,
}

impl ImageConfig {
    pub fn new(common: CommonConfig) -> Self {
        Self {
            common,
            compression: Compression::default(),
            svg_options: SvgOptions::default(),
            output: OutputFlags::default(),
        }
    }
}

impl PipelineConfig for ImageConfig {
    const DEFAULT_CACHE_FILE: &'static str = "cacheImage.json";

    fn common(&self) -> &CommonConfig {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonConfig {
        &mut self.common
    }
}
