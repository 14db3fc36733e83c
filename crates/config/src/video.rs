//! Video pipeline configuration

use crate::config::{opt_string_or_number, string_or_number, CommonConfig, PipelineConfig};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Bitrates for one output format, passed to ffmpeg verbatim (e.g. `"2M"`, `"128k"`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FormatSettings {
    #[serde(deserialize_with = "string_or_number")]
    pub video_bitrate: String,
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub audio_bitrate: Option<String>,
}

impl FormatSettings {
    pub fn new(video_bitrate: impl Into<String>, audio_bitrate: Option<&str>) -> Self {
        Self {
            video_bitrate: video_bitrate.into(),
            audio_bitrate: audio_bitrate.map(str::to_owned),
        }
    }
}

/// Settings for each transcode target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoFormats {
    /// H.264 in MP4
    pub mp4: FormatSettings,
    /// H.265 in MP4 (`-h265` suffix)
    pub h265: FormatSettings,
    /// VP9 in WebM
    pub webm: FormatSettings,
}

/// Per-format replacements inside an override; absent formats keep the defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct FormatOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mp4: Option<FormatSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h265: Option<FormatSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webm: Option<FormatSettings>,
}

/// Settings applied to files whose relative path matches a pattern
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoOverride {
    #[serde(default)]
    pub formats: FormatOverrides,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_audio: Option<bool>,
}

/// Ordered `pattern -> override` rules. Earlier rules win.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndividualBitrates(Vec<(String, VideoOverride)>);

impl IndividualBitrates {
    pub fn new(rules: Vec<(String, VideoOverride)>) -> Self {
        Self(rules)
    }

    /// Rules in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VideoOverride)> {
        self.0.iter().map(|(pattern, rule)| (pattern.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for IndividualBitrates {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (pattern, rule) in &self.0 {
            map.serialize_entry(pattern, rule)?;
        }
        map.end()
    }
}

struct RulesVisitor;

impl<'de> Visitor<'de> for RulesVisitor {
    type Value = IndividualBitrates;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping from path pattern to override settings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut rules = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((pattern, rule)) = map.next_entry::<String, VideoOverride>()? {
            rules.push((pattern, rule));
        }
        Ok(IndividualBitrates(rules))
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(IndividualBitrates::default())
    }

    fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
        Ok(IndividualBitrates::default())
    }
}

impl<'de> Deserialize<'de> for IndividualBitrates {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RulesVisitor)
    }
}

fn default_audio_frequency() -> String {
    "44100".to_string()
}

fn default_webp_quality() -> u8 {
    80
}

/// Video pipeline configuration (`configVideo.yml`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoConfig {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub formats: VideoFormats,
    #[serde(default)]
    pub include_audio: bool,
    /// Audio sample rate shared by all targets
    #[serde(
        default = "default_audio_frequency",
        deserialize_with = "string_or_number"
    )]
    pub audio_frequency: String,
    /// Quality of the poster frame
    #[serde(default = "default_webp_quality")]
    pub webp_quality: u8,
    #[serde(default)]
    pub individual_bitrates: IndividualBitrates,
}

impl VideoConfig {
    pub fn new(common: CommonConfig, formats: VideoFormats) -> Self {
        Self {
            common,
            formats,
            include_audio: false,
            audio_frequency: default_audio_frequency(),
            webp_quality: default_webp_quality(),
            individual_bitrates: IndividualBitrates::default(),
        }
    }
}

impl PipelineConfig for VideoConfig {
    const DEFAULT_CACHE_FILE: &'static str = "cacheVideo.json";

    fn common(&self) -> &CommonConfig {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CommonConfig {
        &mut self.common
    }
}
