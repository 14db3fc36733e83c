//! Override resolver for per-file video settings.
//!
//! `individualBitrates` rules map a wildcard pattern over the file's path
//! relative to the input root to replacement encoder settings. Rules are tried
//! in declaration order and the first match wins.

use assetopt_config::{FormatSettings, VideoConfig, VideoFormats, VideoOverride};
use regex::Regex;

/// Translate a wildcard pattern into an anchored regex.
///
/// `*` matches zero or more of any character (including `/`), `?` matches
/// exactly one character, everything else matches literally.
pub fn wildcard_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');

    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '*' | '?' => {
                expr.push_str(&regex::escape(&literal));
                literal.clear();
                expr.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    expr.push_str(&regex::escape(&literal));
    expr.push('$');

    Regex::new(&expr)
}

/// Full-string wildcard match of `path` against `pattern`.
pub fn matches_wildcard(path: &str, pattern: &str) -> bool {
    wildcard_to_regex(pattern)
        .map(|re| re.is_match(path))
        .unwrap_or(false)
}

/// Effective settings for one video file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub formats: VideoFormats,
    pub include_audio: bool,
    /// Pattern of the rule that applied, if any
    pub matched_pattern: Option<String>,
}

struct Rule {
    pattern: String,
    regex: Regex,
    settings: VideoOverride,
}

/// Resolves per-file settings from the configured defaults and override rules.
pub struct OverrideResolver {
    rules: Vec<Rule>,
    defaults: VideoFormats,
    include_audio: bool,
}

impl OverrideResolver {
    /// Compile every rule pattern up front.
    pub fn new(config: &VideoConfig) -> Result<Self, regex::Error> {
        let rules = config
            .individual_bitrates
            .iter()
            .map(|(pattern, settings)| {
                Ok(Rule {
                    pattern: pattern.to_string(),
                    regex: wildcard_to_regex(pattern)?,
                    settings: settings.clone(),
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            rules,
            defaults: config.formats.clone(),
            include_audio: config.include_audio,
        })
    }

    /// Settings for the file at `relative_path` (`/`-separated).
    ///
    /// The first matching rule replaces the formats it names and, if given,
    /// the audio flag. When audio ends up enabled, formats without an audio
    /// bitrate inherit the default format's. No match leaves the defaults
    /// untouched.
    pub fn resolve(&self, relative_path: &str) -> ResolvedSettings {
        let Some(rule) = self.rules.iter().find(|r| r.regex.is_match(relative_path)) else {
            return ResolvedSettings {
                formats: self.defaults.clone(),
                include_audio: self.include_audio,
                matched_pattern: None,
            };
        };

        let include_audio = rule.settings.include_audio.unwrap_or(self.include_audio);
        let overrides = &rule.settings.formats;
        let pick = |custom: &Option<FormatSettings>, default: &FormatSettings| {
            let mut chosen = custom.clone().unwrap_or_else(|| default.clone());
            if include_audio && chosen.audio_bitrate.is_none() {
                chosen.audio_bitrate = default.audio_bitrate.clone();
            }
            chosen
        };

        ResolvedSettings {
            formats: VideoFormats {
                mp4: pick(&overrides.mp4, &self.defaults.mp4),
                h265: pick(&overrides.h265, &self.defaults.h265),
                webm: pick(&overrides.webm, &self.defaults.webm),
            },
            include_audio,
            matched_pattern: Some(rule.pattern.clone()),
        }
    }
}
