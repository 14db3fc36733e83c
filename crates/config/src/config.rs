//! Shared configuration structures and loading logic

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// YAML parsing error
    Yaml(serde_yaml::Error),
    /// TOML parsing error
    Toml(toml::de::Error),
    /// The configured input directory does not exist
    MissingInputDirectory(PathBuf),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Yaml(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Toml(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::MissingInputDirectory(p) => {
                write!(f, "Input directory \"{}\" not found", p.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Yaml(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Toml(e)
    }
}

/// On-disk format of a configuration file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// `.toml` files are TOML, everything else is treated as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }
}

fn default_sync_dir() -> bool {
    true
}

/// Settings shared by the image and video pipelines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommonConfig {
    /// Root of the source tree
    pub input_directory: PathBuf,
    /// Root of the mirrored output tree
    pub output_directory: PathBuf,
    /// Ignore the cache and re-encode everything
    #[serde(default)]
    pub force_optim: bool,
    /// Delete output artifacts that no longer have a source (default true)
    #[serde(default = "default_sync_dir")]
    pub sync_dir: bool,
    /// Cache file location (pipeline-specific default when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,
    /// Maximum number of files in flight (0 = auto-derive)
    #[serde(default)]
    pub jobs: u32,
}

impl CommonConfig {
    pub fn new(input_directory: impl Into<PathBuf>, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            input_directory: input_directory.into(),
            output_directory: output_directory.into(),
            force_optim: false,
            sync_dir: default_sync_dir(),
            cache_file: None,
            jobs: 0,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Overrides the following values if environment variables are set:
    /// - ASSETOPT_INPUT_DIRECTORY -> inputDirectory
    /// - ASSETOPT_OUTPUT_DIRECTORY -> outputDirectory
    /// - ASSETOPT_FORCE_OPTIM -> forceOptim
    /// - ASSETOPT_SYNC_DIR -> syncDir
    /// - ASSETOPT_JOBS -> jobs
    /// - ASSETOPT_CACHE_FILE -> cacheFile
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("ASSETOPT_INPUT_DIRECTORY") {
            if !val.is_empty() {
                self.input_directory = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("ASSETOPT_OUTPUT_DIRECTORY") {
            if !val.is_empty() {
                self.output_directory = PathBuf::from(val);
            }
        }

        if let Some(force) = env_bool("ASSETOPT_FORCE_OPTIM") {
            self.force_optim = force;
        }

        if let Some(sync) = env_bool("ASSETOPT_SYNC_DIR") {
            self.sync_dir = sync;
        }

        if let Ok(val) = env::var("ASSETOPT_JOBS") {
            if let Ok(jobs) = val.parse::<u32>() {
                self.jobs = jobs;
            }
        }

        if let Ok(val) = env::var("ASSETOPT_CACHE_FILE") {
            if !val.is_empty() {
                self.cache_file = Some(PathBuf::from(val));
            }
        }
    }

    /// Fail fast when the input tree is absent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.input_directory.is_dir() {
            return Err(ConfigError::MissingInputDirectory(
                self.input_directory.clone(),
            ));
        }
        Ok(())
    }
}

/// Read a boolean environment variable.
///
/// Accepts "true", "1", "yes" as true and "false", "0", "no" as false.
/// Anything else (or an unset variable) yields `None`.
pub fn env_bool(name: &str) -> Option<bool> {
    let val = env::var(name).ok()?;
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Loading behaviour common to both pipeline configurations.
pub trait PipelineConfig: DeserializeOwned {
    /// Cache file used when `cacheFile` is not configured.
    const DEFAULT_CACHE_FILE: &'static str;

    fn common(&self) -> &CommonConfig;

    fn common_mut(&mut self) -> &mut CommonConfig;

    /// Effective cache file path.
    fn cache_file(&self) -> PathBuf {
        self.common()
            .cache_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CACHE_FILE))
    }

    /// Load configuration from a YAML or TOML file
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match ConfigFormat::from_path(path) {
            ConfigFormat::Yaml => Self::parse_yaml(&content),
            ConfigFormat::Toml => Self::parse_toml(&content),
        }
    }

    /// Parse configuration from a YAML string
    fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parse configuration from a TOML string
    fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        self.common_mut().apply_env_overrides();
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.common().validate()
    }

    /// Load configuration from file, apply environment overrides and validate
    fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Int(i64),
    Float(f64),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Int(i) => i.to_string(),
            StringOrNumber::Float(f) => f.to_string(),
        }
    }
}

/// Accept `44100` as well as `"44100"` for encoder parameters passed through verbatim.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    StringOrNumber::deserialize(deserializer).map(String::from)
}

pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(String::from))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    pub static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    pub fn clear_env_vars() {
        env::remove_var("ASSETOPT_INPUT_DIRECTORY");
        env::remove_var("ASSETOPT_OUTPUT_DIRECTORY");
        env::remove_var("ASSETOPT_FORCE_OPTIM");
        env::remove_var("ASSETOPT_SYNC_DIR");
        env::remove_var("ASSETOPT_JOBS");
        env::remove_var("ASSETOPT_CACHE_FILE");
    }
}
