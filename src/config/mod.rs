//! Configuration module for transform-bench
//!
//! Every tunable that drives a benchmark run lives here: corpus locations and
//! source widths, the asset host's endpoint and credentials, the upload launch
//! interval and the transform parameters used during measurement. Values can be
//! loaded from YAML with environment variable expansion; every field falls back
//! to the defaults of the reference benchmark.

use crate::corpus::ImageFormat;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

lazy_static! {
    static ref ENV_VAR_RE: regex_lite::Regex =
        regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}")
            .expect("env var pattern is valid");
}

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in ENV_VAR_RE.captures_iter(s) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let var_name = &cap[1];

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// A value still holding an unexpanded `${VAR}` placeholder counts as unset
fn is_unset(value: &str) -> bool {
    value.trim().is_empty() || ENV_VAR_RE.is_match(value)
}

fn validate_widths(field: &str, widths: &[u32]) -> Result<(), ConfigError> {
    if widths.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "{field} must contain at least one width"
        )));
    }
    if widths.contains(&0) {
        return Err(ConfigError::ValidationError(format!(
            "{field} must only contain positive widths"
        )));
    }
    Ok(())
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub measure: MeasureConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Load from `path` when given, otherwise fall back to the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_widths("corpus.source_widths", &self.corpus.source_widths)?;
        validate_widths("measure.benchmark_widths", &self.measure.benchmark_widths)?;

        if !is_valid_http_url(&self.host.api_base_url) {
            return Err(ConfigError::ValidationError(
                "Invalid host.api_base_url: must start with http:// or https://".into(),
            ));
        }

        if is_unset(&self.host.space_id) {
            return Err(ConfigError::ValidationError(
                "host.space_id cannot be empty".into(),
            ));
        }

        if is_unset(&self.host.auth_token) {
            return Err(ConfigError::ValidationError(
                "host.auth_token is not set (export ASSET_HOST_TOKEN or set it in the config file)"
                    .into(),
            ));
        }

        if self.host.storage_domain_fragment.is_empty() {
            return Err(ConfigError::ValidationError(
                "host.storage_domain_fragment cannot be empty".into(),
            ));
        }

        if self.upload.launch_interval_millis == 0 {
            return Err(ConfigError::ValidationError(
                "upload.launch_interval_millis must be greater than zero".into(),
            ));
        }

        if !(1..=100).contains(&self.measure.quality) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid measure.quality {}: must be between 1 and 100",
                self.measure.quality
            )));
        }

        Ok(())
    }
}

/// Local corpus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Directory holding the original source images (read-only)
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    /// Directory the generated examples are written to and reused from
    #[serde(default = "default_example_dir")]
    pub example_dir: PathBuf,
    /// Widths every source image is rendered at
    #[serde(default = "default_source_widths")]
    pub source_widths: Vec<u32>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            example_dir: default_example_dir(),
            source_widths: default_source_widths(),
        }
    }
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_example_dir() -> PathBuf {
    PathBuf::from("image-examples")
}

fn default_source_widths() -> Vec<u32> {
    vec![1080, 2048, 3840]
}

/// Remote asset host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Management API base URL, without trailing slash
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_space_id")]
    pub space_id: String,
    /// Sent verbatim in the `Authorization` header
    #[serde(default = "default_auth_token")]
    pub auth_token: String,
    /// Removed from the raw storage URL to obtain the public, transformable URL
    #[serde(default = "default_storage_domain_fragment")]
    pub storage_domain_fragment: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl HostConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            space_id: default_space_id(),
            auth_token: default_auth_token(),
            storage_domain_fragment: default_storage_domain_fragment(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://mapi.storyblok.com".to_string()
}

fn default_space_id() -> String {
    "247220".to_string()
}

fn default_auth_token() -> String {
    expand_env_vars("${ASSET_HOST_TOKEN}")
}

fn default_storage_domain_fragment() -> String {
    "s3.amazonaws.com/".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

/// Upload launch policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Fixed delay between two upload launches
    #[serde(default = "default_launch_interval_millis")]
    pub launch_interval_millis: u64,
}

impl UploadConfig {
    pub fn launch_interval(&self) -> Duration {
        Duration::from_millis(self.launch_interval_millis)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            launch_interval_millis: default_launch_interval_millis(),
        }
    }
}

fn default_launch_interval_millis() -> u64 {
    1000
}

/// Transform request parameters used while measuring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureConfig {
    #[serde(default = "default_benchmark_widths")]
    pub benchmark_widths: Vec<u32>,
    /// Output format forced on the transform endpoint
    #[serde(default = "default_measure_format")]
    pub format: ImageFormat,
    #[serde(default = "default_measure_quality")]
    pub quality: u8,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            benchmark_widths: default_benchmark_widths(),
            format: default_measure_format(),
            quality: default_measure_quality(),
        }
    }
}

fn default_benchmark_widths() -> Vec<u32> {
    vec![640, 750, 828, 1080, 1200, 1560]
}

fn default_measure_format() -> ImageFormat {
    ImageFormat::Webp
}

fn default_measure_quality() -> u8 {
    75
}
