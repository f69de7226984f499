//! Configuration loading, validation, and management for Pathwise.
//!
//! Loads configuration from `~/.pathwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.pathwise/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Retry loop and context extraction settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Cache layer settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Aggregation settings
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Cache warmup settings
    #[serde(default)]
    pub warmup: WarmupConfig,

    /// Dataset location
    #[serde(default)]
    pub data: DataConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("orchestrator", &self.orchestrator)
            .field("cache", &self.cache)
            .field("aggregation", &self.aggregation)
            .field("warmup", &self.warmup)
            .field("data", &self.data)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Upper bound on planning attempts per query.
pub const MAX_ATTEMPTS_CEILING: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Planning attempts per query (1..=3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How many prior turns the context extractor looks at
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Keyword cap for extracted context
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Keywords kept when a retry strategy broadens scope
    #[serde(default = "default_broaden_keyword_limit")]
    pub broaden_keyword_limit: usize,

    /// Caller-level timeout around the whole pipeline
    #[serde(default = "default_pipeline_timeout_secs")]
    pub pipeline_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    MAX_ATTEMPTS_CEILING
}
fn default_history_window() -> usize {
    6
}
fn default_max_keywords() -> usize {
    5
}
fn default_broaden_keyword_limit() -> usize {
    3
}
fn default_pipeline_timeout_secs() -> u64 {
    60
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            history_window: default_history_window(),
            max_keywords: default_max_keywords(),
            broaden_keyword_limit: default_broaden_keyword_limit(),
            pipeline_timeout_secs: default_pipeline_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Jaccard similarity needed for a near-duplicate query hit
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// How many recent queries `find_similar` scans
    #[serde(default = "default_similarity_scan_limit")]
    pub similarity_scan_limit: usize,

    /// How many recent queries are retained for similarity lookup
    #[serde(default = "default_recent_query_limit")]
    pub recent_query_limit: usize,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_ttl_secs() -> u64 {
    3600
}
fn default_similarity_threshold() -> f64 {
    0.8
}
fn default_similarity_scan_limit() -> usize {
    50
}
fn default_recent_query_limit() -> usize {
    200
}
fn default_key_prefix() -> String {
    "pathwise".into()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: default_ttl_secs(),
            similarity_threshold: default_similarity_threshold(),
            similarity_scan_limit: default_similarity_scan_limit(),
            recent_query_limit: default_recent_query_limit(),
            key_prefix: default_key_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Maximum consolidated careers shown
    #[serde(default = "default_career_cap")]
    pub career_cap: usize,

    /// Institutions that have detailed course data. Empty = use the
    /// dataset's own list, if it has one.
    #[serde(default)]
    pub course_data_institutions: Vec<String>,
}

fn default_career_cap() -> usize {
    10
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            career_cap: default_career_cap(),
            course_data_institutions: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfig {
    #[serde(default = "default_common_queries")]
    pub common_queries: Vec<String>,
}

fn default_common_queries() -> Vec<String> {
    [
        "show me computer science programs",
        "nursing programs",
        "engineering programs",
        "business programs",
        "what careers can I have with biology",
        "healthcare careers",
        "information technology programs",
        "education and teaching programs",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            common_queries: default_common_queries(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    /// JSON dataset file. None = built-in sample dataset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_path: Option<String>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.pathwise/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `PATHWISE_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("PATHWISE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("PATHWISE_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("PATHWISE_MODEL") {
            config.default_model = model;
        }

        if let Ok(path) = std::env::var("PATHWISE_DATASET") {
            config.data.dataset_path = Some(path);
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".pathwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.orchestrator.max_attempts == 0 || self.orchestrator.max_attempts > MAX_ATTEMPTS_CEILING {
            return Err(ConfigError::ValidationError(format!(
                "orchestrator.max_attempts must be between 1 and {MAX_ATTEMPTS_CEILING}"
            )));
        }

        if self.orchestrator.max_keywords == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_keywords must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.cache.similarity_threshold) {
            return Err(ConfigError::ValidationError(
                "cache.similarity_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if self.cache.default_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.default_ttl_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        let rendered = toml::to_string_pretty(&config).unwrap_or_default();
        rendered.replacen(
            "[aggregation]\n",
            "[aggregation]\n# Campuses kept in results. Empty = the dataset's course_data_institutions.\n",
            1,
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            orchestrator: OrchestratorConfig::default(),
            cache: CacheConfig::default(),
            aggregation: AggregationConfig::default(),
            warmup: WarmupConfig::default(),
            data: DataConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.orchestrator.max_attempts, 3);
        assert_eq!(config.cache.default_ttl_secs, 3600);
        assert!((config.cache.similarity_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.aggregation.career_cap, 10);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.warmup.common_queries, config.warmup.common_queries);
    }

    #[test]
    fn too_many_attempts_rejected() {
        let mut config = AppConfig::default();
        config.orchestrator.max_attempts = 4;
        assert!(config.validate().is_err());
        config.orchestrator.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn similarity_threshold_out_of_range_rejected() {
        let mut config = AppConfig::default();
        config.cache.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().default_provider, "openrouter");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_model = "gpt-4o"

[cache]
similarity_threshold = 0.9

[aggregation]
course_data_institutions = ["North Campus"]
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
        assert!((config.cache.similarity_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.cache.default_ttl_secs, 3600);
        assert_eq!(config.aggregation.course_data_institutions, vec!["North Campus"]);
        assert_eq!(config.orchestrator.history_window, 6);
    }

    #[test]
    fn invalid_file_rejected_on_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[orchestrator]\nmax_attempts = 9").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("similarity_threshold"));
        assert!(toml_str.contains("# Campuses kept in results"));
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert!(parsed.aggregation.course_data_institutions.is_empty());
    }
}
