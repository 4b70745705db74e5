//! Configuration management
//!
//! This module handles loading, validation, and management of the Wayfind configuration.
//! Configuration is stored in TOML format at ~/.wayfind/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **governor**: Pipeline concurrency and queue bounds
//! - **dispatch**: Response cache and provider timeout
//! - **retriever**: Hybrid scoring weights and result bounds
//! - **session**: Session memory TTL and capacity
//! - **llm**: Ollama completion and embedding settings
//! - **providers**: External search provider settings
//!
//! Every section is optional; missing keys fall back to their defaults.
//!
//! # Examples
//!
//! ```no_run
//! use wayfind_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default location
//! let config = Config::load_or_create()?;
//!
//! println!("Max concurrent pipelines: {}", config.governor.max_concurrent);
//! println!("Completion model: {}", config.llm.model);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Request concurrency governor
    #[serde(default)]
    pub governor: GovernorConfig,

    /// Capability dispatch layer
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Hybrid retriever
    #[serde(default)]
    pub retriever: RetrieverConfig,

    /// Session memory store
    #[serde(default)]
    pub session: SessionConfig,

    /// Language model service
    #[serde(default)]
    pub llm: LLMConfig,

    /// External search providers
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Concurrency governor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Pipelines allowed to run at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Pipelines allowed to wait for admission
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

/// Capability dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Lifetime of a cached envelope (seconds)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached envelopes
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Per-call provider timeout (seconds)
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

/// Hybrid retriever configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Weight of the normalized BM25 score (0.0-1.0)
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f64,

    /// Weight of the cosine similarity score (0.0-1.0)
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f64,

    /// Ranked items kept per vertical
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Candidates kept before rerank, as a multiple of `max_items`
    #[serde(default = "default_oversample_factor")]
    pub oversample_factor: usize,

    /// Run the LLM reranker after hybrid scoring
    #[serde(default)]
    pub rerank_enabled: bool,
}

/// Session memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle lifetime of a session (seconds)
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,

    /// Sessions kept before the sweep evicts the oldest
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Interval between background sweeps (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Ollama language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Completion model name
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

/// External provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// SerpAPI product and hotel search
    #[serde(default)]
    pub serpapi: SerpApiConfig,
}

/// SerpAPI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerpApiConfig {
    /// Search endpoint URL
    #[serde(default = "default_serpapi_endpoint")]
    pub endpoint: String,

    /// Environment variable holding the API key
    #[serde(default = "default_serpapi_api_key_env")]
    pub api_key_env: String,

    /// Interface language (`hl`)
    #[serde(default = "default_serpapi_language")]
    pub language: String,

    /// Country (`gl`)
    #[serde(default = "default_serpapi_country")]
    pub country: String,
    // Note: the API key itself is never stored in config
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_concurrent() -> usize {
    5
}

fn default_max_queue_size() -> usize {
    20
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_cache_capacity() -> u64 {
    1_000
}

fn default_provider_timeout_secs() -> u64 {
    10
}

fn default_bm25_weight() -> f64 {
    0.6
}

fn default_dense_weight() -> f64 {
    0.4
}

fn default_max_items() -> usize {
    20
}

fn default_oversample_factor() -> usize {
    2
}

fn default_session_ttl_secs() -> u64 {
    30 * 60
}

fn default_max_sessions() -> usize {
    1_000
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_serpapi_endpoint() -> String {
    "https://serpapi.com/search.json".to_string()
}

fn default_serpapi_api_key_env() -> String {
    "SERPAPI_API_KEY".to_string()
}

fn default_serpapi_language() -> String {
    "en".to_string()
}

fn default_serpapi_country() -> String {
    "us".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            bm25_weight: default_bm25_weight(),
            dense_weight: default_dense_weight(),
            max_items: default_max_items(),
            oversample_factor: default_oversample_factor(),
            rerank_enabled: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            max_sessions: default_max_sessions(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
            embedding_model: default_embedding_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl Default for SerpApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_serpapi_endpoint(),
            api_key_env: default_serpapi_api_key_env(),
            language: default_serpapi_language(),
            country: default_serpapi_country(),
        }
    }
}

impl DispatchConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Config {
    /// Load configuration from the default location (~/.wayfind/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Load configuration from `path`, writing the defaults there first if
    /// the file doesn't exist
    pub fn load_or_create_at(path: &Path) -> Result<Self, EngineError> {
        let path = expand_path(path)?;

        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Self::create_default(&path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();
        config.validate()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.wayfind/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".wayfind").join("config.toml"))
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.governor.max_concurrent == 0 {
            return Err(EngineError::Config(
                "governor.max_concurrent must be at least 1".to_string(),
            ));
        }

        if self.dispatch.cache_ttl_secs == 0 {
            return Err(EngineError::Config(
                "dispatch.cache_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.dispatch.provider_timeout_secs == 0 {
            return Err(EngineError::Config(
                "dispatch.provider_timeout_secs must be greater than 0".to_string(),
            ));
        }

        for (name, weight) in [
            ("bm25_weight", self.retriever.bm25_weight),
            ("dense_weight", self.retriever.dense_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(EngineError::Config(format!(
                    "retriever.{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }
        if self.retriever.max_items == 0 {
            return Err(EngineError::Config(
                "retriever.max_items must be at least 1".to_string(),
            ));
        }
        if self.retriever.oversample_factor == 0 {
            return Err(EngineError::Config(
                "retriever.oversample_factor must be at least 1".to_string(),
            ));
        }

        if self.session.ttl_secs == 0 {
            return Err(EngineError::Config(
                "session.ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.session.max_sessions == 0 {
            return Err(EngineError::Config(
                "session.max_sessions must be at least 1".to_string(),
            ));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(EngineError::Config(
                "session.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.governor.max_concurrent, 5);
        assert_eq!(config.governor.max_queue_size, 20);
        assert_eq!(config.dispatch.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.dispatch.provider_timeout(), Duration::from_secs(10));
        assert_eq!(config.retriever.max_items, 20);
        assert_eq!(config.session.ttl(), Duration::from_secs(1800));
        assert_eq!(config.session.max_sessions, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.governor.max_concurrent = 0;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_rejects_weight_out_of_range() {
        let mut config = Config::default();
        config.retriever.dense_weight = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dense_weight"));
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let result = Config::from_toml_str("[core]\nlog_level = \"loud\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(
            config.providers.serpapi.endpoint,
            deserialized.providers.serpapi.endpoint
        );
    }
}
