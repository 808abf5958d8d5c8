//! Configuration loading, validation, and management for ripplecache.
//!
//! Loads configuration from `~/.ripplecache/config.toml` with environment
//! variable overrides. Validates all settings at load time.
//!
//! The main derived value is [`AppConfig::cache_target_tokens`]: the minimum
//! size a cached tier should reach before a cache boundary is worth placing.
//! It feeds the tracker's anchoring, history graduation and underfill
//! demotion policies; `0` turns all three off.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Minimum cacheable prefix for most Claude models.
pub const DEFAULT_MIN_CACHEABLE_TOKENS: usize = 1024;

/// Minimum cacheable prefix for Opus 4.5/4.6 and Haiku 4.5.
pub const LARGE_MIN_CACHEABLE_TOKENS: usize = 4096;

const LARGE_MINIMUM_MODELS: [&str; 6] = [
    "opus-4-5", "opus-4.5", "opus-4-6", "opus-4.6", "haiku-4-5", "haiku-4.5",
];

/// The root configuration structure.
///
/// Maps directly to `~/.ripplecache/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model the prompts are built for; decides the provider's cache minimum
    #[serde(default = "default_model")]
    pub model: String,

    /// Prompt-cache tiering configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Turn token-aware tier policies on or off
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Floor for the per-tier cache target, regardless of model
    #[serde(default = "default_cache_min_tokens")]
    pub cache_min_tokens: usize,

    /// Headroom over the minimum so tiers do not hover at the edge
    #[serde(default = "default_buffer_multiplier")]
    pub cache_buffer_multiplier: f64,
}

fn default_true() -> bool {
    true
}
fn default_cache_min_tokens() -> usize {
    DEFAULT_MIN_CACHEABLE_TOKENS
}
fn default_buffer_multiplier() -> f64 {
    1.5
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_min_tokens: default_cache_min_tokens(),
            cache_buffer_multiplier: default_buffer_multiplier(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            cache: CacheConfig::default(),
        }
    }
}

/// The provider's minimum cacheable prefix for `model`.
pub fn model_min_cacheable_tokens(model: &str) -> usize {
    let model = model.to_lowercase();
    if LARGE_MINIMUM_MODELS.iter().any(|m| model.contains(m)) {
        LARGE_MIN_CACHEABLE_TOKENS
    } else {
        DEFAULT_MIN_CACHEABLE_TOKENS
    }
}

impl CacheConfig {
    /// Target tokens per cached tier for `model`, or `0` when disabled.
    pub fn cache_target_tokens(&self, model: &str) -> usize {
        if !self.enabled {
            return 0;
        }
        let floor = self.cache_min_tokens.max(model_min_cacheable_tokens(model));
        (floor as f64 * self.cache_buffer_multiplier) as usize
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ripplecache/config.toml).
    ///
    /// Environment variables override the file:
    /// - `RIPPLECACHE_MODEL`
    /// - `RIPPLECACHE_CACHE_MIN_TOKENS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(model) = std::env::var("RIPPLECACHE_MODEL") {
            config.model = model;
        }

        if let Ok(raw) = std::env::var("RIPPLECACHE_CACHE_MIN_TOKENS") {
            config.cache.cache_min_tokens = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "RIPPLECACHE_CACHE_MIN_TOKENS must be a non-negative integer, got {raw:?}"
                ))
            })?;
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
        dirs_home().join(".ripplecache")
    }

    /// Target tokens per cached tier for the configured model.
    pub fn cache_target_tokens(&self) -> usize {
        self.cache.cache_target_tokens(&self.model)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        let multiplier = self.cache.cache_buffer_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "cache.cache_buffer_multiplier must be a finite value >= 1.0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

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
        assert!(config.cache.enabled);
        assert_eq!(config.cache.cache_min_tokens, 1024);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.cache.cache_min_tokens, config.cache.cache_min_tokens);
    }

    #[test]
    fn default_target_is_min_times_buffer() {
        let config = AppConfig::default();
        assert_eq!(config.cache_target_tokens(), 1536);
    }

    #[test]
    fn large_minimum_models_raise_target() {
        assert_eq!(model_min_cacheable_tokens("anthropic/claude-opus-4-5"), 4096);
        assert_eq!(model_min_cacheable_tokens("claude-haiku-4.5"), 4096);
        assert_eq!(model_min_cacheable_tokens("claude-sonnet-4"), 1024);
        let cache = CacheConfig::default();
        assert_eq!(cache.cache_target_tokens("Claude-Opus-4-6"), 6144);
    }

    #[test]
    fn configured_floor_wins_over_model_minimum() {
        let cache = CacheConfig {
            cache_min_tokens: 8000,
            cache_buffer_multiplier: 1.0,
            ..CacheConfig::default()
        };
        assert_eq!(cache.cache_target_tokens("claude-opus-4-5"), 8000);
    }

    #[test]
    fn disabled_cache_has_zero_target() {
        let cache = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        assert_eq!(cache.cache_target_tokens("anything"), 0);
    }

    #[test]
    fn invalid_multiplier_rejected() {
        let config = AppConfig {
            cache: CacheConfig {
                cache_buffer_multiplier: 0.5,
                ..CacheConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().model, "anthropic/claude-sonnet-4");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = \"claude-haiku-4-5\"\n\n[cache]\ncache_min_tokens = 2048").unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model, "claude-haiku-4-5");
        assert_eq!(config.cache.cache_min_tokens, 2048);
        assert!((config.cache.cache_buffer_multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.cache_target_tokens(), 6144);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache\nenabled = ").unwrap();

        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("claude-sonnet-4"));
        assert!(toml_str.contains("cache_min_tokens"));
    }
}
