//! Configuration management for the topicbot engine.
//!
//! The engine reads a single JSON file at `~/.topicbot/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (TOPICBOT_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `TOPICBOT_MAX_CLIENTS` → session.max_clients
//! - `TOPICBOT_SILENCE_THRESHOLD_SECS` → session.silence_threshold_secs
//! - `TOPICBOT_DEFAULT_TOPIC` → topics.default_topic
//! - `TOPICBOT_TOPIC_PLUGIN_PATH` → topics.topic_plugin_path
//! - `TOPICBOT_RESPONSE_PLUGIN_PATH` → responses.response_plugin_path
//! - `TOPICBOT_CACHE_BACKEND` → cache.backend
//! - `TOPICBOT_CACHE_TTL_SECS` → cache.ttl_secs
//! - `TOPICBOT_REDIS_URL` → cache.redis.url
//! - `TOPICBOT_LOG_LEVEL` → observability.log_level
//! - `TOPICBOT_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".topicbot"),
        |dirs| dirs.home_dir().join(".topicbot"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Session store and continuity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds of silence before a proactive turn is triggered
    #[serde(default = "default_silence_threshold_secs")]
    pub silence_threshold_secs: f64,

    /// Variance (seconds squared) of the normal jitter subtracted from the threshold
    #[serde(default)]
    pub silence_threshold_variance: f64,

    /// Maximum number of sessions tracked by the session store
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Intent label supplied for silence-triggered turns
    #[serde(default = "default_initiative_intent")]
    pub initiative_intent: String,

    /// Dispatch every resolved topic instead of the first one only
    #[serde(default)]
    pub multi_topic: bool,

    /// Maximum number of topic snapshots kept per session
    #[serde(default = "default_topic_stack_depth")]
    pub topic_stack_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            silence_threshold_secs: default_silence_threshold_secs(),
            silence_threshold_variance: 0.0,
            max_clients: default_max_clients(),
            initiative_intent: default_initiative_intent(),
            multi_topic: false,
            topic_stack_depth: default_topic_stack_depth(),
        }
    }
}

fn default_silence_threshold_secs() -> f64 {
    300.0
}

fn default_max_clients() -> usize {
    1000
}

fn default_initiative_intent() -> String {
    "initiative".into()
}

fn default_topic_stack_depth() -> usize {
    8
}

// ============================================================================
// Plugin Configuration
// ============================================================================

/// Topic registry settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TopicsConfig {
    /// Topic used when no intent label matches a registered topic
    #[serde(default)]
    pub default_topic: Option<String>,

    /// Directory tree scanned for topic manifests
    #[serde(default)]
    pub topic_plugin_path: Option<PathBuf>,
}

/// Response renderer settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponsesConfig {
    /// Directory tree scanned for renderer manifests
    #[serde(default)]
    pub response_plugin_path: Option<PathBuf>,
}

// ============================================================================
// Cache Configuration
// ============================================================================

/// Durable cache backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// In-process map (single process).
    #[default]
    Memory,
    /// Redis key-value service (multi-process).
    Redis,
}

impl std::str::FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(format!("Unknown cache backend: {other}")),
        }
    }
}

/// Redis connection settings for the durable cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisCacheConfig {
    /// Redis URL (redis://host:port).
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Key prefix for namespacing.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Connection timeout in seconds.
    #[serde(default = "default_redis_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            timeout_secs: default_redis_timeout_secs(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".into()
}

fn default_key_prefix() -> String {
    "topicbot:".into()
}

fn default_redis_timeout_secs() -> u64 {
    5
}

/// Durable cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Backend selector
    #[serde(default)]
    pub backend: CacheBackendKind,

    /// Time-to-live of persisted sessions, in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Redis settings (used when backend = redis)
    #[serde(default)]
    pub redis: RedisCacheConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            ttl_secs: default_ttl_secs(),
            redis: RedisCacheConfig::default(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

// ============================================================================
// Pacing Configuration
// ============================================================================

/// Reply pacing used to simulate human-paced multi-message replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Delay per word of reply text, in milliseconds
    #[serde(default = "default_per_word_delay_ms")]
    pub per_word_delay_ms: u64,

    /// Standard deviation of the normal jitter, in milliseconds
    #[serde(default = "default_jitter_std_ms")]
    pub jitter_std_ms: f64,

    /// Upper bound for computed delays, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            per_word_delay_ms: default_per_word_delay_ms(),
            jitter_std_ms: default_jitter_std_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_per_word_delay_ms() -> u64 {
    300
}

fn default_jitter_std_ms() -> f64 {
    100.0
}

fn default_max_delay_ms() -> u64 {
    10_000
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty, compact)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Session store and continuity settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Topic registry settings
    #[serde(default)]
    pub topics: TopicsConfig,

    /// Response renderer settings
    #[serde(default)]
    pub responses: ResponsesConfig,

    /// Durable cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Reply pacing
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TOPICBOT_MAX_CLIENTS") {
            if let Ok(n) = v.parse() {
                self.session.max_clients = n;
            }
        }
        if let Ok(v) = std::env::var("TOPICBOT_SILENCE_THRESHOLD_SECS") {
            if let Ok(n) = v.parse() {
                self.session.silence_threshold_secs = n;
            }
        }
        if let Ok(v) = std::env::var("TOPICBOT_DEFAULT_TOPIC") {
            self.topics.default_topic = Some(v);
        }
        if let Ok(v) = std::env::var("TOPICBOT_TOPIC_PLUGIN_PATH") {
            self.topics.topic_plugin_path = Some(PathBuf::from(shellexpand::tilde(&v).as_ref()));
        }
        if let Ok(v) = std::env::var("TOPICBOT_RESPONSE_PLUGIN_PATH") {
            self.responses.response_plugin_path =
                Some(PathBuf::from(shellexpand::tilde(&v).as_ref()));
        }
        if let Ok(v) = std::env::var("TOPICBOT_CACHE_BACKEND") {
            match v.parse() {
                Ok(kind) => self.cache.backend = kind,
                Err(e) => tracing::warn!(error = %e, "Ignoring TOPICBOT_CACHE_BACKEND"),
            }
        }
        if let Ok(v) = std::env::var("TOPICBOT_CACHE_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.cache.ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("TOPICBOT_REDIS_URL") {
            self.cache.redis.url = v;
        }
        if let Ok(level) = std::env::var("TOPICBOT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("TOPICBOT_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let dir = config_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }

        let path = config_path();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Cache time-to-live as a duration.
    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache.ttl_secs)
    }
}
