//! Configuration loading, validation, and management for mediaclaw.
//!
//! Loads configuration from `~/.mediaclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.mediaclaw/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the default provider (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model backend
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature. The agent runs deterministically by default.
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// External media services
    #[serde(default)]
    pub services: ServicesConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "qwen2.5:7b".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    2048
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
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("services", &self.services)
            .field("gateway", &self.gateway)
            .field("logging", &self.logging)
            .field("providers", &self.providers)
            .finish()
    }
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

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Limits for one orchestration cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum decide/invoke round trips per user message
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Upper bound for a single decision call
    #[serde(default = "default_decision_timeout")]
    pub decision_timeout_secs: u64,

    /// Upper bound for a single tool dispatch
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
}

fn default_max_iterations() -> u32 {
    12
}
fn default_decision_timeout() -> u64 {
    90
}
fn default_tool_timeout() -> u64 {
    30
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            decision_timeout_secs: default_decision_timeout(),
            tool_timeout_secs: default_tool_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_radarr")]
    pub radarr: ArrConfig,

    #[serde(default = "default_sonarr")]
    pub sonarr: ArrConfig,

    #[serde(default)]
    pub qbittorrent: QbittorrentConfig,

    /// Per-request timeout for all service calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    10
}
fn default_radarr() -> ArrConfig {
    ArrConfig {
        host: "http://localhost:7878".into(),
        api_key: None,
    }
}
fn default_sonarr() -> ArrConfig {
    ArrConfig {
        host: "http://localhost:8989".into(),
        api_key: None,
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            radarr: default_radarr(),
            sonarr: default_sonarr(),
            qbittorrent: QbittorrentConfig::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Connection settings for a Radarr or Sonarr instance.
#[derive(Clone, Serialize, Deserialize)]
pub struct ArrConfig {
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ArrConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrConfig")
            .field("host", &self.host)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct QbittorrentConfig {
    #[serde(default = "default_qbittorrent_host")]
    pub host: String,

    #[serde(default = "default_qbittorrent_username")]
    pub username: String,

    #[serde(default = "default_qbittorrent_password")]
    pub password: String,
}

fn default_qbittorrent_host() -> String {
    "http://localhost:8081".into()
}
fn default_qbittorrent_username() -> String {
    "admin".into()
}
fn default_qbittorrent_password() -> String {
    "adminadmin".into()
}

impl Default for QbittorrentConfig {
    fn default() -> Self {
        Self {
            host: default_qbittorrent_host(),
            username: default_qbittorrent_username(),
            password: default_qbittorrent_password(),
        }
    }
}

impl std::fmt::Debug for QbittorrentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QbittorrentConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Upper bound on sessions kept in memory
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Browser origins allowed to call the API
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    5001
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_sessions() -> usize {
    1_000
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5001".into(),
        "http://127.0.0.1:5001".into(),
        "http://localhost:3000".into(),
    ]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_sessions: default_max_sessions(),
            cors_origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.mediaclaw/config.toml)
    /// and apply environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
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

    /// Apply overrides from the environment.
    ///
    /// `lookup` is `std::env::var` in production and a map in tests.
    /// Recognized variables:
    /// - `MEDIACLAW_PROVIDER`, `MEDIACLAW_MODEL`, `MEDIACLAW_API_KEY`
    /// - `OPENAI_API_KEY` / `DEEPSEEK_API_KEY` / `ANTHROPIC_API_KEY` for the matching provider
    /// - `OLLAMA_HOST`
    /// - `RADARR_HOST`, `RADARR_API_KEY`, `SONARR_HOST`, `SONARR_API_KEY`
    /// - `QBITTORRENT_HOST`, `QBITTORRENT_USERNAME`, `QBITTORRENT_PASSWORD`
    /// - `LOG_LEVEL`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get("MEDIACLAW_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = get("MEDIACLAW_MODEL") {
            self.default_model = model;
        }

        if let Some(key) = get("MEDIACLAW_API_KEY") {
            self.api_key = Some(key);
        } else if self.api_key.is_none() {
            let vendor_key = match self.default_provider.as_str() {
                "openai" => get("OPENAI_API_KEY"),
                "deepseek" => get("DEEPSEEK_API_KEY"),
                "anthropic" => get("ANTHROPIC_API_KEY"),
                _ => None,
            };
            self.api_key = vendor_key;
        }

        if let Some(host) = get("OLLAMA_HOST") {
            let url = format!("{}/v1", host.trim_end_matches('/'));
            self.providers.entry("ollama".into()).or_insert(ProviderConfig {
                api_key: None,
                api_url: None,
                default_model: None,
            }).api_url = Some(url);
        }

        if let Some(host) = get("RADARR_HOST") {
            self.services.radarr.host = host;
        }
        if let Some(key) = get("RADARR_API_KEY") {
            self.services.radarr.api_key = Some(key);
        }
        if let Some(host) = get("SONARR_HOST") {
            self.services.sonarr.host = host;
        }
        if let Some(key) = get("SONARR_API_KEY") {
            self.services.sonarr.api_key = Some(key);
        }
        if let Some(host) = get("QBITTORRENT_HOST") {
            self.services.qbittorrent.host = host;
        }
        if let Some(user) = get("QBITTORRENT_USERNAME") {
            self.services.qbittorrent.username = user;
        }
        if let Some(pass) = get("QBITTORRENT_PASSWORD") {
            self.services.qbittorrent.password = pass;
        }

        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mediaclaw")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.decision_timeout_secs == 0
            || self.agent.tool_timeout_secs == 0
            || self.services.request_timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".into(),
            ));
        }

        for (name, host) in [
            ("services.radarr.host", &self.services.radarr.host),
            ("services.sonarr.host", &self.services.sonarr.host),
            ("services.qbittorrent.host", &self.services.qbittorrent.host),
        ] {
            if !host.starts_with("http://") && !host.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must start with http:// or https://, got '{host}'"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Whether the default provider runs locally and needs no key.
    pub fn provider_is_local(&self) -> bool {
        matches!(
            self.default_provider.as_str(),
            "ollama" | "vllm" | "llamacpp" | "llama.cpp"
        )
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            services: ServicesConfig::default(),
            gateway: GatewayConfig::default(),
            logging: LoggingConfig::default(),
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
