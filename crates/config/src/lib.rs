//! Configuration loading, validation, and management for Emberchat.
//!
//! Loads configuration from `~/.emberchat/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.
//! The resulting [`AppConfig`] is immutable for the life of the process.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Secret shipped in the defaults. Tokens signed with it are forgeable by
/// anyone who has read this file.
pub const DEFAULT_SECRET_KEY: &str = "change_this_in_production_use_openssl_rand_hex_32";

/// The root configuration structure.
///
/// Maps directly to `~/.emberchat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Anthropic API key. Absent = demo mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the provider base URL (proxies, tests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model used for every completion
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on a single model call
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_provider_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

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
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("chat", &self.chat)
            .field("database", &self.database)
            .field("auth", &self.auth)
            .field("gateway", &self.gateway)
            .finish()
    }
}

/// Conversation windowing and turn handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// How many prior messages are sent with each turn. `<= 0` sends none.
    #[serde(default = "default_history_limit")]
    pub history_limit: i64,

    /// Fixed instructions prepended to every model call
    #[serde(default = "default_framing")]
    pub framing: String,

    /// Longest accepted user message, in characters
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Hold a per-conversation lock for the duration of a turn
    #[serde(default = "default_true")]
    pub serialize_turns: bool,
}

fn default_history_limit() -> i64 {
    20
}
fn default_framing() -> String {
    concat!(
        "You are a helpful assistant for Frederick Fire and Safety. ",
        "You help customers inquire about fire extinguishers and safety equipment. ",
        "You remember previous conversations and user preferences. ",
        "Be friendly, helpful, and professional.",
    )
    .into()
}
fn default_max_message_chars() -> usize {
    8000
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            framing: default_framing(),
            max_message_chars: default_max_message_chars(),
            serialize_turns: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite:///var/lib/emberchat/chat.db`
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    let path = AppConfig::config_dir().join("emberchat.db");
    format!("sqlite://{}", path.display())
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for access tokens
    #[serde(default = "default_secret_key")]
    pub secret_key: String,

    #[serde(default = "default_token_minutes")]
    pub access_token_expire_minutes: i64,
}

fn default_secret_key() -> String {
    DEFAULT_SECRET_KEY.into()
}
fn default_token_minutes() -> i64 {
    60
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &"[REDACTED]")
            .field(
                "access_token_expire_minutes",
                &self.access_token_expire_minutes,
            )
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: default_secret_key(),
            access_token_expire_minutes: default_token_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Prefix for the auth and chat routes
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Browser origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_api_prefix() -> String {
    "/api".into()
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".into(),
        "http://127.0.0.1:5173".into(),
        "http://localhost:3000".into(),
        "http://127.0.0.1:3000".into(),
    ]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            api_prefix: default_api_prefix(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.emberchat/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides:
    ///
    /// - `ANTHROPIC_API_KEY`, `CLAUDE_MODEL`
    /// - `DATABASE_URL`
    /// - `SECRET_KEY`, `ACCESS_TOKEN_EXPIRE_MINUTES`
    /// - `MAX_CONVERSATION_HISTORY`, `API_PREFIX`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        if config.auth.secret_key == DEFAULT_SECRET_KEY {
            tracing::warn!("Using the built-in SECRET_KEY; set a real one before deploying");
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

    /// Apply overrides from a key lookup (the process environment in
    /// production, a map in tests). Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(model) = get("CLAUDE_MODEL") {
            self.model = model;
        }
        if let Some(url) = get("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(secret) = get("SECRET_KEY") {
            self.auth.secret_key = secret;
        }
        if let Some(prefix) = get("API_PREFIX") {
            self.gateway.api_prefix = prefix;
        }
        if let Some(raw) = get("ACCESS_TOKEN_EXPIRE_MINUTES") {
            self.auth.access_token_expire_minutes = parse_env("ACCESS_TOKEN_EXPIRE_MINUTES", &raw)?;
        }
        if let Some(raw) = get("MAX_CONVERSATION_HISTORY") {
            self.chat.history_limit = parse_env("MAX_CONVERSATION_HISTORY", &raw)?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".emberchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.provider_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider_timeout_secs must be > 0".into(),
            ));
        }
        if self.chat.max_message_chars == 0 {
            return Err(ConfigError::ValidationError(
                "chat.max_message_chars must be > 0".into(),
            ));
        }
        if self.auth.secret_key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.secret_key must not be empty".into(),
            ));
        }
        if self.auth.access_token_expire_minutes <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.access_token_expire_minutes must be > 0".into(),
            ));
        }
        if !self.gateway.api_prefix.is_empty() && !self.gateway.api_prefix.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "gateway.api_prefix must start with '/'".into(),
            ));
        }
        Ok(())
    }

    /// Check if a provider credential is available. Decides live vs demo mode.
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            provider_timeout_secs: default_provider_timeout_secs(),
            chat: ChatConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} is not a valid integer: {raw}")))
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
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chat.history_limit, 20);
        assert_eq!(config.gateway.port, 8000);
        assert!(!config.has_api_key());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.chat.framing, config.chat.framing);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
model = "claude-3-5-haiku-latest"

[chat]
history_limit = 6
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "claude-3-5-haiku-latest");
        assert_eq!(config.chat.history_limit, 6);
        assert_eq!(config.chat.max_message_chars, 8000);
        assert_eq!(config.gateway.api_prefix, "/api");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "chat = [not toml").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                ("ANTHROPIC_API_KEY", "sk-ant-test"),
                ("MAX_CONVERSATION_HISTORY", "4"),
                ("DATABASE_URL", "sqlite::memory:"),
                ("SECRET_KEY", "s3cret"),
            ]))
            .unwrap();
        assert!(config.has_api_key());
        assert_eq!(config.chat.history_limit, 4);
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.auth.secret_key, "s3cret");
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[("ANTHROPIC_API_KEY", "  ")]))
            .unwrap();
        assert!(!config.has_api_key());
    }

    #[test]
    fn non_numeric_history_env_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(env(&[("MAX_CONVERSATION_HISTORY", "twenty")]))
            .unwrap_err();
        assert!(err.to_string().contains("MAX_CONVERSATION_HISTORY"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig {
            api_key: Some("sk-ant-very-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-ant-very-secret"));
        assert!(!debug.contains(DEFAULT_SECRET_KEY));
    }

    #[test]
    fn zero_token_lifetime_rejected() {
        let mut config = AppConfig::default();
        config.auth.access_token_expire_minutes = 0;
        assert!(config.validate().is_err());
    }
}
