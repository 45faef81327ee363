//! Configuration loading, validation, and management for CRAB AI.
//!
//! Loads configuration from `~/.crabai/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.crabai/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Row store configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Prompting and response handling
    #[serde(default)]
    pub chat: ChatConfig,

    /// Answer sources, tried in this order
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderEntryConfig>,

    /// Standalone translation endpoint
    #[serde(default)]
    pub translation: TranslationConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Idle lifetime of a login session
    #[serde(default = "default_session_ttl")]
    pub session_ttl_minutes: u64,
}

fn default_port() -> u16 {
    5000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_session_ttl() -> u64 {
    7 * 24 * 60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            session_ttl_minutes: default_session_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path. Defaults to `~/.crabai/database.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    4
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Returned with `success = false` when every source fails
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,

    /// How many recent turns are replayed into the prompt
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    #[serde(default = "default_detailed_prefix")]
    pub detailed_prefix: String,

    /// Lines of a response containing any of these are dropped
    #[serde(default = "default_blocked_markers")]
    pub blocked_markers: Vec<String>,
}

fn default_system_prompt() -> String {
    "You are CRAB (Advanced Voice Intelligence System) developed by Yahya. \
     You are helpful, professional, and slightly futuristic. \
     Keep responses concise but informative."
        .into()
}
fn default_fallback_message() -> String {
    "I'm having trouble connecting to the AI service right now. Please try again in a moment."
        .into()
}
fn default_context_turns() -> usize {
    5
}
fn default_title_max_chars() -> usize {
    30
}
fn default_detailed_prefix() -> String {
    "Provide a detailed explanation about: ".into()
}
fn default_blocked_markers() -> Vec<String> {
    vec!["llmplayground.net".into()]
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            fallback_message: default_fallback_message(),
            context_turns: default_context_turns(),
            title_max_chars: default_title_max_chars(),
            detailed_prefix: default_detailed_prefix(),
            blocked_markers: default_blocked_markers(),
        }
    }
}

/// Which adapter implementation backs a chain entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `/chat/completions` on any OpenAI-compatible endpoint
    OpenaiCompat,
    /// Wikipedia page summary
    Wikipedia,
    /// Machine translation of the query
    Translate,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderKind::OpenaiCompat => "openai_compat",
            ProviderKind::Wikipedia => "wikipedia",
            ProviderKind::Translate => "translate",
        };
        f.write_str(s)
    }
}

/// One entry of the ordered answer-source chain.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderEntryConfig {
    pub name: String,

    pub kind: ProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Transport timeout for a single attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Wikipedia language edition (e.g. "en")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Translation target language (e.g. "ta")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl std::fmt::Debug for ProviderEntryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntryConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("enabled", &self.enabled)
            .field("language", &self.language)
            .field("target_language", &self.target_language)
            .finish()
    }
}

impl ProviderEntryConfig {
    fn new(name: &str, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            api_url: None,
            api_key: None,
            model: None,
            timeout_secs: default_timeout_secs(),
            enabled: true,
            language: None,
            target_language: None,
        }
    }
}

fn default_providers() -> Vec<ProviderEntryConfig> {
    vec![
        ProviderEntryConfig {
            api_url: Some("https://api.deepinfra.com/v1/openai".into()),
            model: Some("meta-llama/Meta-Llama-3.1-70B-Instruct".into()),
            ..ProviderEntryConfig::new("deepinfra", ProviderKind::OpenaiCompat)
        },
        ProviderEntryConfig {
            api_url: Some("https://openrouter.ai/api/v1".into()),
            model: Some("openai/gpt-4o-mini".into()),
            ..ProviderEntryConfig::new("openrouter", ProviderKind::OpenaiCompat)
        },
        ProviderEntryConfig {
            language: Some("en".into()),
            timeout_secs: 15,
            ..ProviderEntryConfig::new("wikipedia", ProviderKind::Wikipedia)
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_translation_url")]
    pub api_url: String,

    #[serde(default = "default_target_language")]
    pub target_language: String,

    #[serde(default = "default_translation_timeout")]
    pub timeout_secs: u64,
}

fn default_translation_url() -> String {
    "https://translate.googleapis.com/translate_a/single".into()
}
fn default_target_language() -> String {
    "ta".into()
}
fn default_translation_timeout() -> u64 {
    20
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_url: default_translation_url(),
            target_language: default_target_language(),
            timeout_secs: default_translation_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.crabai/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `CRABAI_API_KEY`: key for OpenAI-compatible entries without one
    /// - `CRABAI_DATABASE`: SQLite file path
    /// - `CRABAI_PORT`: gateway port
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
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

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("CRABAI_API_KEY") {
            for entry in self
                .providers
                .iter_mut()
                .filter(|p| p.kind == ProviderKind::OpenaiCompat && p.api_key.is_none())
            {
                entry.api_key = Some(key.clone());
            }
        }

        if let Ok(path) = std::env::var("CRABAI_DATABASE") {
            self.database.path = Some(path);
        }

        if let Some(port) = std::env::var("CRABAI_PORT").ok().and_then(|p| p.parse().ok()) {
            self.gateway.port = port;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".crabai")
    }

    /// Resolved SQLite file path.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::config_dir().join("database.db"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.fallback_message.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "chat.fallback_message must not be empty".into(),
            ));
        }

        if !(1..=50).contains(&self.chat.context_turns) {
            return Err(ConfigError::ValidationError(
                "chat.context_turns must be between 1 and 50".into(),
            ));
        }

        if self.chat.title_max_chars == 0 {
            return Err(ConfigError::ValidationError(
                "chat.title_max_chars must be > 0".into(),
            ));
        }

        if self
            .chat
            .blocked_markers
            .iter()
            .any(|m| m.is_empty() || m.contains('\n'))
        {
            return Err(ConfigError::ValidationError(
                "chat.blocked_markers entries must be non-empty single-line strings".into(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.providers {
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate provider name '{}'",
                    entry.name
                )));
            }
            if entry.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}': timeout_secs must be > 0",
                    entry.name
                )));
            }
        }

        if self.translation.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "translation.timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Enabled chain entries, in preference order.
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderEntryConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            chat: ChatConfig::default(),
            providers: default_providers(),
            translation: TranslationConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("LOCALAPPDATA")
            .or_else(|_| std::env::var("USERPROFILE"))
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

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 5000);
        assert_eq!(config.chat.context_turns, 5);
        assert_eq!(config.chat.title_max_chars, 30);
        assert_eq!(config.providers.len(), 3);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.gateway.port, config.gateway.port);
        let names: Vec<_> = parsed.providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["deepinfra", "openrouter", "wikipedia"]);
    }

    #[test]
    fn provider_order_is_preserved() {
        let toml_str = r#"
[[providers]]
name = "wiki"
kind = "wikipedia"

[[providers]]
name = "primary"
kind = "openai_compat"
api_url = "http://localhost:11434/v1"
model = "llama3"
timeout_secs = 5

[[providers]]
name = "tamil"
kind = "translate"
target_language = "ta"
enabled = false
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers[0].kind, ProviderKind::Wikipedia);
        assert_eq!(config.providers[1].timeout_secs, 5);
        assert_eq!(config.providers[0].timeout_secs, 60);
        let enabled: Vec<_> = config.enabled_providers().map(|p| p.name.clone()).collect();
        assert_eq!(enabled, vec!["wiki", "primary"]);
    }

    #[test]
    fn duplicate_provider_names_rejected() {
        let mut config = AppConfig::default();
        config.providers[1].name = "deepinfra".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.providers[0].timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn multiline_marker_rejected() {
        let mut config = AppConfig::default();
        config.chat.blocked_markers.push("a\nb".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn context_turns_bounds() {
        let mut config = AppConfig::default();
        config.chat.context_turns = 0;
        assert!(config.validate().is_err());
        config.chat.context_turns = 51;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().gateway.port, 5000);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[gateway]\nport = 8088\n\n[database]\npath = \"/tmp/crab.db\"\n",
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.gateway.port, 8088);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/crab.db"));
        assert_eq!(config.providers.len(), 3);
    }

    #[test]
    fn unparsable_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "gateway = [not valid").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn debug_redacts_api_keys() {
        let mut config = AppConfig::default();
        config.providers[0].api_key = Some("sk-very-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("deepinfra"));
        assert!(toml_str.contains("llmplayground.net"));
    }
}
