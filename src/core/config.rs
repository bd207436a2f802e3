use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::core::endpoints::{validate_endpoint, DEFAULT_TOKEN_URL, DEFAULT_USAGE_URL};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds between scheduled fetches in `watch` mode
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default = "default_threshold")]
    pub notification_threshold_percent: i64,
    /// How long snapshots are kept in the cached history
    #[serde(default = "default_history_hours")]
    pub history_hours: u64,
    #[serde(default = "default_format")]
    pub default_format: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_refresh_interval() -> u64 {
    30 * 60
}
fn default_true() -> bool {
    true
}
fn default_threshold() -> i64 {
    80
}
/// One leap year.
pub const MAX_HISTORY_HOURS: u64 = 366 * 24;

fn default_history_hours() -> u64 {
    24
}
fn default_format() -> String {
    "text".to_string()
}
fn default_color() -> String {
    "auto".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            notifications_enabled: true,
            notification_threshold_percent: default_threshold(),
            history_hours: default_history_hours(),
            default_format: default_format(),
            color: default_color(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// auto | keychain | file
    #[serde(default = "default_source")]
    pub credential_source: String,
    /// Overrides `~/.claude/.credentials.json` for the file source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,
}

fn default_source() -> String {
    "auto".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credential_source: default_source(),
            credentials_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_usage_url")]
    pub usage_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Connect + response bound for every request
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_usage_url() -> String {
    DEFAULT_USAGE_URL.to_string()
}
fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}
fn default_timeout() -> u64 {
    10
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            usage_url: default_usage_url(),
            token_url: default_token_url(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub endpoints: EndpointConfig,
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("usagewidget").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Serialize and write this config to the config file path.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, self.to_toml()?)?;
        Ok(path)
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let s = &self.settings;
        if !["text", "json"].contains(&s.default_format.as_str()) {
            issues.push(format!(
                "Invalid default_format: '{}' (must be 'text' or 'json')",
                s.default_format
            ));
        }
        if !["auto", "always", "never"].contains(&s.color.as_str()) {
            issues.push(format!(
                "Invalid color: '{}' (must be 'auto', 'always', or 'never')",
                s.color
            ));
        }
        if s.refresh_interval_secs == 0 {
            issues.push("refresh_interval_secs must be greater than 0".to_string());
        }
        if !(1..=MAX_HISTORY_HOURS).contains(&s.history_hours) {
            issues.push(format!(
                "Invalid history_hours: {} (must be 1-{})",
                s.history_hours, MAX_HISTORY_HOURS
            ));
        }
        if !(0..=100).contains(&s.notification_threshold_percent) {
            issues.push(format!(
                "Invalid notification_threshold_percent: {} (must be 0-100)",
                s.notification_threshold_percent
            ));
        }
        if !["auto", "keychain", "file"].contains(&self.auth.credential_source.as_str()) {
            issues.push(format!(
                "Invalid credential_source: '{}' (must be auto|keychain|file)",
                self.auth.credential_source
            ));
        }
        for (name, url) in [
            ("usage_url", &self.endpoints.usage_url),
            ("token_url", &self.endpoints.token_url),
        ] {
            if let Err(e) = validate_endpoint(url, name) {
                issues.push(e.to_string());
            }
        }
        if self.endpoints.timeout_secs == 0 {
            issues.push("timeout_secs must be greater than 0".to_string());
        }
        issues
    }
}
