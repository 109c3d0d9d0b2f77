//! Client configuration.
//!
//! Supports loading configuration from:
//! 1. Config file (TOML, JSON, or YAML) named by `TASKFLOW_CONFIG`
//! 2. Environment variables (`TASKFLOW_` prefix)
//!
//! Environment variables take precedence over config file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::DEFAULT_AUTH_FAILURE_MESSAGES;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// GraphQL API configuration
    pub api: ApiConfig,
    /// Local persistence configuration
    pub storage: StorageConfig,
    /// Authentication failure handling
    pub auth: AuthConfig,
}

/// GraphQL API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// GraphQL endpoint (default: "http://localhost:8000/graphql")
    pub endpoint: String,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

/// Local persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted keys (default: "~/.taskflow")
    pub data_dir: PathBuf,
    /// Key of the persisted token (default: "auth_token")
    pub token_key: String,
    /// Key of the persisted session snapshot (default: "auth-storage")
    pub session_key: String,
}

/// Authentication failure handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Server error messages (case-insensitive substrings) that mean the
    /// credential was rejected
    pub failure_messages: Vec<String>,
    /// Structured error code that means the credential was rejected
    pub failure_code: String,
    /// Refresh the token transparently on authentication failure (default: true)
    pub refresh_on_failure: bool,
}

// Default implementations

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/graphql".to_string(),
            timeout_secs: 30,
            user_agent: format!("taskflow-session/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".taskflow"),
            token_key: "auth_token".to_string(),
            session_key: "auth-storage".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            failure_messages: DEFAULT_AUTH_FAILURE_MESSAGES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            failure_code: "UNAUTHENTICATED".to_string(),
            refresh_on_failure: true,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ClientConfig {
    /// Load configuration from file and environment variables.
    /// Environment variables override file values.
    pub fn load() -> anyhow::Result<Self> {
        // Start with defaults
        let mut config = Self::default();

        // Try to load from config file if specified
        if let Ok(config_path) = std::env::var("TASKFLOW_CONFIG") {
            config = Self::from_file(&config_path)?;
            tracing::info!("Loaded configuration from: {}", config_path);
        }

        // Override with environment variables
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a file (supports TOML, JSON, YAML)
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config: ClientConfig = match extension {
            "toml" => toml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            _ => {
                // Try to detect format
                if content.trim().starts_with('{') {
                    serde_json::from_str(&content)?
                } else if content.contains("---") || content.contains(": ") {
                    serde_yaml::from_str(&content)?
                } else {
                    toml::from_str(&content)?
                }
            }
        };

        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`ClientConfig::load`]).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // API config
        if let Some(val) = lookup("TASKFLOW_API_URL") {
            self.api.endpoint = val;
        }
        if let Some(val) = lookup("TASKFLOW_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.api.timeout_secs = secs;
            }
        }
        if let Some(val) = lookup("TASKFLOW_USER_AGENT") {
            self.api.user_agent = val;
        }

        // Storage config
        if let Some(val) = lookup("TASKFLOW_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("TASKFLOW_TOKEN_KEY") {
            self.storage.token_key = val;
        }
        if let Some(val) = lookup("TASKFLOW_SESSION_KEY") {
            self.storage.session_key = val;
        }

        // Auth config
        if let Some(val) = lookup("TASKFLOW_AUTH_FAILURE_MESSAGES") {
            self.auth.failure_messages = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(val) = lookup("TASKFLOW_AUTH_FAILURE_CODE") {
            self.auth.failure_code = val;
        }
        if let Some(val) = lookup("TASKFLOW_REFRESH_ON_FAILURE") {
            self.auth.refresh_on_failure = val.parse().unwrap_or(true);
        }
    }

    /// Check the endpoint and storage keys. Call again after changing either.
    pub fn validate(&self) -> anyhow::Result<()> {
        let endpoint = url::Url::parse(&self.api.endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid API endpoint '{}': {}", self.api.endpoint, e))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!("API endpoint must be http(s): {}", self.api.endpoint);
        }
        if self.storage.token_key == self.storage.session_key {
            anyhow::bail!("Token key and session key must differ");
        }
        if self.auth.failure_messages.is_empty() && self.auth.failure_code.is_empty() {
            tracing::warn!(
                "No authentication failure markers configured; only HTTP 401 will trigger a token refresh"
            );
        }
        Ok(())
    }
}
