//! Client Configuration
//!
//! Endpoint, credentials, timeouts and logging settings for one facade
//! instance. Loaded from the environment or a JSON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{ClientError, ClientResult};

/// Environment variable holding the service URL
pub const ENV_URL: &str = "AERODB_URL";
/// Environment variable holding the API key
pub const ENV_API_KEY: &str = "AERODB_API_KEY";
/// Optional request timeout override, in seconds
pub const ENV_TIMEOUT_SECS: &str = "AERODB_TIMEOUT_SECS";
/// Optional log directory override (empty disables file logging)
pub const ENV_LOG_DIR: &str = "AERODB_LOG_DIR";

/// Facade configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service base URL, e.g. `https://project.example.co`
    pub url: String,

    /// Anonymous or service API key
    pub api_key: String,

    /// Per-request timeout (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Database schema for row operations (default: "public")
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Directory for daily log files (default: "logs", null disables)
    #[serde(default = "default_log_dir")]
    pub log_dir: Option<PathBuf>,

    /// Mirror INFO and above to stderr (default: true)
    #[serde(default = "default_console_log")]
    pub console_log: bool,

    /// How long to wait for a realtime join reply (default: 10)
    #[serde(default = "default_realtime_join_timeout_secs")]
    pub realtime_join_timeout_secs: u64,

    /// Realtime heartbeat interval (default: 25)
    #[serde(default = "default_realtime_heartbeat_secs")]
    pub realtime_heartbeat_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_log_dir() -> Option<PathBuf> {
    Some(PathBuf::from("logs"))
}

fn default_console_log() -> bool {
    true
}

fn default_realtime_join_timeout_secs() -> u64 {
    10
}

fn default_realtime_heartbeat_secs() -> u64 {
    25
}

impl ClientConfig {
    /// Create a config with default settings
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            timeout_secs: default_timeout_secs(),
            schema: default_schema(),
            log_dir: default_log_dir(),
            console_log: default_console_log(),
            realtime_join_timeout_secs: default_realtime_join_timeout_secs(),
            realtime_heartbeat_secs: default_realtime_heartbeat_secs(),
        }
    }

    /// Load from `AERODB_URL` / `AERODB_API_KEY` and optional overrides
    pub fn from_env() -> ClientResult<Self> {
        let url = std::env::var(ENV_URL).unwrap_or_default();
        let api_key = std::env::var(ENV_API_KEY).unwrap_or_default();
        let mut config = Self::new(url, api_key);

        if let Ok(raw) = std::env::var(ENV_TIMEOUT_SECS) {
            config.timeout_secs = raw.trim().parse().map_err(|_| {
                ClientError::connection(format!("Invalid {}: {}", ENV_TIMEOUT_SECS, raw))
            })?;
        }

        if let Ok(dir) = std::env::var(ENV_LOG_DIR) {
            config.log_dir = if dir.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn from_file(path: &Path) -> ClientResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ClientError::connection(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            ClientError::connection(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Builder-style log directory override
    pub fn with_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.log_dir = dir;
        self
    }

    /// Builder-style timeout override
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_console_log(mut self, enabled: bool) -> Self {
        self.console_log = enabled;
        self
    }

    /// Check required settings; runs before any client object is built
    pub fn validate(&self) -> ClientResult<()> {
        if self.url.trim().is_empty() || self.api_key.trim().is_empty() {
            return Err(ClientError::connection("URL and API key are required"));
        }
        self.base_url()?;
        if self.timeout_secs == 0 {
            return Err(ClientError::connection("timeout_secs must be positive"));
        }
        if self.schema.trim().is_empty() {
            return Err(ClientError::connection("schema cannot be empty"));
        }
        Ok(())
    }

    /// Parsed service URL
    pub fn base_url(&self) -> ClientResult<Url> {
        let url = Url::parse(self.url.trim())
            .map_err(|e| ClientError::connection(format!("Invalid URL '{}': {}", self.url, e)))?;
        match url.scheme() {
            "http" | "https" if url.has_host() => Ok(url),
            _ => Err(ClientError::connection(format!(
                "URL must be http(s) with a host: {}",
                self.url
            ))),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn realtime_join_timeout(&self) -> Duration {
        Duration::from_secs(self.realtime_join_timeout_secs)
    }

    pub fn realtime_heartbeat(&self) -> Duration {
        Duration::from_secs(self.realtime_heartbeat_secs.max(1))
    }
}
