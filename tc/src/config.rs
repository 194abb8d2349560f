//! TripCrew configuration types and loading

use eyre::{Context, Result};
use itinerary::EmptyDayPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::trip::TripId;

/// Main TripCrew configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST server configuration
    pub server: ServerConfig,

    /// Realtime channel configuration
    pub realtime: RealtimeConfig,

    /// Sync coordinator configuration
    pub sync: SyncConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the bearer token environment variable is set.
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.server.token_env).is_err() {
            return Err(eyre::eyre!(
                "API token not found. Set the {} environment variable.",
                self.server.token_env
            ));
        }
        Url::parse(&self.server.base_url).context(format!("Invalid base-url: {}", self.server.base_url))?;
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .tripcrew.yml
        let local_config = PathBuf::from(".tripcrew.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/tripcrew/tripcrew.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tripcrew").join("tripcrew.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// WebSocket URL for a trip's realtime channel
    ///
    /// Uses `realtime.ws-url` when set, otherwise `server.base-url` with its
    /// scheme switched to ws/wss. The token travels as a query parameter.
    pub fn ws_url(&self, trip_id: TripId, token: &str) -> Result<Url> {
        let mut url = match &self.realtime.ws_url {
            Some(ws_url) => Url::parse(ws_url).context(format!("Invalid ws-url: {}", ws_url))?,
            None => {
                let mut url = Url::parse(&self.server.base_url)
                    .context(format!("Invalid base-url: {}", self.server.base_url))?;
                let scheme = match url.scheme() {
                    "https" => "wss",
                    _ => "ws",
                };
                url.set_scheme(scheme)
                    .map_err(|_| eyre::eyre!("Cannot derive a WebSocket URL from {}", self.server.base_url))?;
                url
            }
        };

        let path = format!(
            "{}{}/trips/{}/ws",
            url.path().trim_end_matches('/'),
            self.server.api_prefix,
            trip_id
        );
        url.set_path(&path);
        url.query_pairs_mut().clear().append_pair("token", token);
        Ok(url)
    }
}

/// REST server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path prefix of every API route
    #[serde(rename = "api-prefix")]
    pub api_prefix: String,

    /// Environment variable containing the bearer token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Retries for read-only fetches on transient errors
    #[serde(rename = "fetch-retries")]
    pub fetch_retries: u32,

    /// First retry delay in milliseconds, doubled on each attempt
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on a single retry delay
    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_prefix: "/v1".to_string(),
            token_env: "TRIPCREW_TOKEN".to_string(),
            timeout_ms: 30_000,
            fetch_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

impl ServerConfig {
    /// Read the bearer token from the configured environment variable
    pub fn token(&self) -> Result<String> {
        std::env::var(&self.token_env).context(format!("Environment variable {} not set", self.token_env))
    }

    /// Delay before the given 1-based fetch retry
    pub fn retry_backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms)
    }

    /// Full URL of an API route, e.g. `api_url("/trips/3")`
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url.trim_end_matches('/'), self.api_prefix, path)
    }
}

/// Realtime channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// WebSocket base URL; derived from the server base URL when absent
    #[serde(rename = "ws-url")]
    pub ws_url: Option<String>,

    /// Handshake timeout in milliseconds
    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    /// Reconnect policy after the channel closes
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_url: None,
            connect_timeout_ms: 10_000,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Exponential backoff for reopening a closed channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,

    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,

    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given 1-based attempt
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms)
    }
}

/// Sync coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// What happens to a day header once its last item leaves
    #[serde(rename = "empty-days")]
    pub empty_days: EmptyDayPolicy,

    /// Command mailbox capacity
    #[serde(rename = "command-buffer")]
    pub command_buffer: usize,

    /// Event broadcast capacity
    #[serde(rename = "event-buffer")]
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            empty_days: EmptyDayPolicy::Keep,
            command_buffer: 64,
            event_buffer: 256,
        }
    }
}
