//! Configuration for the signal pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Default ingest host.
pub const DEFAULT_BASE_URL: &str = "https://nom.telemetrydeck.com";

/// Main configuration for the signal pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identifier of the owning application (UUID-shaped)
    pub app_id: Option<String>,

    /// Base URL of the ingest service
    pub base_url: String,

    /// Optional namespace route segment
    pub namespace: Option<String>,

    /// Salt appended to the user identifier before hashing
    pub salt: String,

    /// Mark every signal as a test signal
    pub test_mode: bool,

    /// User identifier used when a call does not supply one
    pub default_user: Option<String>,

    /// Emit a session-started signal on every foreground transition
    pub send_new_session_began_signal: bool,

    /// Prefix applied to non-reserved signal types
    pub default_signal_prefix: Option<String>,

    /// Prefix applied to non-reserved payload keys
    pub default_parameter_prefix: Option<String>,

    /// Version string of the host application
    pub app_version: Option<String>,

    /// Directory for queue, session, duration and identity files
    pub data_path: PathBuf,

    /// Period between dispatch ticks
    #[serde(with = "duration_serde")]
    pub flush_interval: Duration,

    /// Keep the queue on disk between runs
    pub persist_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signal-relay");

        Self {
            app_id: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            namespace: None,
            salt: String::new(),
            test_mode: cfg!(debug_assertions),
            default_user: None,
            send_new_session_began_signal: true,
            default_signal_prefix: None,
            default_parameter_prefix: None,
            app_version: None,
            data_path: data_dir,
            flush_interval: Duration::from_secs(10),
            persist_cache: true,
        }
    }
}

impl Config {
    /// Create a configuration for the given application identifier.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: Some(app_id.into()),
            ..Self::default()
        }
    }

    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signal-relay")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Validate the required fields and return the parsed application id.
    ///
    /// A pipeline never starts without an application identity.
    pub fn validate(&self) -> Result<Uuid, ConfigError> {
        let raw = self
            .app_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingAppId)?;

        let app_id =
            Uuid::parse_str(raw).map_err(|_| ConfigError::InvalidAppId(raw.to_string()))?;

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }

        Ok(app_id)
    }

    /// Path of the persisted signal queue.
    pub fn cache_path(&self) -> PathBuf {
        self.data_path.join("signalcache.json")
    }

    /// Path of the persisted session history.
    pub fn sessions_path(&self) -> PathBuf {
        self.data_path.join("sessions.json")
    }

    /// Path of the persisted in-flight duration signals.
    pub fn durations_path(&self) -> PathBuf {
        self.data_path.join("durations.json")
    }

    /// Path of the stable anonymous identifier.
    pub fn identity_path(&self) -> PathBuf {
        self.data_path.join("identity")
    }

    /// Path of the persisted delivery counters.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("app_id is required")]
    MissingAppId,
    #[error("app_id '{0}' is not a UUID")]
    InvalidAppId(String),
    #[error("base_url '{0}' is not an http(s) URL")]
    InvalidBaseUrl(String),
    #[error("no transport configured and the http feature is disabled")]
    MissingTransport,
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
