//! Configuration for the activity recorder.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::collector::CollectorConfig;

/// Environment variable consulted when no OBS password is configured.
pub const OBS_PASSWORD_ENV: &str = "OBS_WS_PASSWORD";

/// Main configuration for the recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parent directory of all session directories
    pub recordings_dir: PathBuf,

    /// Which input sources to capture
    pub sources: SourceConfig,

    /// Whether the OS scrolls content with the finger direction
    pub natural_scrolling: bool,

    /// Whether the running recorder should be paused
    pub paused: bool,

    /// How often the active window is sampled
    #[serde(with = "duration_serde")]
    pub focus_poll_interval: Duration,

    /// How long the writer waits for an event before re-checking its flag
    #[serde(with = "duration_serde")]
    pub writer_poll_timeout: Duration,

    /// How long a capture adapter may take to stop
    #[serde(with = "duration_serde")]
    pub adapter_stop_timeout: Duration,

    /// Screen recorder connection
    pub obs: ObsConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("activity-recorder");

        Self {
            recordings_dir: data_dir.join("recordings"),
            sources: SourceConfig::default(),
            natural_scrolling: cfg!(target_os = "macos"),
            paused: false,
            focus_poll_interval: Duration::from_millis(500),
            writer_poll_timeout: Duration::from_millis(100),
            adapter_stop_timeout: Duration::from_secs(1),
            obs: ObsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("activity-recorder")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.recordings_dir)?;
        Ok(())
    }
}

/// Configuration for which input sources to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub keyboard: bool,
    pub mouse: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            keyboard: true,
            mouse: true,
        }
    }
}

impl SourceConfig {
    /// Parse source configuration from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let sources: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();

        Self {
            keyboard: sources.iter().any(|s| s == "keyboard" || s == "all"),
            mouse: sources.iter().any(|s| s == "mouse" || s == "all"),
        }
    }

    /// Check if at least one source is enabled.
    pub fn any_enabled(&self) -> bool {
        self.keyboard || self.mouse
    }
}

impl From<SourceConfig> for CollectorConfig {
    fn from(sources: SourceConfig) -> Self {
        CollectorConfig {
            capture_keyboard: sources.keyboard,
            capture_mouse: sources.mouse,
        }
    }
}

/// obs-websocket connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObsConfig {
    /// Record video alongside events
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Empty means no authentication (or `OBS_WS_PASSWORD`)
    pub password: String,
    /// Profile to switch to while recording; restored afterwards
    pub profile: Option<String>,
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 4455,
            password: String::new(),
            profile: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl ObsConfig {
    /// The websocket URL of the OBS server.
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    /// Configured password, or the environment override when none is set.
    pub fn resolved_password(&self) -> Option<String> {
        if !self.password.is_empty() {
            return Some(self.password.clone());
        }
        std::env::var(OBS_PASSWORD_ENV)
            .ok()
            .filter(|p| !p.is_empty())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Serde support for Duration, stored as whole milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
