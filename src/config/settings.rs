use crate::error::ConfigError;
use log::{info, warn};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Suffix of the placeholder URL shipped in example environment files
const PLACEHOLDER_WEBHOOK_SUFFIX: &str = "/YOUR/WEBHOOK/URL";

/// Largest accepted request window
pub const MAX_WINDOW_SIZE: usize = 1_000_000;

/// Largest accepted alert cooldown (one year)
pub const MAX_COOLDOWN_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Largest accepted webhook timeout
pub const MAX_WEBHOOK_TIMEOUT_SECONDS: u64 = 300;

/// Watcher configuration
///
/// Built from defaults, optionally overlaid with a TOML file, then overlaid
/// with environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub notification: NotificationConfig,
    pub pools: PoolConfig,
    pub detection: DetectionConfig,
    pub alerts: AlertConfig,
    pub source: SourceConfig,
}

/// Where and how alerts are delivered
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Slack incoming webhook URL; unset or placeholder means print locally
    pub webhook_url: Option<String>,
    /// Display name attached to alerts
    pub username: String,
    /// Timeout for one webhook call
    pub timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: "DevOps Watcher - Stage 3 watcher".to_string(),
            timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool expected to serve traffic when healthy
    pub active_pool: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            active_pool: "blue".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Error percentage over the window that triggers an alert
    pub error_rate_threshold: f64,
    /// Number of recent requests the error rate is computed over
    pub window_size: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold: 2.0,
            window_size: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum time between two alerts of the same kind
    pub cooldown_seconds: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Container whose logs are streamed
    pub container: String,
    /// How many times to check the container is running before giving up
    pub readiness_attempts: u32,
    /// Pause between readiness checks
    pub readiness_interval_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            container: "nginx_proxy".to_string(),
            readiness_attempts: 60,
            readiness_interval_seconds: 1,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read and
    /// `ConfigError::TomlError` if it is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load a config file if given, falling back to defaults when it is unreadable
    ///
    /// Invalid contents are still an error, since silently ignoring a
    /// half-written config would hide mistakes.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                match Self::from_file(path) {
                    Ok(config) => Ok(config),
                    Err(ConfigError::ReadError(e)) => {
                        warn!("Configuration file not found or unreadable ({}), using defaults", e);
                        Ok(Self::default())
                    }
                    Err(e) => Err(e),
                }
            }
            None => Ok(Self::default()),
        }
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Overlay values from an arbitrary variable lookup
    ///
    /// Recognized variables: `SLACK_WEBHOOK_URL`, `WATCHER_NAME`,
    /// `WEBHOOK_TIMEOUT_SEC`, `ACTIVE_POOL`, `ERROR_RATE_THRESHOLD`,
    /// `WINDOW_SIZE`, `ALERT_COOLDOWN_SEC`, `NGINX_CONTAINER`,
    /// `READINESS_ATTEMPTS`, `READINESS_INTERVAL_SEC`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SLACK_WEBHOOK_URL") {
            self.notification.webhook_url = Some(url);
        }
        if let Some(name) = lookup("WATCHER_NAME") {
            self.notification.username = name;
        }
        if let Some(pool) = lookup("ACTIVE_POOL") {
            self.pools.active_pool = pool.trim().to_string();
        }
        if let Some(container) = lookup("NGINX_CONTAINER") {
            self.source.container = container;
        }

        parse_env(&lookup, "WEBHOOK_TIMEOUT_SEC", &mut self.notification.timeout_seconds)?;
        parse_env(&lookup, "ERROR_RATE_THRESHOLD", &mut self.detection.error_rate_threshold)?;
        parse_env(&lookup, "WINDOW_SIZE", &mut self.detection.window_size)?;
        parse_env(&lookup, "ALERT_COOLDOWN_SEC", &mut self.alerts.cooldown_seconds)?;
        parse_env(&lookup, "READINESS_ATTEMPTS", &mut self.source.readiness_attempts)?;
        parse_env(
            &lookup,
            "READINESS_INTERVAL_SEC",
            &mut self.source.readiness_interval_seconds,
        )?;

        Ok(())
    }

    /// Check that all values are usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pools.active_pool.is_empty() {
            return Err(ConfigError::ValidationError(
                "active pool must not be empty".to_string(),
            ));
        }
        if self.pools.active_pool == "-" {
            return Err(ConfigError::ValidationError(
                "active pool must not be '-'".to_string(),
            ));
        }
        if self.detection.window_size == 0 || self.detection.window_size > MAX_WINDOW_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "window size must be between 1 and {}, got {}",
                MAX_WINDOW_SIZE, self.detection.window_size
            )));
        }
        if self.alerts.cooldown_seconds > MAX_COOLDOWN_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "alert cooldown must be at most {}s, got {}s",
                MAX_COOLDOWN_SECONDS, self.alerts.cooldown_seconds
            )));
        }
        let threshold = self.detection.error_rate_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "error rate threshold must be a non-negative number, got {}",
                threshold
            )));
        }
        let timeout = self.notification.timeout_seconds;
        if timeout == 0 || timeout > MAX_WEBHOOK_TIMEOUT_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "webhook timeout must be between 1 and {}s, got {}s",
                MAX_WEBHOOK_TIMEOUT_SECONDS, timeout
            )));
        }
        if self.source.readiness_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "readiness attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Webhook URL if one is configured and is not the example placeholder
    pub fn webhook_url(&self) -> Option<&str> {
        self.notification
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty() && !url.ends_with(PLACEHOLDER_WEBHOOK_SUFFIX))
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.notification.timeout_seconds)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_secs(self.source.readiness_interval_seconds)
    }
}

/// Parse an environment variable into `target` if it is set
fn parse_env<F, T>(lookup: &F, name: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(name) {
        *target = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value,
        })?;
    }
    Ok(())
}
