use thiserror::Error;

/// Errors that can occur in line sources and readiness checks
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("Failed to spawn subprocess: {0}")]
    SubprocessSpawn(String),

    #[error("Subprocess terminated unexpectedly: {0}")]
    SubprocessTerminated(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur when delivering an alert to the notification sink
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Webhook request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Webhook returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Webhook transport error: {0}")]
    Transport(String),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("Invalid value for environment variable {name}: {value:?}")]
    InvalidEnv { name: String, value: String },

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Errors that can occur while waiting for the log source to become ready
#[derive(Error, Debug)]
pub enum ReadinessError {
    #[error("Log source not ready after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Shutdown requested while waiting for the log source")]
    Interrupted,
}

/// Errors that end a watcher run
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to build async runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Invalid watcher configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to set up notification sink: {0}")]
    Sink(#[from] AlertError),

    #[error("Log source failed: {0}")]
    Source(#[from] CollectorError),
}
