/// Error types for the pool watcher
pub mod error;

/// Core event types
pub mod events;

/// Log line sources, parsing and readiness checks
pub mod collectors;

/// Bounded window of recent requests
pub mod aggregator;

/// Error-rate and pool-change detection
pub mod triggers;

/// Alert dispatch and notification delivery
pub mod alerts;

/// Configuration management
pub mod config;

/// Self-monitoring counters
pub mod monitoring;

/// Per-line watcher loop
pub mod watcher;

// Re-export commonly used types
pub use error::{AlertError, CollectorError, ConfigError, ReadinessError, WatcherError};
pub use events::{AlertKind, RequestEvent};
pub use watcher::{PoolWatcher, StopReason};
