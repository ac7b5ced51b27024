/// Configuration loading from file and environment
pub mod settings;

pub use settings::{
    AlertConfig, Config, DetectionConfig, NotificationConfig, PoolConfig, SourceConfig,
};
