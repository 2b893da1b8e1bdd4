//! Configuration error types.

use thiserror::Error;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating the agent configuration.
///
/// All of these are startup-fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("self-node-name is required")]
    MissingSelfNodeName,

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid listen address: {0}")]
    InvalidListenAddr(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
