//! Configuration error types following panic-free policy.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file exists but could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML or has mistyped fields
    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Environment override could not be converted
    #[error("Invalid value for {key}: {value} (expected {expected})")]
    InvalidEnv {
        key: String,
        value: String,
        expected: String,
    },

    /// A loaded value is out of range
    #[error("Invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
