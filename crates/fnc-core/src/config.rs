//! Client configuration.
//!
//! Values are layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. The first config file found (`./fnc.toml`, `<config_dir>/fnc/config.toml`,
//!    `/etc/fnc/config.toml`), or an explicit path
//! 3. `FNC_*` environment variables
//!
//! Command-line flags are applied on top by the binary. The loaded
//! `Config` is read-only to the session layer.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "FNC_";

/// File name searched for in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "fnc.toml";

// ============================================================================
// Output Format
// ============================================================================

/// How status and replies are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

// ============================================================================
// Config
// ============================================================================

/// Controller address, timing and output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Controller host name or IP address.
    pub host: String,

    /// HTTP port of the controller's web surface.
    pub http_port: u16,

    /// Port of the line-oriented duplex text channel.
    pub duplex_port: u16,

    /// Bound on connect and on every read/write, in milliseconds.
    pub timeout_ms: u64,

    /// Retry policy for callers that choose to retry.
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,

    pub output_format: OutputFormat,
    pub verbose: bool,

    /// Poller tick interval, in milliseconds.
    pub status_interval_ms: u64,

    /// Pause between job lines, in milliseconds.
    pub command_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            http_port: 80,
            duplex_port: 23,
            timeout_ms: 30_000,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            output_format: OutputFormat::Text,
            verbose: false,
            status_interval_ms: 1_000,
            command_delay_ms: 100,
        }
    }
}

impl Config {
    /// Loads configuration from file and environment.
    ///
    /// If `explicit` is given it must exist; otherwise the standard
    /// locations are searched and a missing file is not an error.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match search_paths().into_iter().find(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML config file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Applies `FNC_*` overrides using `lookup` to resolve variable names.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, value)) = var("HOST") {
            self.host = value;
        }
        if let Some((key, value)) = var("HTTP_PORT") {
            self.http_port = parse_env(&key, &value, "a port number")?;
        }
        if let Some((key, value)) = var("DUPLEX_PORT") {
            self.duplex_port = parse_env(&key, &value, "a port number")?;
        }
        if let Some((key, value)) = var("TIMEOUT_MS") {
            self.timeout_ms = parse_env(&key, &value, "milliseconds")?;
        }
        if let Some((key, value)) = var("RETRY_ATTEMPTS") {
            self.retry_attempts = parse_env(&key, &value, "an integer")?;
        }
        if let Some((key, value)) = var("RETRY_DELAY_MS") {
            self.retry_delay_ms = parse_env(&key, &value, "milliseconds")?;
        }
        if let Some((key, value)) = var("OUTPUT_FORMAT") {
            self.output_format = parse_env(&key, &value, "text or json")?;
        }
        if let Some((key, value)) = var("VERBOSE") {
            self.verbose = parse_env(&key, &value, "true or false")?;
        }
        if let Some((key, value)) = var("STATUS_INTERVAL_MS") {
            self.status_interval_ms = parse_env(&key, &value, "milliseconds")?;
        }
        if let Some((key, value)) = var("COMMAND_DELAY_MS") {
            self.command_delay_ms = parse_env(&key, &value, "milliseconds")?;
        }

        Ok(())
    }

    /// Rejects values the session layer cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "host".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.status_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "status_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// `host:duplex_port`, the duplex channel address.
    pub fn duplex_addr(&self) -> String {
        format!("{}:{}", self.host, self.duplex_port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }
}

/// Standard config file locations, in search order.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("fnc").join("config.toml"));
    }
    paths.push(PathBuf::from("/etc/fnc/config.toml"));
    paths
}

fn parse_env<T: FromStr>(key: &str, value: &str, expected: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    })
}
