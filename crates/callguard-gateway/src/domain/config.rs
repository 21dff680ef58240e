//! Gateway configuration with validation.
//!
//! Loaded from a TOML file named by `CALLGUARD_CONFIG` (all sections
//! optional), then overridden from the environment:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `CALLGUARD_HOST` | `server.host` |
//! | `CALLGUARD_PORT` | `server.port` |
//! | `CALLGUARD_ACL` | `acl.inline` |
//! | `CALLGUARD_ACL_FILE` | `acl.file` |

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_VAR: &str = "CALLGUARD_CONFIG";

/// Main gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration
    pub server: ServerConfig,
    /// Event and stat stream configuration
    pub streams: StreamsConfig,
    /// Graceful shutdown configuration
    pub shutdown: ShutdownConfig,
    /// Access policy source
    pub acl: AclConfig,
}

impl GatewayConfig {
    /// Load configuration from `CALLGUARD_CONFIG` and environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment overrides on top of the current values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CALLGUARD_HOST") {
            self.server.host = host.parse().map_err(|_| ConfigError::Override {
                var: "CALLGUARD_HOST",
                value: host,
            })?;
        }
        if let Some(port) = lookup("CALLGUARD_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::Override {
                var: "CALLGUARD_PORT",
                value: port,
            })?;
        }
        if let Some(acl) = lookup("CALLGUARD_ACL") {
            self.acl.inline = Some(acl);
            self.acl.file = None;
        }
        if let Some(file) = lookup("CALLGUARD_ACL_FILE") {
            self.acl.file = Some(PathBuf::from(file));
            self.acl.inline = None;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_request_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_request_size cannot be 0".into(),
            ));
        }

        if self.streams.delivery_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "delivery_capacity cannot be 0".into(),
            ));
        }

        if self.streams.max_stat_window_secs == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_stat_window_secs cannot be 0".into(),
            ));
        }

        if self.shutdown.grace_period.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "grace_period cannot be 0".into(),
            ));
        }

        if self.acl.inline.is_some() && self.acl.file.is_some() {
            return Err(ConfigError::Invalid(
                "acl.inline and acl.file are mutually exclusive".into(),
            ));
        }

        Ok(())
    }

    /// Get server bind address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8082)
    pub port: u16,
    /// Max request body size in bytes (default: 1MB)
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8082,
            max_request_size: 1024 * 1024,
        }
    }
}

/// Event and stat stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    /// Items each subscriber endpoint holds before publishers wait
    pub delivery_capacity: usize,
    /// Longest accepted stat window, in seconds
    pub max_stat_window_secs: u64,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            delivery_capacity: shared_bus::DEFAULT_DELIVERY_CAPACITY,
            max_stat_window_secs: 3600,
        }
    }
}

/// Graceful shutdown configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long open connections may take to finish after shutdown starts
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
        }
    }
}

/// Access policy source. With neither set, every caller is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    /// Policy JSON given inline
    pub inline: Option<String>,
    /// Path to a policy JSON file
    pub file: Option<PathBuf>,
}

impl AclConfig {
    /// Read the policy JSON from whichever source is configured.
    pub fn policy_json(&self) -> Result<Option<String>, ConfigError> {
        if let Some(inline) = &self.inline {
            return Ok(Some(inline.clone()));
        }

        match &self.file {
            Some(path) => fs::read_to_string(path)
                .map(Some)
                .map_err(|e| ConfigError::Io {
                    path: path.clone(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A configuration file could not be read
    #[error("cannot read {}: {}", .path.display(), .reason)]
    Io { path: PathBuf, reason: String },
    /// The configuration file is not valid TOML for this schema
    #[error("invalid configuration file: {0}")]
    Parse(String),
    /// An environment override did not parse
    #[error("invalid value for {var}: '{value}'")]
    Override { var: &'static str, value: String },
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration (de)serialization as `"10s"`, `"500ms"`, `"2m"` or plain seconds.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            scaled_secs(mins, 60, "invalid minutes")
        } else if let Some(hours) = s.strip_suffix('h') {
            scaled_secs(hours, 3600, "invalid hours")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }

    fn scaled_secs(value: &str, unit: u64, invalid: &'static str) -> Result<Duration, &'static str> {
        let count = value.trim().parse::<u64>().map_err(|_| invalid)?;
        count
            .checked_mul(unit)
            .map(Duration::from_secs)
            .ok_or("duration out of range")
    }
}
