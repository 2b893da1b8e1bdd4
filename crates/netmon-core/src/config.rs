//! netmon.toml configuration parser.
//!
//! [`FileConfig`] is the raw, all-optional view of the file (and of any
//! command-line overrides layered on top of it). [`FileConfig::into_config`]
//! applies defaults, parses durations and validates the result into a
//! [`MonitorConfig`].

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MEMBERSHIP_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_PROBE_COUNT: u32 = 1;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_PROBE_PACKET_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:1024";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_NAMESPACE: &str = "network_monitor";
/// Upper bound on echo packets per target per cycle; sequence numbers are 16 bit.
pub const MAX_PROBE_COUNT: u32 = 1024;
/// Prefix owned by the JSON API; the metrics path may not live under it.
pub const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub self_node_name: Option<String>,
    pub interval: Option<String>,
    pub discovery_interval: Option<String>,
    pub membership_timeout: Option<String>,
    pub probe_count: Option<u32>,
    pub probe_timeout: Option<String>,
    pub probe_packet_interval: Option<String>,
    pub listen_addr: Option<String>,
    pub metrics_path: Option<String>,
    pub namespace: Option<String>,
}

/// Fully resolved agent configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Name of the node this agent runs on; used as the `source` label
    /// and excluded from the peer set.
    pub self_node_name: String,
    /// Pause between probe cycles.
    pub interval: Duration,
    /// Pause between membership refreshes.
    pub discovery_interval: Duration,
    /// Bound on a single membership query.
    pub membership_timeout: Duration,
    /// Echo packets per probe.
    pub probe_count: u32,
    /// Reply timeout per echo packet.
    pub probe_timeout: Duration,
    /// Gap between packets of a multi-packet probe.
    pub probe_packet_interval: Duration,
    pub listen_addr: SocketAddr,
    pub metrics_path: String,
    /// Prefix for every exported metric name.
    pub namespace: String,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Apply defaults and validate.
    pub fn into_config(self) -> ConfigResult<MonitorConfig> {
        let self_node_name = self
            .self_node_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSelfNodeName)?;

        let listen_addr = self.listen_addr.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR);
        let listen_addr: SocketAddr = listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(listen_addr.to_string()))?;

        let config = MonitorConfig {
            self_node_name,
            interval: duration_field("interval", self.interval, DEFAULT_INTERVAL)?,
            discovery_interval: duration_field(
                "discovery_interval",
                self.discovery_interval,
                DEFAULT_DISCOVERY_INTERVAL,
            )?,
            membership_timeout: duration_field(
                "membership_timeout",
                self.membership_timeout,
                DEFAULT_MEMBERSHIP_TIMEOUT,
            )?,
            probe_count: self.probe_count.unwrap_or(DEFAULT_PROBE_COUNT),
            probe_timeout: duration_field(
                "probe_timeout",
                self.probe_timeout,
                DEFAULT_PROBE_TIMEOUT,
            )?,
            probe_packet_interval: duration_field(
                "probe_packet_interval",
                self.probe_packet_interval,
                DEFAULT_PROBE_PACKET_INTERVAL,
            )?,
            listen_addr,
            metrics_path: self
                .metrics_path
                .unwrap_or_else(|| DEFAULT_METRICS_PATH.to_string()),
            namespace: self
                .namespace
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        };

        config.validate()?;
        Ok(config)
    }
}

impl MonitorConfig {
    /// A config with every optional setting at its default.
    pub fn new(self_node_name: impl Into<String>) -> ConfigResult<Self> {
        FileConfig {
            self_node_name: Some(self_node_name.into()),
            ..FileConfig::default()
        }
        .into_config()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.self_node_name.is_empty() {
            return Err(ConfigError::MissingSelfNodeName);
        }
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("interval must be non-zero".into()));
        }
        if self.discovery_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "discovery_interval must be non-zero".into(),
            ));
        }
        if self.probe_count == 0 {
            return Err(ConfigError::Invalid("probe_count must be at least 1".into()));
        }
        if self.probe_count > MAX_PROBE_COUNT {
            return Err(ConfigError::Invalid(format!(
                "probe_count must be at most {MAX_PROBE_COUNT}"
            )));
        }
        if self.probe_timeout.is_zero() {
            return Err(ConfigError::Invalid("probe_timeout must be non-zero".into()));
        }
        validate_metrics_path(&self.metrics_path)?;
        if !is_valid_namespace(&self.namespace) {
            return Err(ConfigError::Invalid(format!(
                "namespace is not a valid metric name prefix: {}",
                self.namespace
            )));
        }
        Ok(())
    }
}

/// A static route path: leading '/', no route parameters or wildcards,
/// and not shadowing the JSON API.
fn validate_metrics_path(path: &str) -> ConfigResult<()> {
    if !path.starts_with('/') {
        return Err(ConfigError::Invalid(format!(
            "metrics_path must start with '/': {path}"
        )));
    }
    if path.contains(['{', '}', '*', ':']) {
        return Err(ConfigError::Invalid(format!(
            "metrics_path must be a static path: {path}"
        )));
    }
    let under_api = path
        .strip_prefix(API_PREFIX)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
    if under_api {
        return Err(ConfigError::Invalid(format!(
            "metrics_path must not be under {API_PREFIX}: {path}"
        )));
    }
    Ok(())
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`, or empty for unprefixed metric names.
fn is_valid_namespace(namespace: &str) -> bool {
    let mut chars = namespace.chars();
    match chars.next() {
        None => true,
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == ':' => chars
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':'),
        Some(_) => false,
    }
}

fn duration_field(
    field: &'static str,
    value: Option<String>,
    default: Duration,
) -> ConfigResult<Duration> {
    match value {
        None => Ok(default),
        Some(v) => parse_duration(&v).ok_or(ConfigError::InvalidDuration { field, value: v }),
    }
}
