//! Exporter configuration
//!
//! Sources, later ones winning:
//! 1. Built-in defaults
//! 2. TOML file named by `NETFLOW_CONFIG` (optional)
//! 3. `NETFLOW_*` environment variables
//!
//! ## Environment
//! - `NETFLOW_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//! - `NETFLOW_LOG_FORMAT`: text or json (default: text)
//! - `NETFLOW_LISTEN_ADDRESS`: UDP flow listen address (default: :2055)
//! - `NETFLOW_METRIC_ADDRESS`: HTTP listen address (default: :9438)
//! - `NETFLOW_METRIC_PATH`: scrape path (default: /metrics)
//! - `NETFLOW_INCLUDE`: regex selecting fields exported as metrics (default: Count$)
//! - `NETFLOW_EXCLUDE`: regex selecting fields to drop (default: Time)
//! - `NETFLOW_SAMPLE_EXPIRE`: sample TTL, humantime syntax (default: 5m)
//! - `NETFLOW_SWEEP_INTERVAL`: expiry sweep period (default: 60s)
//! - `NETFLOW_INGEST_QUEUE_CAPACITY`: ingest queue bound (default: 1024)
//! - `NETFLOW_BACKPRESSURE`: block or drop (default: block)

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::metrics::FieldClassifier;
use crate::production::BackpressurePolicy;

pub const CONFIG_PATH_ENV: &str = "NETFLOW_CONFIG";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(String),
    InvalidValue { key: &'static str, value: String, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse(msg) => write!(f, "Invalid config file: {}", msg),
            ConfigError::InvalidValue { key, value, reason } => {
                write!(f, "Invalid {} '{}': {}", key, value, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExporterConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// UDP address flow exporters send to
    pub listen_address: String,
    /// HTTP address Prometheus scrapes
    pub metric_address: String,
    pub metric_path: String,
    /// Fields whose name matches become metrics
    pub include: String,
    /// Fields whose name matches are dropped; empty disables
    pub exclude: String,
    /// Samples older than this are neither exported nor kept
    #[serde(with = "humantime_duration")]
    pub sample_expire: Duration,
    #[serde(with = "humantime_duration")]
    pub sweep_interval: Duration,
    pub ingest_queue_capacity: usize,
    pub backpressure: BackpressurePolicy,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        ExporterConfig {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            listen_address: ":2055".to_string(),
            metric_address: ":9438".to_string(),
            metric_path: "/metrics".to_string(),
            include: "Count$".to_string(),
            exclude: "Time".to_string(),
            sample_expire: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
            ingest_queue_capacity: 1024,
            backpressure: BackpressurePolicy::Block,
        }
    }
}

impl ExporterConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Override fields from `NETFLOW_*` variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NETFLOW_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("NETFLOW_LOG_FORMAT") {
            self.log_format = parse_value("log_format", &v)?;
        }
        if let Some(v) = lookup("NETFLOW_LISTEN_ADDRESS") {
            self.listen_address = v;
        }
        if let Some(v) = lookup("NETFLOW_METRIC_ADDRESS") {
            self.metric_address = v;
        }
        if let Some(v) = lookup("NETFLOW_METRIC_PATH") {
            self.metric_path = v;
        }
        if let Some(v) = lookup("NETFLOW_INCLUDE") {
            self.include = v;
        }
        if let Some(v) = lookup("NETFLOW_EXCLUDE") {
            self.exclude = v;
        }
        if let Some(v) = lookup("NETFLOW_SAMPLE_EXPIRE") {
            self.sample_expire = parse_duration("sample_expire", &v)?;
        }
        if let Some(v) = lookup("NETFLOW_SWEEP_INTERVAL") {
            self.sweep_interval = parse_duration("sweep_interval", &v)?;
        }
        if let Some(v) = lookup("NETFLOW_INGEST_QUEUE_CAPACITY") {
            self.ingest_queue_capacity = parse_value("ingest_queue_capacity", &v)?;
        }
        if let Some(v) = lookup("NETFLOW_BACKPRESSURE") {
            self.backpressure = parse_value("backpressure", &v)?;
        }
        Ok(())
    }

    /// Check every field, returning the compiled field classifier
    pub fn validate(&self) -> Result<FieldClassifier, ConfigError> {
        if self.sample_expire.is_zero() {
            return Err(invalid("sample_expire", "0s", "must be greater than zero"));
        }
        if self.sweep_interval.is_zero() {
            return Err(invalid("sweep_interval", "0s", "must be greater than zero"));
        }
        if self.ingest_queue_capacity == 0 {
            return Err(invalid("ingest_queue_capacity", "0", "must be greater than zero"));
        }
        if !self.metric_path.starts_with('/') {
            return Err(invalid("metric_path", &self.metric_path, "must start with '/'"));
        }
        self.listen_socket_addr()?;
        self.metric_socket_addr()?;
        FieldClassifier::new(&self.include, &self.exclude).map_err(|e| {
            // Include is compiled first, so a shared bad pattern reports as include
            let key = if e.pattern == self.include { "include" } else { "exclude" };
            invalid(key, &e.pattern, &e.reason)
        })
    }

    pub fn listen_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        resolve_bind_addr("listen_address", &self.listen_address)
    }

    pub fn metric_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        resolve_bind_addr("metric_address", &self.metric_address)
    }
}

/// Resolve `host:port`, treating a bare `:port` as all IPv4 interfaces
pub fn resolve_bind_addr(key: &'static str, addr: &str) -> Result<SocketAddr, ConfigError> {
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    full.to_socket_addrs()
        .map_err(|e| invalid(key, addr, &e.to_string()))?
        .next()
        .ok_or_else(|| invalid(key, addr, "resolved to no address"))
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, value, &e.to_string()))
}

fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| invalid(key, value, &e.to_string()))
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ExporterConfig::load_with(env(&[])).unwrap();
        assert_eq!(config, ExporterConfig::default());
        assert_eq!(config.sample_expire, Duration::from_secs(300));
        assert_eq!(config.listen_socket_addr().unwrap(), "0.0.0.0:2055".parse().unwrap());
        assert_eq!(config.metric_socket_addr().unwrap(), "0.0.0.0:9438".parse().unwrap());
    }

    #[test]
    fn test_env_overrides() {
        let config = ExporterConfig::load_with(env(&[
            ("NETFLOW_LOG_FORMAT", "json"),
            ("NETFLOW_LISTEN_ADDRESS", "127.0.0.1:9995"),
            ("NETFLOW_SAMPLE_EXPIRE", "90s"),
            ("NETFLOW_INGEST_QUEUE_CAPACITY", "16"),
            ("NETFLOW_BACKPRESSURE", "drop"),
            ("NETFLOW_EXCLUDE", ""),
        ]))
        .unwrap();

        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.listen_address, "127.0.0.1:9995");
        assert_eq!(config.sample_expire, Duration::from_secs(90));
        assert_eq!(config.ingest_queue_capacity, 16);
        assert_eq!(config.backpressure, BackpressurePolicy::Drop);
        assert!(config.exclude.is_empty());
    }

    #[test]
    fn test_toml_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
metric_path = "/flows"
include = "Count$|Bytes$"
sample_expire = "2m"
sweep_interval = "10s"
backpressure = "drop"
"#
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = ExporterConfig::load_with(env(&[
            (CONFIG_PATH_ENV, path.as_str()),
            ("NETFLOW_SWEEP_INTERVAL", "5s"),
        ]))
        .unwrap();

        assert_eq!(config.metric_path, "/flows");
        assert_eq!(config.include, "Count$|Bytes$");
        assert_eq!(config.sample_expire, Duration::from_secs(120));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.backpressure, BackpressurePolicy::Drop);
        assert_eq!(config.exclude, "Time");
    }

    #[test]
    fn test_missing_file() {
        let err = ExporterConfig::load_with(env(&[(CONFIG_PATH_ENV, "/nonexistent/netflow.toml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_unknown_toml_key() {
        let err = ExporterConfig::from_toml_str("listen = \":2055\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases: &[(&str, &str, &str)] = &[
            ("NETFLOW_SAMPLE_EXPIRE", "0s", "sample_expire"),
            ("NETFLOW_SAMPLE_EXPIRE", "soon", "sample_expire"),
            ("NETFLOW_SWEEP_INTERVAL", "0s", "sweep_interval"),
            ("NETFLOW_INGEST_QUEUE_CAPACITY", "0", "ingest_queue_capacity"),
            ("NETFLOW_INGEST_QUEUE_CAPACITY", "-1", "ingest_queue_capacity"),
            ("NETFLOW_METRIC_PATH", "metrics", "metric_path"),
            ("NETFLOW_INCLUDE", "Count(", "include"),
            ("NETFLOW_EXCLUDE", "[", "exclude"),
            ("NETFLOW_LISTEN_ADDRESS", "not-an-address", "listen_address"),
            ("NETFLOW_BACKPRESSURE", "spill", "backpressure"),
            ("NETFLOW_LOG_FORMAT", "xml", "log_format"),
        ];

        for (var, value, expected_key) in cases {
            match ExporterConfig::load_with(env(&[(*var, *value)])) {
                Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, *expected_key),
                other => panic!("{}={} should be rejected, got {:?}", var, value, other),
            }
        }
    }

    #[test]
    fn test_validate_returns_configured_classifier() {
        use crate::flow::{Field, FieldValue, FlowRecord};
        use std::net::{IpAddr, Ipv4Addr};

        let config = ExporterConfig {
            include: "Bytes$".to_string(),
            exclude: "^drop".to_string(),
            ..ExporterConfig::default()
        };
        let classifier = config.validate().unwrap();

        let record = FlowRecord::new(
            5,
            None,
            vec![
                Field::new("inBytes", FieldValue::Unsigned(900)),
                Field::new("dropBytes", FieldValue::Unsigned(1)),
                Field::new("packetDeltaCount", FieldValue::Unsigned(3)),
            ],
        );
        let sample = classifier
            .classify(&record, IpAddr::V4(Ipv4Addr::LOCALHOST), 7)
            .unwrap();
        assert_eq!(sample.counts.len(), 1);
        assert_eq!(sample.counts["inBytes"], 900.0);
        assert_eq!(sample.labels.get("packetDeltaCount"), Some("3"));
        assert_eq!(sample.labels.get("dropBytes"), None);
    }

    #[test]
    fn test_bad_pattern_names_its_key() {
        let config = ExporterConfig {
            exclude: "(".to_string(),
            ..ExporterConfig::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidValue { key, value, .. }) => {
                assert_eq!(key, "exclude");
                assert_eq!(value, "(");
            }
            other => panic!("bad exclude should be rejected, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_resolve_bind_addr() {
        assert_eq!(
            resolve_bind_addr("listen_address", ":0").unwrap(),
            "0.0.0.0:0".parse().unwrap()
        );
        assert_eq!(
            resolve_bind_addr("listen_address", "[::1]:2055").unwrap(),
            "[::1]:2055".parse().unwrap()
        );
    }
}
