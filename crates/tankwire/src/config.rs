//! Client configuration.
//!
//! Built in code with [`ClientConfig::builder`] or read from a
//! `.properties` file with [`ClientConfig::load`]:
//!
//! ```text
//! # application.properties
//! server.host=game.example.com
//! server.port=8888
//! protocol.version=1
//! request.timeout.ms=5000
//! ```
//!
//! Keys that are absent keep their defaults; unknown keys are ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors from loading a [`ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A known key had a value that doesn't fit.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Where to connect and how long to wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Written into the version byte of every outbound frame.
    pub protocol_version: u8,
    /// Default timeout for [`GameClient::send_and_await`](crate::GameClient::send_and_await).
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Outbound frames that may wait for the socket before sends fail.
    pub outbound_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8888,
            protocol_version: 1,
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            outbound_capacity: 1024,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// `host:port`, as handed to the connection.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reads a properties file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_properties(&text)?;
        tracing::debug!(path = %path.display(), addr = %config.addr(), "configuration loaded");
        Ok(config)
    }

    /// Parses properties text on top of the defaults.
    ///
    /// One `key=value` (or `key: value`) per line; lines starting with
    /// `#` or `!` are comments.
    pub fn from_properties(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (key, value) in properties(text) {
            match key {
                "server.host" => {
                    if value.is_empty() {
                        return Err(invalid(key, value, "host must not be empty"));
                    }
                    config.host = value.to_string();
                }
                "server.port" => {
                    config.port = parse_nonzero(key, value)?;
                }
                "protocol.version" => {
                    config.protocol_version = parse_number(key, value)?;
                }
                "request.timeout.ms" => {
                    config.request_timeout = Duration::from_millis(parse_nonzero(key, value)?);
                }
                "connect.timeout.ms" => {
                    config.connect_timeout = Duration::from_millis(parse_nonzero(key, value)?);
                }
                "outbound.capacity" => {
                    config.outbound_capacity = parse_nonzero(key, value)?;
                }
                other => tracing::trace!(key = other, "ignoring unknown configuration key"),
            }
        }
        Ok(config)
    }
}

/// Yields trimmed `(key, value)` pairs, skipping blanks and comments.
fn properties(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            return None;
        }
        match line.find(['=', ':']) {
            Some(at) => Some((line[..at].trim(), line[at + 1..].trim())),
            None => Some((line, "")),
        }
    })
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| invalid(key, value, &e.to_string()))
}

fn parse_nonzero<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let parsed: T = parse_number(key, value)?;
    if parsed == T::default() {
        return Err(invalid(key, value, "must be greater than zero"));
    }
    Ok(parsed)
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// ClientConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent construction of a [`ClientConfig`].
///
/// ```rust
/// use std::time::Duration;
/// use tankwire::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .host("127.0.0.1")
///     .port(9000)
///     .request_timeout(Duration::from_secs(2))
///     .build();
/// assert_eq!(config.addr(), "127.0.0.1:9000");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn protocol_version(mut self, version: u8) -> Self {
        self.config.protocol_version = version;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Clamped to at least one frame.
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_stock_client() {
        let config = ClientConfig::default();
        assert_eq!(config.addr(), "localhost:8888");
        assert_eq!(config.protocol_version, 1);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.outbound_capacity, 1024);
    }

    #[test]
    fn test_properties_override_defaults() {
        let text = "\
# game server
server.host = 10.0.0.5
server.port=9001
! legacy comment style
protocol.version: 2
request.timeout.ms=2500
outbound.capacity=64
";
        let config = ClientConfig::from_properties(text).unwrap();

        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 9001);
        assert_eq!(config.protocol_version, 2);
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.outbound_capacity, 64);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_keys_and_blank_lines_are_ignored() {
        let text = "\n\nui.theme=dark\n   \nserver.port=7000\n";
        let config = ClientConfig::from_properties(text).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.host, "localhost");
    }

    #[test]
    fn test_non_numeric_port_is_invalid() {
        let err = ClientConfig::from_properties("server.port=eighty").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value, .. } => {
                assert_eq!(key, "server.port");
                assert_eq!(value, "eighty");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_values_are_invalid() {
        assert!(ClientConfig::from_properties("server.port=70000").is_err());
        assert!(ClientConfig::from_properties("protocol.version=256").is_err());
        assert!(ClientConfig::from_properties("request.timeout.ms=0").is_err());
        assert!(ClientConfig::from_properties("outbound.capacity=0").is_err());
        assert!(ClientConfig::from_properties("server.host=").is_err());
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = ClientConfig::load("/definitely/not/here.properties").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.properties"));
    }

    #[test]
    fn test_load_reads_file() {
        let path = std::env::temp_dir().join(format!(
            "tankwire-config-{}.properties",
            std::process::id()
        ));
        std::fs::write(&path, "server.host=arena.local\nserver.port=8890\n").unwrap();

        let config = ClientConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.addr(), "arena.local:8890");
    }

    #[test]
    fn test_builder_clamps_capacity() {
        let config = ClientConfig::builder().outbound_capacity(0).build();
        assert_eq!(config.outbound_capacity, 1);
    }
}
