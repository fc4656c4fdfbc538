//! Server configuration.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use super::parse::{parse_duration, EnvSource};
use super::ConfigError;

/// Handler timeout; `None` disables it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestTimeout(pub Option<Duration>);

impl RequestTimeout {
    /// Parse duration string (e.g., "30s", "2m", "off").
    pub fn parse(s: &str) -> Result<Self, String> {
        parse_duration(s).map(Self)
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    #[inline]
    pub fn as_duration(&self) -> Option<Duration> {
        self.0
    }
}

impl Default for RequestTimeout {
    fn default() -> Self {
        Self(Some(Duration::from_secs(10)))
    }
}

/// Server configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address (LISTEN_HOST + PORT).
    pub listen_addr: SocketAddr,
    /// Handler timeout (REQUEST_TIMEOUT, default: 10s).
    pub request_timeout: RequestTimeout,
    /// HTTP/1 header read timeout (HEADER_READ_TIMEOUT, default: 5s).
    pub header_read_timeout: Duration,
    /// Graceful shutdown drain timeout (DRAIN_TIMEOUT, default: 15s).
    pub drain_timeout: Duration,
    /// Largest accepted request body in bytes.
    pub max_body_size: usize,
    /// Access logging enabled (ACCESS_LOG, default: on).
    pub access_log: bool,
}

impl ServerConfig {
    /// Load configuration. `default_port` depends on the service identity.
    pub(crate) fn from_source(env: &EnvSource<'_>, default_port: u16) -> Result<Self, ConfigError> {
        let host: IpAddr = env.parse("LISTEN_HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port: u16 = env.parse("PORT", default_port)?;

        let timeout_value = env.or("REQUEST_TIMEOUT", "10s");
        let request_timeout =
            RequestTimeout::parse(&timeout_value).map_err(|error| ConfigError::Parse {
                key: "REQUEST_TIMEOUT".into(),
                value: timeout_value,
                error,
            })?;

        Ok(Self {
            listen_addr: SocketAddr::new(host, port),
            request_timeout,
            header_read_timeout: env.required_duration("HEADER_READ_TIMEOUT", "5s")?,
            drain_timeout: env.required_duration("DRAIN_TIMEOUT", "15s")?,
            max_body_size: env.parse("MAX_BODY_SIZE", 1024 * 1024)?,
            access_log: env.bool("ACCESS_LOG", true),
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            request_timeout: RequestTimeout::default(),
            header_read_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(15),
            max_body_size: 1024 * 1024,
            access_log: true,
        }
    }
}
