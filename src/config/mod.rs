//! Configuration module for microsvc.
//!
//! All settings come from environment variables and are read once at startup.
//!
//! # Example
//!
//! ```rust,ignore
//! use microsvc::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Listen address: {}", config.server.listen_addr);
//! println!("Collector: {}", config.trace.endpoint);
//! ```

mod error;
mod logging;
mod parse;
mod server;
mod trace;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use parse::{parse_duration, EnvSource};
pub use server::{RequestTimeout, ServerConfig};
pub use trace::{TraceConfig, DEFAULT_COLLECTOR_ENDPOINT};

/// Identity of the running service.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// SERVICE_NAME (default: service-a).
    pub name: String,
    /// SERVICE_VERSION (default: crate version).
    pub version: String,
    /// SERVICE_ENV (default: production).
    pub environment: String,
}

impl ServiceConfig {
    /// Port a service listens on when PORT is unset.
    pub fn default_port(&self) -> u16 {
        match self.name.as_str() {
            "service-b" => 3002,
            _ => 3001,
        }
    }
}

/// Path label cardinality settings.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Distinct path labels kept before falling back to `__overflow__`
    /// (METRICS_MAX_PATHS, default: 1000).
    pub max_paths: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { max_paths: 1000 }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub trace: TraceConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        Self::from_source(&EnvSource::new(&lookup))
    }

    /// Load configuration from an arbitrary key/value source.
    pub fn from_source(env: &EnvSource<'_>) -> Result<Self, ConfigError> {
        let service = ServiceConfig {
            name: env.or("SERVICE_NAME", "service-a"),
            version: env.or("SERVICE_VERSION", env!("CARGO_PKG_VERSION")),
            environment: env.or("SERVICE_ENV", "production"),
        };

        let server = ServerConfig::from_source(env, service.default_port())?;
        let trace =
            TraceConfig::from_source(env, &service.name, &service.version, &service.environment)?;
        let metrics = MetricsConfig {
            max_paths: env.parse("METRICS_MAX_PATHS", 1000)?,
        };

        Ok(Self {
            service,
            server,
            trace,
            metrics,
            logging: LoggingConfig::from_source(env),
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        info!("Configuration loaded:");
        info!("  Service: {} {} ({})", self.service.name, self.service.version, self.service.environment);
        info!("  Listen: {}", self.server.listen_addr);
        info!("  Collector: {}", self.trace.endpoint);
        info!(
            "  Trace batching: {} spans / {:?}, queue {}",
            self.trace.batch_size, self.trace.flush_interval, self.trace.max_queue_size
        );

        match self.server.request_timeout.as_duration() {
            Some(timeout) => info!("  Request timeout: {:?}", timeout),
            None => info!("  Request timeout: disabled"),
        }

        if self.server.access_log {
            info!("  Access log: enabled");
        }
    }
}
