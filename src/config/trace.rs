//! Trace pipeline configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use super::parse::EnvSource;
use super::ConfigError;

/// Collector used when neither JAEGER_ENDPOINT nor JAEGER_URL is set.
pub const DEFAULT_COLLECTOR_ENDPOINT: &str = "http://localhost:5775";

/// Trace exporter and batching configuration.
#[derive(Clone, Debug)]
pub struct TraceConfig {
    /// Collector URL (JAEGER_ENDPOINT, then JAEGER_URL).
    pub endpoint: String,
    pub service_name: String,
    /// Attached to every exported span (`service.name`, `env`, ...).
    pub resource_attributes: BTreeMap<String, String>,
    /// Spans per export (TRACE_BATCH_SIZE, default: 512).
    pub batch_size: usize,
    /// Queue bound; spans beyond it are dropped (TRACE_MAX_QUEUE_SIZE, default: 2048).
    pub max_queue_size: usize,
    /// Export period when batches do not fill up (TRACE_FLUSH_INTERVAL, default: 5s).
    pub flush_interval: Duration,
    /// Bound on one periodic export (TRACE_EXPORT_TIMEOUT, default: 10s).
    pub export_timeout: Duration,
    /// Bound on the final flush (TRACE_SHUTDOWN_TIMEOUT, default: 5s).
    pub shutdown_timeout: Duration,
    /// Bound on the startup collector connect (TRACE_CONNECT_TIMEOUT, default: 2s).
    pub connect_timeout: Duration,
}

impl TraceConfig {
    pub(crate) fn from_source(
        env: &EnvSource<'_>,
        service_name: &str,
        service_version: &str,
        environment: &str,
    ) -> Result<Self, ConfigError> {
        let endpoint = env
            .opt("JAEGER_ENDPOINT")
            .or_else(|| env.opt("JAEGER_URL"))
            .unwrap_or_else(|| DEFAULT_COLLECTOR_ENDPOINT.to_string());

        let mut resource_attributes = match env.opt("TRACE_RESOURCE_ATTRIBUTES") {
            Some(raw) => parse_attributes(&raw).map_err(|message| ConfigError::Invalid {
                key: "TRACE_RESOURCE_ATTRIBUTES".into(),
                message,
            })?,
            None => BTreeMap::new(),
        };
        resource_attributes.insert("service.name".into(), service_name.into());
        resource_attributes.insert("service.version".into(), service_version.into());
        resource_attributes.insert("env".into(), environment.into());

        let batch_size: usize = env.parse("TRACE_BATCH_SIZE", 512)?;
        let max_queue_size: usize = env.parse("TRACE_MAX_QUEUE_SIZE", 2048)?;
        if batch_size == 0 || max_queue_size == 0 {
            return Err(ConfigError::Invalid {
                key: "TRACE_BATCH_SIZE".into(),
                message: "batch and queue sizes must be positive".into(),
            });
        }
        if batch_size > max_queue_size {
            return Err(ConfigError::Invalid {
                key: "TRACE_BATCH_SIZE".into(),
                message: format!(
                    "batch size {} exceeds queue size {}",
                    batch_size, max_queue_size
                ),
            });
        }

        Ok(Self {
            endpoint,
            service_name: service_name.to_string(),
            resource_attributes,
            batch_size,
            max_queue_size,
            flush_interval: env.required_duration("TRACE_FLUSH_INTERVAL", "5s")?,
            export_timeout: env.required_duration("TRACE_EXPORT_TIMEOUT", "10s")?,
            shutdown_timeout: env.required_duration("TRACE_SHUTDOWN_TIMEOUT", "5s")?,
            connect_timeout: env.required_duration("TRACE_CONNECT_TIMEOUT", "2s")?,
        })
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_COLLECTOR_ENDPOINT.to_string(),
            service_name: "service-a".to_string(),
            resource_attributes: BTreeMap::new(),
            batch_size: 512,
            max_queue_size: 2048,
            flush_interval: Duration::from_secs(5),
            export_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

/// Parse `k=v,k2=v2`.
fn parse_attributes(raw: &str) -> Result<BTreeMap<String, String>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{}'", pair))?;
            let k = k.trim();
            if k.is_empty() {
                return Err(format!("empty key in '{}'", pair));
            }
            Ok((k.to_string(), v.trim().to_string()))
        })
        .collect()
}
