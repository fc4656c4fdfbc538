//! Error types of the observability layer.

use std::any::Any;
use std::time::Duration;

use thiserror::Error;

/// Startup failure of the trace pipeline. Fatal: the process must not serve.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Collector endpoint is malformed.
    #[error("invalid collector endpoint '{endpoint}': {reason}")]
    Configuration { endpoint: String, reason: String },
    /// Exporter could not be constructed (collector unreachable).
    #[error("cannot initialize exporter for '{endpoint}': {reason}")]
    ExportInit { endpoint: String, reason: String },
}

/// Flush-on-shutdown failure. Reported, never fatal.
#[derive(Debug, Error)]
pub enum ExportFlushError {
    #[error("span flush did not finish within {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("final span export failed: {0}")]
    Export(#[source] opentelemetry::trace::TraceError),
    #[error("span flush task terminated abnormally: {0}")]
    Worker(String),
}

/// Abnormal termination of a wrapped handler.
#[derive(Debug, Clone, Error)]
#[error("handler panicked: {message}")]
pub struct HandlerPanic {
    pub message: String,
}

impl HandlerPanic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build from a `catch_unwind` payload.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self { message }
    }
}
