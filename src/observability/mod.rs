//! Request observability: Prometheus metrics, trace spans, and the
//! interceptor that ties both to every request.
//!
//! # Usage
//!
//! ```rust,ignore
//! use microsvc::observability::{MetricsRecorder, RequestInterceptor, TracerProvider};
//!
//! let provider = TracerProvider::initialize(&config.trace).await?;
//! let metrics = Arc::new(MetricsRecorder::with_config(&config.metrics)?);
//! let interceptor = RequestInterceptor::new(provider.tracer(), metrics.clone());
//!
//! // ... serve requests through interceptor.intercept(route, req, &handler) ...
//!
//! provider.shutdown().await?;
//! ```

mod error;
mod exporter;
mod interceptor;
mod metrics;
mod span;
mod tracer;

pub use error::{ExportFlushError, HandlerPanic, TraceError};
pub use exporter::{CollectorEndpoint, DEFAULT_SPANS_PATH};
pub use interceptor::{RequestInterceptor, CLIENT_CLOSED_REQUEST, UNMATCHED_ROUTE};
pub use metrics::{
    InFlightGuard, MetricSample, MetricsRecorder, DEFAULT_LATENCY_BUCKETS,
    EXPOSITION_CONTENT_TYPE, OVERFLOW_PATH,
};
pub use opentelemetry::trace::SpanKind;
pub use opentelemetry_sdk::export::trace::{SpanData, SpanExporter};
pub use span::{Span, DROPPED_SPAN_ERROR};
pub use tracer::{Tracer, TracerProvider};
