//! Tracer and the process-owned trace pipeline.
//!
//! [`TracerProvider`] wraps an `opentelemetry_sdk` provider with a batch span
//! processor. It is built once in `main` and never registered as the global
//! provider: request code gets cheap [`Tracer`] clones, and
//! [`TracerProvider::shutdown`] consumes it after flushing every queued span.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::export::trace::SpanExporter;
use opentelemetry_sdk::trace::{self as sdktrace, BatchConfigBuilder, BatchSpanProcessor};
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use tracing::{debug, info};

use super::error::{ExportFlushError, TraceError};
use super::exporter::{self, CollectorEndpoint};
use super::span::Span;
use crate::config::TraceConfig;

/// Instrumentation scope name of every span.
const SCOPE_NAME: &str = "microsvc";

/// Creates spans for one service. Cheap to clone.
#[derive(Clone)]
pub struct Tracer {
    inner: sdktrace::Tracer,
    service_name: Arc<str>,
}

impl Tracer {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Start an internal span below the span active in `parent`, or a new
    /// root when there is none.
    pub fn start_span(&self, parent: Option<&Context>, name: impl Into<Cow<'static, str>>) -> Span {
        self.start_span_with_kind(parent, name, SpanKind::Internal, Vec::new())
    }

    pub fn start_span_with_kind(
        &self,
        parent: Option<&Context>,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
    ) -> Span {
        let parent = parent.cloned().unwrap_or_else(Context::new);
        let span = self
            .inner
            .span_builder(name)
            .with_kind(kind)
            .with_attributes(attributes)
            .start_with_context(&self.inner, &parent);
        Span::new(parent.with_span(span))
    }

    /// Same as [`Span::end`].
    pub fn end_span(&self, span: Span) {
        span.end();
    }
}

/// Process-owned trace pipeline: exporter, span queue, export worker.
pub struct TracerProvider {
    inner: sdktrace::TracerProvider,
    tracer: Tracer,
    shutdown_timeout: Duration,
}

impl TracerProvider {
    /// Validate the collector endpoint, check it accepts connections and start the
    /// batch export pipeline. Must be called from within a Tokio runtime.
    pub async fn initialize(config: &TraceConfig) -> Result<Self, TraceError> {
        let endpoint = CollectorEndpoint::parse(&config.endpoint)?;
        exporter::check_reachable(&endpoint, config.connect_timeout).await?;
        let exporter = exporter::build(&endpoint, config)?;

        info!(
            endpoint = %endpoint,
            service = %config.service_name,
            "Trace exporter initialized"
        );
        Ok(Self::with_exporter(config, exporter))
    }

    /// Start the batch pipeline with a caller-provided exporter.
    ///
    /// The export worker runs on its own thread, so the blocking flush in
    /// [`TracerProvider::shutdown`] never waits on a request worker.
    pub fn with_exporter<E>(config: &TraceConfig, exporter: E) -> Self
    where
        E: SpanExporter + 'static,
    {
        let batch_config = BatchConfigBuilder::default()
            .with_max_queue_size(config.max_queue_size)
            .with_max_export_batch_size(config.batch_size)
            .with_scheduled_delay(config.flush_interval)
            .with_max_export_timeout(config.export_timeout)
            .build();
        let processor = BatchSpanProcessor::builder(exporter, runtime::TokioCurrentThread)
            .with_batch_config(batch_config)
            .build();

        let inner = sdktrace::TracerProvider::builder()
            .with_span_processor(processor)
            .with_config(sdktrace::Config::default().with_resource(resource(config)))
            .build();
        Self::from_sdk(inner, config)
    }

    /// Export every span as soon as it ends. Tests only.
    #[cfg(test)]
    pub(crate) fn with_simple_exporter<E>(config: &TraceConfig, exporter: E) -> Self
    where
        E: SpanExporter + 'static,
    {
        let inner = sdktrace::TracerProvider::builder()
            .with_simple_exporter(exporter)
            .with_config(sdktrace::Config::default().with_resource(resource(config)))
            .build();
        Self::from_sdk(inner, config)
    }

    fn from_sdk(inner: sdktrace::TracerProvider, config: &TraceConfig) -> Self {
        let tracer = Tracer {
            inner: inner.tracer(SCOPE_NAME),
            service_name: Arc::from(config.service_name.as_str()),
        };
        Self {
            inner,
            tracer,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    pub fn tracer(&self) -> Tracer {
        self.tracer.clone()
    }

    /// Export every queued span without closing the pipeline, bounded by the
    /// shutdown timeout.
    pub async fn force_flush(&self) -> Result<(), ExportFlushError> {
        let inner = self.inner.clone();
        self.run_bounded(move || {
            inner
                .force_flush()
                .into_iter()
                .collect::<Result<Vec<()>, _>>()
                .map(drop)
        })
        .await
    }

    /// Flush all queued spans and close the exporter, bounded by the
    /// configured shutdown timeout.
    pub async fn shutdown(self) -> Result<(), ExportFlushError> {
        let inner = self.inner.clone();
        self.run_bounded(move || inner.shutdown()).await?;
        debug!("Span exporter flushed and closed");
        Ok(())
    }

    /// The SDK flushes synchronously; keep it off the async workers.
    async fn run_bounded<F>(&self, flush: F) -> Result<(), ExportFlushError>
    where
        F: FnOnce() -> opentelemetry::trace::TraceResult<()> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(flush);
        match tokio::time::timeout(self.shutdown_timeout, task).await {
            Ok(Ok(result)) => result.map_err(ExportFlushError::Export),
            Ok(Err(join_err)) => Err(ExportFlushError::Worker(join_err.to_string())),
            Err(_) => Err(ExportFlushError::Timeout {
                timeout: self.shutdown_timeout,
            }),
        }
    }
}

/// Resource shared by every span: service name, version and the configured
/// extra attributes.
fn resource(config: &TraceConfig) -> Resource {
    let mut attributes: Vec<KeyValue> = config
        .resource_attributes
        .iter()
        .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
        .collect();
    if !config.resource_attributes.contains_key(SERVICE_NAME) {
        attributes.push(KeyValue::new(SERVICE_NAME, config.service_name.clone()));
    }
    if !config.resource_attributes.contains_key(SERVICE_VERSION) {
        attributes.push(KeyValue::new(SERVICE_VERSION, crate::PKG_VERSION));
    }
    Resource::new(attributes)
}
