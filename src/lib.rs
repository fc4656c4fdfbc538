//! microsvc - request observability for a small HTTP service.
//!
//! Every routed request runs inside a [`RequestInterceptor`] that opens a
//! server span (continuing a W3C `traceparent` when present), records the
//! request in Prometheus metrics, and turns handler panics into plain 500
//! responses. Spans are batched and exported as OTLP/HTTP JSON to a collector.
//!
//! # Features
//!
//! - **Metrics**: request counter, latency histogram and in-flight gauge,
//!   scraped at `/metrics`
//! - **Tracing**: explicit OpenTelemetry [`TracerProvider`] (no global
//!   provider) with a batch span processor and bounded flush on shutdown
//! - **Access Logging**: structured JSON logging with trace correlation
//!
//! # Example
//!
//! ```rust,ignore
//! use microsvc::config::Config;
//! use microsvc::observability::{MetricsRecorder, RequestInterceptor, TracerProvider};
//! use microsvc::server::{service_routes, Server};
//!
//! let config = Config::from_env()?;
//! let provider = TracerProvider::initialize(&config.trace).await?;
//! let metrics = Arc::new(MetricsRecorder::with_config(&config.metrics)?);
//! let interceptor = RequestInterceptor::new(provider.tracer(), metrics);
//! let server = Server::bind(config.server.clone(), service_routes(&config.service.name), interceptor).await?;
//! server.run().await;
//! ```
//!
//! [`RequestInterceptor`]: observability::RequestInterceptor
//! [`TracerProvider`]: observability::TracerProvider

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod core;
pub mod logging;
pub mod observability;
pub mod server;
pub mod trace_context;

// Re-exports for convenience
pub use config::Config;
pub use server::Server;
