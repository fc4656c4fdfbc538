//! Test helpers and utilities

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use microsvc::config::{ServerConfig, TraceConfig};
use microsvc::observability::{MetricsRecorder, RequestInterceptor, SpanData, TracerProvider};
use microsvc::server::{service_routes, Router, Server};
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use reqwest::{Client, Response, StatusCode};
use tokio::task::JoinHandle;

/// In-process server bound to a free local port, exporting spans in memory.
pub struct TestServer {
    pub base_url: String,
    pub client: Client,
    pub metrics: Arc<MetricsRecorder>,
    pub server: Arc<Server>,
    exporter: InMemorySpanExporter,
    provider: TracerProvider,
    accept_loop: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestServer {
    /// Start the sample service under `service_name`.
    pub async fn start(service_name: &str) -> Self {
        Self::start_with(service_name, service_routes(service_name), ServerConfig::default()).await
    }

    /// Start a server with custom routes and settings. The listen address is
    /// always replaced by an ephemeral loopback port.
    pub async fn start_with(service_name: &str, router: Router, mut config: ServerConfig) -> Self {
        config.listen_addr = SocketAddr::from(([127, 0, 0, 1], 0));
        config.access_log = false;

        let trace_config = TraceConfig {
            service_name: service_name.to_string(),
            flush_interval: Duration::from_millis(50),
            ..TraceConfig::default()
        };
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::with_exporter(&trace_config, exporter.clone());
        let metrics = Arc::new(MetricsRecorder::new().expect("Failed to create metrics"));
        let interceptor = RequestInterceptor::new(provider.tracer(), Arc::clone(&metrics));

        let server = Arc::new(
            Server::bind(config, router, interceptor)
                .await
                .expect("Failed to bind test server"),
        );
        let addr = server.local_addr().expect("No local address");

        let accept_loop = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run().await })
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: format!("http://{}", addr),
            client,
            metrics,
            server,
            exporter,
            provider,
            accept_loop,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Make a GET request to the server
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    /// Make a GET request with custom headers
    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> Response {
        let mut req = self.client.get(self.url(path));
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        req.send().await.expect("GET request failed")
    }

    /// Stop serving, flush the trace pipeline and return every exported span.
    pub async fn shutdown(self) -> Vec<SpanData> {
        self.server.trigger_shutdown();
        let _ = self.accept_loop.await;
        assert!(
            self.server.wait_for_drain(Duration::from_secs(5)).await,
            "connections did not drain"
        );
        self.provider
            .force_flush()
            .await
            .expect("Failed to flush spans");
        // Shutting the pipeline down clears the in-memory exporter.
        let spans = self
            .exporter
            .get_finished_spans()
            .expect("Failed to read exported spans");
        self.provider
            .shutdown()
            .await
            .expect("Failed to shut down trace pipeline");
        spans
    }
}

/// Assert that response has expected status
pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}

/// Assert that response contains header
pub fn assert_header(response: &Response, name: &str, expected: &str) {
    let value = response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("Header '{}' not found", name))
        .to_str()
        .unwrap();
    assert_eq!(value, expected, "Header '{}' mismatch", name);
}

/// Assert that response has header present
pub fn assert_has_header(response: &Response, name: &str) {
    assert!(
        response.headers().contains_key(name),
        "Header '{}' not found",
        name
    );
}

/// Assert that response body equals `expected`
pub async fn assert_body(response: Response, expected: &str) {
    let body = response.text().await.expect("Failed to read body");
    assert_eq!(body, expected);
}

/// String form of the span attribute `key`
pub fn attribute(span: &SpanData, key: &str) -> Option<String> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.as_str().into_owned())
}

/// Find the one span called `name`
pub fn span_named<'a>(spans: &'a [SpanData], name: &str) -> &'a SpanData {
    let matching: Vec<_> = spans.iter().filter(|s| s.name == name).collect();
    assert_eq!(matching.len(), 1, "expected one span named '{}'", name);
    matching[0]
}
