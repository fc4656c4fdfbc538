//! Collector endpoint validation and OTLP exporter construction.
//!
//! Spans are exported as OTLP over HTTP with JSON bodies. Startup checks the
//! collector with a TCP connect, since the HTTP exporter itself only connects
//! on the first export.

use std::fmt;
use std::time::Duration;

use http::Uri;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use tokio::net::TcpStream;

use super::error::TraceError;
use crate::config::TraceConfig;

/// Path used when the collector URL has none.
pub const DEFAULT_SPANS_PATH: &str = "/v1/traces";

/// Validated collector address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorEndpoint {
    uri: Uri,
    /// `host:port`, used for the startup connect check.
    authority: String,
}

impl CollectorEndpoint {
    /// Parse an `http://host[:port][/path]` URL.
    pub fn parse(endpoint: &str) -> Result<Self, TraceError> {
        let invalid = |reason: &str| TraceError::Configuration {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = endpoint
            .trim()
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(invalid(&format!("unsupported scheme '{}'", other))),
            None => return Err(invalid("missing scheme")),
        }

        let host = match uri.host() {
            Some(h) if !h.is_empty() => h,
            _ => return Err(invalid("missing host")),
        };
        let port = uri.port_u16().unwrap_or(80);
        let authority = format!("{}:{}", host, port);

        let path = match uri.path_and_query().map(|p| p.as_str()) {
            None | Some("") | Some("/") => DEFAULT_SPANS_PATH,
            Some(p) => p,
        };

        let uri = format!("http://{}{}", authority, path)
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;

        Ok(Self { uri, authority })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }
}

impl fmt::Display for CollectorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

/// Check that the collector accepts TCP connections.
pub(crate) async fn check_reachable(endpoint: &CollectorEndpoint, timeout: Duration) -> Result<(), TraceError> {
    let init_error = |reason: String| TraceError::ExportInit {
        endpoint: endpoint.to_string(),
        reason,
    };
    match tokio::time::timeout(timeout, TcpStream::connect(endpoint.authority())).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(init_error(e.to_string())),
        Err(_) => Err(init_error(format!("connect timed out after {:?}", timeout))),
    }
}

/// Build the OTLP/HTTP JSON span exporter for `endpoint`.
pub(crate) fn build(
    endpoint: &CollectorEndpoint,
    config: &TraceConfig,
) -> Result<opentelemetry_otlp::SpanExporter, TraceError> {
    opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpJson)
        .with_endpoint(endpoint.to_string())
        .with_timeout(config.export_timeout)
        .build()
        .map_err(|e| TraceError::ExportInit {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{ExportFlushError, TracerProvider};
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::StatusCode;
    use hyper_util::rt::TokioIo;
    use std::convert::Infallible;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// What the collector saw of one export request.
    struct Received {
        method: String,
        path: String,
        content_type: String,
        body: Bytes,
    }

    /// Minimal HTTP collector answering every request with `status`.
    async fn collector(status: StatusCode) -> (String, mpsc::UnboundedReceiver<Received>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: http::Request<hyper::body::Incoming>| {
                        let tx = tx.clone();
                        async move {
                            let (parts, body) = req.into_parts();
                            let body = body.collect().await.map(|b| b.to_bytes()).unwrap_or_default();
                            let _ = tx.send(Received {
                                method: parts.method.to_string(),
                                path: parts.uri.path().to_string(),
                                content_type: parts
                                    .headers
                                    .get(http::header::CONTENT_TYPE)
                                    .and_then(|v| v.to_str().ok())
                                    .unwrap_or_default()
                                    .to_string(),
                                body,
                            });
                            let mut res = http::Response::new(Full::new(Bytes::new()));
                            *res.status_mut() = status;
                            Ok::<_, Infallible>(res)
                        }
                    });
                    // The startup check connects and closes without a request.
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        (format!("http://{}", addr), rx)
    }

    fn config(endpoint: String) -> TraceConfig {
        TraceConfig {
            endpoint,
            service_name: "service-b".into(),
            flush_interval: Duration::from_secs(3600),
            export_timeout: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(5),
            ..TraceConfig::default()
        }
    }

    #[test]
    fn test_endpoint_default_path() {
        let ep = CollectorEndpoint::parse("http://localhost:5775").unwrap();
        assert_eq!(ep.uri().to_string(), "http://localhost:5775/v1/traces");
        assert_eq!(ep.authority(), "localhost:5775");
    }

    #[test]
    fn test_endpoint_keeps_path_and_default_port() {
        let ep = CollectorEndpoint::parse("http://jaeger/otlp/v1/traces").unwrap();
        assert_eq!(ep.uri().to_string(), "http://jaeger:80/otlp/v1/traces");
        assert_eq!(ep.authority(), "jaeger:80");
    }

    #[test]
    fn test_endpoint_rejects_malformed() {
        for bad in ["", "localhost:5775", "https://collector:443", "udp://host:6831", "http://"] {
            let err = CollectorEndpoint::parse(bad).unwrap_err();
            assert!(
                matches!(err, TraceError::Configuration { .. }),
                "{:?} should be a configuration error",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_refused_collector_is_export_init_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = CollectorEndpoint::parse(&format!("http://127.0.0.1:{}", port)).unwrap();
        let err = check_reachable(&endpoint, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, TraceError::ExportInit { .. }));
    }

    #[tokio::test]
    async fn test_initialize_refused_collector() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = TracerProvider::initialize(&config(format!("http://127.0.0.1:{}", port)))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TraceError::ExportInit { .. }));
    }

    #[tokio::test]
    async fn test_spans_are_posted_to_collector() {
        let (endpoint, mut received) = collector(StatusCode::OK).await;
        let provider = TracerProvider::initialize(&config(endpoint)).await.unwrap();

        let span = provider.tracer().start_span(None, "GET /hello");
        span.add_event("hello.response.sent");
        span.end();
        provider.shutdown().await.expect("export should succeed");

        let req = received.recv().await.expect("collector received nothing");
        assert_eq!(req.method, "POST");
        assert!(req.path.ends_with(DEFAULT_SPANS_PATH), "path {}", req.path);
        assert!(req.content_type.starts_with("application/json"), "{}", req.content_type);

        let body: serde_json::Value = serde_json::from_slice(&req.body).expect("JSON body");
        let text = body.to_string();
        assert!(text.contains("\"GET /hello\""), "{}", text);
        assert!(text.contains("hello.response.sent"));
        assert!(text.contains("service-b"));
    }

    #[tokio::test]
    async fn test_collector_error_status_fails_flush() {
        let (endpoint, mut received) = collector(StatusCode::SERVICE_UNAVAILABLE).await;
        let provider = TracerProvider::initialize(&config(endpoint)).await.unwrap();

        provider.tracer().start_span(None, "op").end();
        let err = provider.shutdown().await.unwrap_err();
        assert!(matches!(err, ExportFlushError::Export(_)), "{:?}", err);
        assert!(received.recv().await.is_some());
    }
}
