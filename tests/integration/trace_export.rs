//! Trace propagation and export tests.

use std::time::Duration;

use crate::helpers::*;
use microsvc::config::{RequestTimeout, ServerConfig};
use microsvc::core::{handler_fn, Response};
use microsvc::observability::{SpanKind, UNMATCHED_ROUTE};
use microsvc::server::Router;
use opentelemetry::trace::{SpanId, Status};
use reqwest::StatusCode;

const PARENT: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

/// Span id field of a `traceparent` header.
fn span_id_of(traceparent: &str) -> &str {
    traceparent.split('-').nth(2).expect("malformed traceparent")
}

#[tokio::test]
async fn test_request_span_is_exported() {
    let server = TestServer::start("service-a").await;
    let resp = server.get("/hello").await;
    assert_status(&resp, StatusCode::OK);
    let returned = resp
        .headers()
        .get("traceparent")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let spans = server.shutdown().await;
    let span = span_named(&spans, "GET /hello");
    assert_eq!(span.span_kind, SpanKind::Server);
    assert_eq!(span.span_context.span_id().to_string(), span_id_of(&returned));
    assert_eq!(attribute(span, "http.request.method").as_deref(), Some("GET"));
    assert_eq!(attribute(span, "http.route").as_deref(), Some("/hello"));
    assert_eq!(attribute(span, "url.path").as_deref(), Some("/hello"));
    assert_eq!(attribute(span, "http.response.status_code").as_deref(), Some("200"));
    assert_eq!(attribute(span, "hello.service").as_deref(), Some("service-a"));
    assert!(span.events.events.iter().any(|e| e.name == "hello.response.sent"));
    assert_eq!(span.parent_span_id, SpanId::INVALID);
    assert_eq!(span.status, Status::Ok);
}

#[tokio::test]
async fn test_incoming_traceparent_is_continued() {
    let server = TestServer::start("service-b").await;
    let resp = server
        .get_with_headers("/healthy", &[("traceparent", PARENT)])
        .await;
    let header = resp.headers().get("traceparent").unwrap().to_str().unwrap();
    assert!(header.starts_with("00-0af7651916cd43dd8448eb211c80319c-"));

    let spans = server.shutdown().await;
    let span = span_named(&spans, "GET /healthy");
    assert_eq!(
        span.span_context.trace_id().to_string(),
        "0af7651916cd43dd8448eb211c80319c"
    );
    assert_eq!(span.parent_span_id.to_string(), "b7ad6b7169203331");
}

#[tokio::test]
async fn test_malformed_traceparent_starts_new_trace() {
    let server = TestServer::start("service-a").await;
    server
        .get_with_headers("/", &[("traceparent", "not-a-traceparent")])
        .await;

    let spans = server.shutdown().await;
    assert_eq!(span_named(&spans, "GET /").parent_span_id, SpanId::INVALID);
}

#[tokio::test]
async fn test_crash_is_recorded_on_span() {
    let server = TestServer::start("service-a").await;
    server.get("/crash").await;

    let spans = server.shutdown().await;
    let span = span_named(&spans, "GET /crash");
    assert_eq!(attribute(span, "http.response.status_code").as_deref(), Some("500"));
    assert_eq!(
        span.status,
        Status::error("handler panicked: This is a crash test!")
    );
}

#[tokio::test]
async fn test_every_request_produces_one_span() {
    let server = TestServer::start("service-a").await;
    for path in ["/", "/healthy", "/hello", "/crash", "/missing"] {
        server.get(path).await;
    }

    let spans = server.shutdown().await;
    assert_eq!(spans.len(), 5);
    let unmatched = span_named(&spans, &format!("GET {}", UNMATCHED_ROUTE));
    assert_eq!(attribute(unmatched, "url.path").as_deref(), Some("/missing"));
    assert_eq!(attribute(unmatched, "http.route"), None);
}

#[tokio::test]
async fn test_request_timeout_returns_504() {
    let router = Router::new().get(
        "/slow",
        handler_fn(|_req| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Response::ok("late"))
        }),
    );
    let config = ServerConfig {
        request_timeout: RequestTimeout(Some(Duration::from_millis(100))),
        ..ServerConfig::default()
    };
    let server = TestServer::start_with("service-a", router, config).await;

    let resp = server.get("/slow").await;
    assert_status(&resp, StatusCode::GATEWAY_TIMEOUT);

    let spans = server.shutdown().await;
    match &span_named(&spans, "GET /slow").status {
        Status::Error { description } => assert!(description.starts_with("handler timed out")),
        other => panic!("expected error status, got {:?}", other),
    }
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_request_finish() {
    let router = Router::new().get(
        "/work",
        handler_fn(|_req| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(Response::ok("done"))
        }),
    );
    let server = TestServer::start_with("service-a", router, ServerConfig::default()).await;

    let request = {
        let client = server.client.clone();
        let url = server.url("/work");
        tokio::spawn(async move { client.get(url).send().await })
    };
    // Let the request reach the handler.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.metrics.in_flight(), 1);

    let spans = server.shutdown().await;
    let resp = request.await.unwrap().expect("in-flight request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "done");
    assert_eq!(
        attribute(span_named(&spans, "GET /work"), "http.response.status_code").as_deref(),
        Some("200")
    );
}
