//! Metrics scrape endpoint tests.

use std::time::Duration;

use crate::helpers::*;
use microsvc::config::ServerConfig;
use microsvc::core::{handler_fn, Response};
use microsvc::observability::EXPOSITION_CONTENT_TYPE;
use microsvc::server::Router;
use reqwest::StatusCode;

async fn scrape(server: &TestServer) -> String {
    let resp = server.get("/metrics").await;
    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "content-type", EXPOSITION_CONTENT_TYPE);
    resp.text().await.unwrap()
}

#[tokio::test]
async fn test_scrape_reports_requests() {
    let server = TestServer::start("service-a").await;
    server.get("/").await;
    server.get("/").await;
    server.get("/crash").await;

    let body = scrape(&server).await;
    assert!(body.contains(r#"http_requests_total{method="GET",path="/",status_code="200"} 2"#));
    assert!(body.contains(r#"http_requests_total{method="GET",path="/crash",status_code="500"} 1"#));
    assert!(body.contains("http_request_duration_seconds_bucket"));
    assert!(body.contains("http_request_duration_seconds_count"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_scrapes_are_not_counted_or_traced() {
    let server = TestServer::start("service-a").await;
    scrape(&server).await;
    let body = scrape(&server).await;
    assert!(!body.contains(r#"path="/metrics""#));

    let spans = server.shutdown().await;
    assert!(spans.is_empty());
}

#[tokio::test]
async fn test_slow_request_lands_in_quarter_second_bucket() {
    let router = Router::new().get(
        "/hello",
        handler_fn(|_req| async {
            tokio::time::sleep(Duration::from_millis(120)).await;
            Ok(Response::ok("Hello"))
        }),
    );
    let server = TestServer::start_with("service-a", router, ServerConfig::default()).await;
    server.get("/hello").await;

    let body = scrape(&server).await;
    assert!(body.contains(r#"http_requests_total{method="GET",path="/hello",status_code="200"} 1"#));
    assert!(body.contains(
        r#"http_request_duration_seconds_bucket{method="GET",path="/hello",status_code="200",le="0.1"} 0"#
    ));
    assert!(body.contains(
        r#"http_request_duration_seconds_bucket{method="GET",path="/hello",status_code="200",le="0.25"} 1"#
    ));

    server.shutdown().await;
}

#[tokio::test]
async fn test_ids_in_paths_are_normalized() {
    let server = TestServer::start("service-a").await;
    server.get("/users/1").await;
    server.get("/users/2").await;

    assert_eq!(server.metrics.requests_total("GET", "/users/:id", 404), 2);

    server.shutdown().await;
}
