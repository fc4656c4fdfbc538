//! Basic HTTP tests: sample endpoints, 404, 405, 413, crash recovery.

use crate::helpers::*;
use microsvc::config::ServerConfig;
use microsvc::server::service_routes;
use reqwest::StatusCode;

#[tokio::test]
async fn test_root_reports_running() {
    let server = TestServer::start("service-a").await;
    let resp = server.get("/").await;

    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "content-type", "application/json");
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "running" }));

    server.shutdown().await;
}

#[tokio::test]
async fn test_healthy() {
    let server = TestServer::start("service-a").await;
    let resp = server.get("/healthy").await;

    assert_status(&resp, StatusCode::OK);
    assert_body(resp, r#"{"status":"healthy"}"#).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_hello_names_the_service() {
    let server = TestServer::start("service-b").await;
    let resp = server.get("/hello").await;

    assert_status(&resp, StatusCode::OK);
    assert_body(resp, "Hello from Service B!").await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_crash_returns_generic_500_and_server_survives() {
    let server = TestServer::start("service-a").await;

    let resp = server.get("/crash").await;
    assert_status(&resp, StatusCode::INTERNAL_SERVER_ERROR);
    let body = resp.text().await.unwrap();
    assert_eq!(body, "Internal Server Error");
    assert!(!body.contains("crash test"));

    let resp = server.get("/healthy").await;
    assert_status(&resp, StatusCode::OK);

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let server = TestServer::start("service-a").await;
    let resp = server.get("/does-not-exist").await;

    assert_status(&resp, StatusCode::NOT_FOUND);
    assert_has_header(&resp, "traceparent");

    server.shutdown().await;
}

#[tokio::test]
async fn test_wrong_method_is_405() {
    let server = TestServer::start("service-a").await;
    let resp = server
        .client
        .post(server.url("/hello"))
        .send()
        .await
        .unwrap();

    assert_status(&resp, StatusCode::METHOD_NOT_ALLOWED);
    assert_header(&resp, "allow", "GET");

    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let config = ServerConfig {
        max_body_size: 16,
        ..ServerConfig::default()
    };
    let server = TestServer::start_with("service-a", service_routes("service-a"), config).await;

    let resp = server
        .client
        .post(server.url("/hello"))
        .body(vec![b'x'; 1024])
        .send()
        .await
        .unwrap();
    assert_status(&resp, StatusCode::PAYLOAD_TOO_LARGE);

    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_requests() {
    let server = TestServer::start("service-a").await;

    let requests = (0..20).map(|_| server.get("/hello"));
    for resp in futures_util::future::join_all(requests).await {
        assert_status(&resp, StatusCode::OK);
    }
    assert_eq!(server.metrics.requests_total("GET", "/hello", 200), 20);

    server.shutdown().await;
}
