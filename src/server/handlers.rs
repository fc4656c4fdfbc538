//! Sample service endpoints.

use async_trait::async_trait;
use serde_json::json;

use super::routing::Router;
use crate::core::{Handler, HandlerError, Request, Response, Scope};

/// Span event emitted once the greeting has been produced.
pub const HELLO_EVENT: &str = "hello.response.sent";

/// Message carried by the deliberate crash.
pub const CRASH_MESSAGE: &str = "This is a crash test!";

/// `GET /`
pub struct RootHandler;

#[async_trait]
impl Handler for RootHandler {
    async fn handle(&self, _req: Request, _scope: &Scope<'_>) -> Result<Response, HandlerError> {
        Ok(Response::json(&json!({ "status": "running" })))
    }
}

/// `GET /healthy`
pub struct HealthyHandler;

#[async_trait]
impl Handler for HealthyHandler {
    async fn handle(&self, _req: Request, _scope: &Scope<'_>) -> Result<Response, HandlerError> {
        Ok(Response::json(&json!({ "status": "healthy" })))
    }
}

/// `GET /hello`: plain-text greeting naming the service.
pub struct HelloHandler {
    greeting: String,
}

impl HelloHandler {
    pub fn new(service_name: &str) -> Self {
        Self {
            greeting: format!("Hello from {}!", display_name(service_name)),
        }
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }
}

#[async_trait]
impl Handler for HelloHandler {
    async fn handle(&self, _req: Request, scope: &Scope<'_>) -> Result<Response, HandlerError> {
        let span = scope.span();
        span.set_attribute("hello.service", scope.tracer().service_name().to_string());
        let response = Response::ok(self.greeting.clone());
        span.add_event(HELLO_EVENT);
        Ok(response)
    }
}

/// `GET /crash`: always terminates abnormally.
pub struct CrashHandler;

#[async_trait]
impl Handler for CrashHandler {
    async fn handle(&self, _req: Request, _scope: &Scope<'_>) -> Result<Response, HandlerError> {
        Err(HandlerError::aborted(CRASH_MESSAGE))
    }
}

/// Route table of the sample service.
pub fn service_routes(service_name: &str) -> Router {
    Router::new()
        .get("/", RootHandler)
        .get("/healthy", HealthyHandler)
        .get("/hello", HelloHandler::new(service_name))
        .get("/crash", CrashHandler)
}

/// `service-b` -> `Service B`
fn display_name(service_name: &str) -> String {
    service_name
        .split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
