//! Per-connection HTTP handling and request dispatch.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::debug;

use super::routing::{RouteMatch, Router};
use crate::core::{Handler, HandlerError, Request, Response, Scope};
use crate::observability::{RequestInterceptor, EXPOSITION_CONTENT_TYPE};

/// Scrape path, served outside the interceptor.
pub const METRICS_PATH: &str = "/metrics";

/// Check if an error is a common connection reset or timeout.
fn is_connection_error(err_str: &str) -> bool {
    err_str.contains("connection reset")
        || err_str.contains("Connection reset")
        || err_str.contains("broken pipe")
        || err_str.contains("os error 104")
        || err_str.contains("os error 32")
        || err_str.contains("timed out")
        || err_str.contains("HeaderTimeout")
}

/// Resolves once shutdown has been signalled, or the sender is gone.
pub(crate) async fn shutdown_signalled(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Counts a connection as active until dropped.
pub(crate) struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub(crate) fn new(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        Self {
            active: Arc::clone(active),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Responses for requests no registered handler accepts. They still go
/// through the interceptor so they are traced and counted.
enum Fallback {
    NotFound,
    MethodNotAllowed(String),
    PayloadTooLarge,
}

#[async_trait]
impl Handler for Fallback {
    async fn handle(&self, _req: Request, _scope: &Scope<'_>) -> Result<Response, HandlerError> {
        Ok(match self {
            Fallback::NotFound => Response::not_found(),
            Fallback::MethodNotAllowed(allow) => Response::method_not_allowed(allow),
            Fallback::PayloadTooLarge => Response::payload_too_large(),
        })
    }
}

/// Shared state of every connection.
pub struct ConnectionContext {
    router: Router,
    interceptor: RequestInterceptor,
    max_body_size: usize,
    header_read_timeout: Duration,
}

impl ConnectionContext {
    pub fn new(
        router: Router,
        interceptor: RequestInterceptor,
        max_body_size: usize,
        header_read_timeout: Duration,
    ) -> Self {
        Self {
            router,
            interceptor,
            max_body_size,
            header_read_timeout,
        }
    }

    /// Serve one TCP connection until the peer closes it or shutdown is
    /// signalled. On shutdown, in-flight requests finish first.
    pub(crate) async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown_rx: watch::Receiver<bool>,
        _guard: ConnectionGuard,
    ) {
        let ctx = Arc::clone(&self);
        let service = service_fn(move |req| {
            let ctx = Arc::clone(&ctx);
            async move { ctx.handle_request(req).await }
        });

        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(Some(self.header_read_timeout))
            .keep_alive(true);

        let conn = builder.serve_connection(TokioIo::new(stream), service);
        let shutdown = shutdown_signalled(shutdown_rx);
        tokio::pin!(conn, shutdown);

        let result = tokio::select! {
            res = conn.as_mut() => res,
            _ = &mut shutdown => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        };

        if let Err(err) = result {
            let err_str = format!("{:?}", err);
            if !is_connection_error(&err_str) {
                debug!(remote = %remote_addr, "Connection error: {}", err_str);
            }
        }
    }

    async fn handle_request(
        &self,
        req: http::Request<Incoming>,
    ) -> Result<http::Response<Full<Bytes>>, Infallible> {
        let (parts, body) = req.into_parts();

        let (body, oversized) = match Limited::new(body, self.max_body_size).collect().await {
            Ok(collected) => (collected.to_bytes(), false),
            Err(e) if e.is::<http_body_util::LengthLimitError>() => (Bytes::new(), true),
            Err(e) => {
                debug!(error = %e, "Failed to read request body");
                return Ok(Response::empty(StatusCode::BAD_REQUEST).into_http());
            }
        };

        let request = Request::from(http::Request::from_parts(parts, body));
        let response = if oversized {
            let fallback = Fallback::PayloadTooLarge;
            match self.router.resolve(request.method(), request.path()) {
                RouteMatch::Found { route, .. } | RouteMatch::MethodNotAllowed { route, .. } => {
                    self.interceptor.intercept(route, request, &fallback).await
                }
                RouteMatch::NotFound => self.interceptor.intercept_unmatched(request, &fallback).await,
            }
        } else {
            self.dispatch(request).await
        };
        Ok(response.into_http())
    }

    /// Route `req` and run it through the interceptor.
    pub async fn dispatch(&self, req: Request) -> Response {
        let path = req.path().to_string();
        if path == METRICS_PATH {
            return self.scrape(req.method());
        }

        match self.router.resolve(req.method(), &path) {
            RouteMatch::Found { route, handler } => {
                self.interceptor.intercept(route, req, handler.as_ref()).await
            }
            RouteMatch::MethodNotAllowed { route, allow } => {
                self.interceptor
                    .intercept(route, req, &Fallback::MethodNotAllowed(allow))
                    .await
            }
            RouteMatch::NotFound => {
                self.interceptor
                    .intercept_unmatched(req, &Fallback::NotFound)
                    .await
            }
        }
    }

    fn scrape(&self, method: &Method) -> Response {
        if method != Method::GET && method != Method::HEAD {
            return Response::method_not_allowed("GET, HEAD");
        }
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE.as_str(), EXPOSITION_CONTENT_TYPE)
            .body(self.interceptor.metrics().snapshot())
            .build()
    }
}
