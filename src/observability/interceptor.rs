//! Request interceptor: one server span and one metric sample per request.
//!
//! Every exit path of the wrapped handler ends up in [`RequestGuard`]: normal
//! return, handler error, panic, timeout, and cancellation (the request future
//! being dropped mid-flight).

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use http::StatusCode;
use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::trace::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE, URL_PATH, URL_QUERY,
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::error::HandlerPanic;
use super::metrics::{InFlightGuard, MetricSample, MetricsRecorder};
use super::span::Span;
use super::tracer::Tracer;
use crate::core::{Handler, HandlerError, Request, Response, Scope};
use crate::trace_context::{extract_context, traceparent, TRACEPARENT};

/// Status recorded when the client goes away before a response exists.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Route label in span names of requests no route matched.
pub const UNMATCHED_ROUTE: &str = "<unmatched>";

const HTTP_REQUEST_BODY_SIZE: &str = "http.request.body.size";

/// How the wrapped handler finished.
enum Completion {
    Returned(Result<Response, HandlerError>),
    Panicked(Box<dyn Any + Send>),
    TimedOut(Duration),
}

/// Wraps handlers with tracing, metrics and panic recovery.
#[derive(Clone)]
pub struct RequestInterceptor {
    tracer: Tracer,
    metrics: Arc<MetricsRecorder>,
    request_timeout: Option<Duration>,
    access_log: bool,
}

impl RequestInterceptor {
    pub fn new(tracer: Tracer, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            tracer,
            metrics,
            request_timeout: None,
            access_log: false,
        }
    }

    /// Bound handler run time; `None` disables the bound.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_access_log(mut self, enabled: bool) -> Self {
        self.access_log = enabled;
        self
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Run `handler` for `req`, which was routed to `route`.
    ///
    /// Never fails: handler errors, panics and timeouts become responses.
    pub async fn intercept<H>(&self, route: &str, req: Request, handler: &H) -> Response
    where
        H: Handler + ?Sized,
    {
        self.run(Some(route), req, handler).await
    }

    /// Run `handler` for a request no route matched. The span is named after
    /// [`UNMATCHED_ROUTE`]; metrics still see the (normalized) request path.
    pub async fn intercept_unmatched<H>(&self, req: Request, handler: &H) -> Response
    where
        H: Handler + ?Sized,
    {
        self.run(None, req, handler).await
    }

    async fn run<H>(&self, route: Option<&str>, req: Request, handler: &H) -> Response
    where
        H: Handler + ?Sized,
    {
        let method = req.method().to_string();
        let target = req.target().to_string();
        let parent = extract_context(req.headers());

        let mut attributes = vec![
            KeyValue::new(HTTP_REQUEST_METHOD, method.clone()),
            KeyValue::new(URL_PATH, req.path().to_string()),
            KeyValue::new(HTTP_REQUEST_BODY_SIZE, req.body().len() as i64),
        ];
        if let Some(query) = req.query() {
            attributes.push(KeyValue::new(URL_QUERY, query.to_string()));
        }
        if let Some(route) = route {
            attributes.push(KeyValue::new(HTTP_ROUTE, route.to_string()));
        }
        let span = self.tracer.start_span_with_kind(
            Some(&parent),
            format!("{} {}", method, route.unwrap_or(UNMATCHED_ROUTE)),
            SpanKind::Server,
            attributes,
        );

        let mut guard = RequestGuard {
            metrics: &self.metrics,
            metric_path: route.map_or_else(|| req.path().to_string(), str::to_string),
            span,
            method,
            target,
            route,
            start: Instant::now(),
            completed: false,
            access_log: self.access_log,
            _in_flight: self.metrics.track_in_flight(),
        };

        let completion = {
            let scope = Scope::new(&guard.span, &self.tracer);
            let work = AssertUnwindSafe(handler.handle(req, &scope)).catch_unwind();
            match self.request_timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(Ok(result)) => Completion::Returned(result),
                    Ok(Err(payload)) => Completion::Panicked(payload),
                    Err(_) => Completion::TimedOut(limit),
                },
                None => match work.await {
                    Ok(result) => Completion::Returned(result),
                    Err(payload) => Completion::Panicked(payload),
                },
            }
        };

        let response = match completion {
            Completion::Returned(Ok(response)) => response,
            Completion::Returned(Err(HandlerError::Status { status, message })) => {
                Response::status_text(status, &message)
            }
            Completion::Returned(Err(HandlerError::Aborted(message))) => {
                guard.recover(HandlerPanic::new(message))
            }
            Completion::Panicked(payload) => guard.recover(HandlerPanic::from_payload(payload)),
            Completion::TimedOut(limit) => {
                let reason = format!("handler timed out after {:?}", limit);
                warn!(route = %guard.route_label(), trace_id = %guard.span.trace_id(), "{}", reason);
                guard.span.record_error(Some(&reason));
                Response::gateway_timeout()
            }
        };

        guard.complete(response.status());
        match traceparent(guard.span.context()) {
            Some(value) => response.with_header(TRACEPARENT, value),
            None => response,
        }
    }
}

/// Finalizes the request's span and metric exactly once.
struct RequestGuard<'a> {
    metrics: &'a MetricsRecorder,
    /// Route, or the raw path for unmatched requests.
    metric_path: String,
    span: Span,
    method: String,
    target: String,
    route: Option<&'a str>,
    start: Instant,
    completed: bool,
    access_log: bool,
    _in_flight: InFlightGuard,
}

impl RequestGuard<'_> {
    fn route_label(&self) -> &str {
        self.route.unwrap_or(UNMATCHED_ROUTE)
    }

    /// Turn an abnormal termination into a recorded error and a generic 500.
    fn recover(&self, panic: HandlerPanic) -> Response {
        error!(
            route = %self.route_label(),
            trace_id = %self.span.trace_id(),
            error = %panic,
            "Handler terminated abnormally"
        );
        self.span.record_error(Some(&panic));
        Response::internal_error()
    }

    fn complete(&mut self, status: StatusCode) {
        if status.is_server_error() {
            self.span.record_error(Some(&format!("HTTP {}", status.as_u16())));
        } else {
            self.span.set_ok();
        }
        self.finalize(status.as_u16());
    }

    fn finalize(&mut self, status_code: u16) {
        if self.completed {
            return;
        }
        self.completed = true;

        let elapsed = self.start.elapsed();
        self.metrics.record(&MetricSample {
            method: self.method.clone(),
            path: self.metric_path.clone(),
            status_code,
            duration_seconds: elapsed.as_secs_f64(),
        });

        self.span
            .set_attribute(HTTP_RESPONSE_STATUS_CODE, i64::from(status_code));

        if self.access_log {
            let span_context = self.span.span_context();
            info!(
                target: "access",
                method = %self.method,
                path = %self.target,
                route = %self.route_label(),
                status = status_code,
                duration_ms = elapsed.as_secs_f64() * 1000.0,
                trace_id = %span_context.trace_id(),
                span_id = %span_context.span_id(),
                "{} {} {}",
                self.method,
                self.target,
                status_code
            );
        }

        self.span.end_in_place();
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        debug!(
            route = %self.route_label(),
            trace_id = %self.span.trace_id(),
            "Request cancelled before completion"
        );
        self.span.record_error(Some("request cancelled"));
        self.finalize(CLIENT_CLOSED_REQUEST);
    }
}
