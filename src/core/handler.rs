//! Request handler abstraction.

use std::borrow::Cow;
use std::future::Future;

use async_trait::async_trait;
use http::StatusCode;
use thiserror::Error;

use super::{Request, Response};
use crate::observability::{Span, Tracer};

/// Error returned by a handler instead of a response.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Expected failure, answered with `status` and `message` as body.
    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },
    /// The handler gave up abnormally; treated like a panic.
    #[error("handler aborted: {0}")]
    Aborted(String),
}

impl HandlerError {
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted(message.into())
    }
}

/// What a handler may touch of the request's trace.
pub struct Scope<'a> {
    span: &'a Span,
    tracer: &'a Tracer,
}

impl<'a> Scope<'a> {
    pub fn new(span: &'a Span, tracer: &'a Tracer) -> Self {
        Self { span, tracer }
    }

    /// The request span.
    pub fn span(&self) -> &Span {
        self.span
    }

    pub fn tracer(&self) -> &Tracer {
        self.tracer
    }

    /// Start a span below the request span. End it with [`Span::end`].
    pub fn start_child(&self, name: impl Into<Cow<'static, str>>) -> Span {
        self.tracer.start_span(Some(self.span.context()), name)
    }
}

/// Handles one routed request.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, req: Request, scope: &Scope<'_>) -> Result<Response, HandlerError>;
}

/// Handler built from an async closure that ignores the trace scope.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    async fn handle(&self, req: Request, _scope: &Scope<'_>) -> Result<Response, HandlerError> {
        (self.f)(req).await
    }
}
