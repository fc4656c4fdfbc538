//! Core types for HTTP request/response handling.
//!
//! - [`Request`] - HTTP request abstraction
//! - [`Response`] - HTTP response abstraction with builder pattern
//! - [`Handler`] - async request handler, invoked through the interceptor
//!
//! # Example
//!
//! ```rust,ignore
//! use microsvc::core::{Handler, HandlerError, Request, Response, Scope};
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl Handler for Hello {
//!     async fn handle(&self, _req: Request, scope: &Scope<'_>) -> Result<Response, HandlerError> {
//!         scope.span().add_event("greeting");
//!         Ok(Response::ok("Hello, World!"))
//!     }
//! }
//! ```

mod handler;
mod request;
mod response;

pub use handler::{handler_fn, FnHandler, Handler, HandlerError, Scope};
pub use request::Request;
pub use response::{Response, ResponseBuilder};
