//! HTTP response abstraction for handlers.

use bytes::Bytes;
use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::Serialize;

/// Pre-allocated static header values for common content types.
mod content_types {
    use super::*;
    pub static TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");
    pub static APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");
}

/// Pre-allocated static bodies for common responses.
mod static_bodies {
    use super::*;
    pub static NOT_FOUND: Bytes = Bytes::from_static(b"Not Found");
    pub static METHOD_NOT_ALLOWED: Bytes = Bytes::from_static(b"Method Not Allowed");
    pub static INTERNAL_ERROR: Bytes = Bytes::from_static(b"Internal Server Error");
    pub static GATEWAY_TIMEOUT: Bytes = Bytes::from_static(b"Gateway Timeout");
    pub static PAYLOAD_TOO_LARGE: Bytes = Bytes::from_static(b"Payload Too Large");
}

/// HTTP response.
///
/// Note: Clone is intentionally not derived to prevent expensive copies.
/// Use references or move semantics instead.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Create a new response builder.
    #[inline]
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::new()
    }

    /// Create a 200 OK plain-text response.
    #[inline]
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::builder().text().body(body).build()
    }

    /// Create a 200 OK JSON response. Serialization failure yields a 500.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::builder().json().body(body).build(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize JSON response");
                Self::internal_error()
            }
        }
    }

    /// Create a 404 Not Found response (uses static body).
    #[inline]
    pub fn not_found() -> Self {
        Self::static_text(StatusCode::NOT_FOUND, &static_bodies::NOT_FOUND)
    }

    /// Create a 405 Method Not Allowed response.
    #[inline]
    pub fn method_not_allowed(allow: &str) -> Self {
        Self::static_text(StatusCode::METHOD_NOT_ALLOWED, &static_bodies::METHOD_NOT_ALLOWED)
            .with_header(header::ALLOW.as_str(), allow)
    }

    /// Create a generic 500 Internal Server Error response.
    ///
    /// The body never carries error details.
    #[inline]
    pub fn internal_error() -> Self {
        Self::static_text(StatusCode::INTERNAL_SERVER_ERROR, &static_bodies::INTERNAL_ERROR)
    }

    /// Create a 504 Gateway Timeout response (uses static body).
    #[inline]
    pub fn gateway_timeout() -> Self {
        Self::static_text(StatusCode::GATEWAY_TIMEOUT, &static_bodies::GATEWAY_TIMEOUT)
    }

    /// Create a 413 Payload Too Large response.
    #[inline]
    pub fn payload_too_large() -> Self {
        Self::static_text(StatusCode::PAYLOAD_TOO_LARGE, &static_bodies::PAYLOAD_TOO_LARGE)
    }

    /// Plain-text response with the status' canonical reason as body.
    pub fn status_text(status: StatusCode, message: &str) -> Self {
        let body = if message.is_empty() {
            status.canonical_reason().unwrap_or("").to_string()
        } else {
            message.to_string()
        };
        Self::builder().status(status).text().body(body).build()
    }

    /// Create an empty response with given status.
    #[inline]
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    fn static_text(status: StatusCode, body: &Bytes) -> Self {
        Self::builder()
            .status(status)
            .text()
            .body(body.clone()) // Bytes::clone is cheap (Arc)
            .build()
    }

    // Getters

    /// Get the status code.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the response body.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Get a header value by string name (case-insensitive).
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    // Modifiers

    /// Add a header by string name and value. Invalid names/values are ignored.
    #[inline]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Convert into a hyper-compatible response.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

/// Builder for creating HTTP responses.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Option<HeaderMap>, // Lazy allocation
    body: Bytes,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBuilder {
    /// Create a new response builder.
    #[inline]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: None, // Don't allocate until needed
            body: Bytes::new(),
        }
    }

    /// Set the status code.
    #[inline]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Add header with typed HeaderName and HeaderValue (zero-alloc for static values).
    #[inline]
    pub fn header_value(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .insert(name, value);
        self
    }

    /// Add header by strings.
    #[inline]
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.headers
                .get_or_insert_with(HeaderMap::new)
                .insert(name, value);
        }
        self
    }

    /// Set the body.
    #[inline]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set Content-Type to application/json (uses static HeaderValue).
    #[inline]
    pub fn json(self) -> Self {
        self.header_value(header::CONTENT_TYPE, content_types::APPLICATION_JSON.clone())
    }

    /// Set Content-Type to text/plain (uses static HeaderValue).
    #[inline]
    pub fn text(self) -> Self {
        self.header_value(header::CONTENT_TYPE, content_types::TEXT_PLAIN.clone())
    }

    /// Build the response.
    #[inline]
    pub fn build(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers.unwrap_or_default(),
            body: self.body,
        }
    }
}
