//! W3C Trace Context propagation over HTTP headers.
//!
//! Implements the `traceparent` header of the W3C Trace Context specification:
//! <https://www.w3.org/TR/trace-context/>
//!
//! Format: `traceparent: {version}-{trace-id}-{parent-id}-{trace-flags}`
//! Example: `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`

use std::collections::HashMap;

use http::HeaderMap;
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;

/// Header carrying the W3C trace context.
pub const TRACEPARENT: &str = "traceparent";

/// Extract the remote parent context from request headers.
///
/// A missing or malformed header yields an empty context, so the next span
/// starts a new trace.
pub fn extract_context(headers: &HeaderMap) -> Context {
    TraceContextPropagator::new().extract_with_context(&Context::new(), &HeaderExtractor(headers))
}

/// `traceparent` value of the span active in `cx`, if it has a valid context.
pub fn traceparent(cx: &Context) -> Option<String> {
    let mut carrier = HashMap::new();
    TraceContextPropagator::new().inject_context(cx, &mut carrier);
    carrier.remove(TRACEPARENT)
}

// Header extractor for OpenTelemetry propagation
struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}
