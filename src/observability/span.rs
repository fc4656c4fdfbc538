//! Span handle over an OpenTelemetry context.
//!
//! A [`Span`] is mutated through `&self` so handler code can annotate the
//! request span it was handed. Ending is exactly-once: an explicit
//! [`Span::end`] or, failing that, the `Drop` impl.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use opentelemetry::trace::{SpanContext, Status, TraceContextExt, TraceId};
use opentelemetry::{Context, Key, KeyValue, Value};

/// Error recorded on spans that were dropped without being ended.
pub const DROPPED_SPAN_ERROR: &str = "span dropped before it was ended";

/// Event name used for recorded errors.
const EXCEPTION_EVENT: &str = "exception";
const EXCEPTION_MESSAGE: &str = "exception.message";

/// Open span handle.
pub struct Span {
    /// Context whose active span is this one; parent of child spans.
    cx: Context,
    ended: AtomicBool,
    errored: AtomicBool,
}

impl Span {
    pub(crate) fn new(cx: Context) -> Self {
        Self {
            cx,
            ended: AtomicBool::new(false),
            errored: AtomicBool::new(false),
        }
    }

    /// Context carrying this span, for starting children and propagation.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn span_context(&self) -> SpanContext {
        self.cx.span().span_context().clone()
    }

    pub fn trace_id(&self) -> TraceId {
        self.cx.span().span_context().trace_id()
    }

    /// False for unsampled or already ended spans.
    pub fn is_recording(&self) -> bool {
        !self.ended.load(Ordering::Acquire) && self.cx.span().is_recording()
    }

    pub fn set_attribute(&self, key: impl Into<Key>, value: impl Into<Value>) {
        self.cx.span().set_attribute(KeyValue::new(key, value));
    }

    pub fn set_attributes(&self, attrs: impl IntoIterator<Item = KeyValue>) {
        self.cx.span().set_attributes(attrs);
    }

    pub fn add_event(&self, name: impl Into<Cow<'static, str>>) {
        self.cx.span().add_event(name, Vec::new());
    }

    /// Record an error on the span. `None` is a no-op.
    ///
    /// Every error adds an `exception` event; the first one sets the status.
    pub fn record_error<E>(&self, err: Option<&E>)
    where
        E: fmt::Display + ?Sized,
    {
        let Some(err) = err else { return };
        if !self.is_recording() {
            return;
        }
        let message = err.to_string();
        let span = self.cx.span();
        span.add_event(
            EXCEPTION_EVENT,
            vec![KeyValue::new(EXCEPTION_MESSAGE, message.clone())],
        );
        if !self.errored.swap(true, Ordering::AcqRel) {
            span.set_status(Status::error(message));
        }
    }

    /// Mark the span successful unless an error was recorded.
    pub fn set_ok(&self) {
        if self.is_recording() && !self.has_error() {
            self.cx.span().set_status(Status::Ok);
        }
    }

    /// Whether an error was recorded.
    pub fn has_error(&self) -> bool {
        self.errored.load(Ordering::Acquire)
    }

    /// End the span and hand it to the batch processor.
    pub fn end(self) {
        self.finish(false);
    }

    /// End a span owned by a guard that cannot give it up by value.
    pub(crate) fn end_in_place(&self) {
        self.finish(false);
    }

    fn finish(&self, dropped: bool) {
        if self.ended.load(Ordering::Acquire) {
            return;
        }
        if dropped {
            self.record_error(Some(DROPPED_SPAN_ERROR));
        }
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cx.span().end();
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.finish(true);
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("context", &self.cx.span().span_context())
            .field("ended", &self.ended.load(Ordering::Relaxed))
            .finish()
    }
}
