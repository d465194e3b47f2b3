// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Provides building blocks for tracing across stages.
//!
//! A trace is logically a tree of causally-related spans. Stages do not share a call stack, so the
//! context of the span that produced an object or a message is written into that object's metadata
//! (or that message's attributes) as W3C trace context. The next stage extracts it and parents its
//! own span on it. When nothing can be extracted the stage starts a fresh trace and relies on the
//! correlation id alone.

use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{SpanRef, Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::collections::HashMap;
use std::fmt::Display;

/// String metadata carried by stored objects and queue messages.
pub type Carrier = HashMap<String, String>;

/// Carrier entry holding the correlation id of the transaction.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Span names.
pub mod span_name {
    /// Root span of the ingress stage.
    pub const INGRESS: &str = "ingress.handler";
    /// Root span of the transform stage.
    pub const TRANSFORM: &str = "transform.handler";
    /// Root span of the verify stage.
    pub const VERIFY: &str = "verify.handler";
    /// Object write.
    pub const PUT_OBJECT: &str = "S3.PutObject";
    /// Object read.
    pub const GET_OBJECT: &str = "S3.GetObject";
    /// Queue publish.
    pub const SEND_MESSAGE: &str = "SQS.SendMessage";
}

/// Terminal outcome event names.
pub mod event_name {
    /// Outcome of the ingress stage.
    pub const INGRESS: &str = "IngressOutcome";
    /// Outcome of the transform stage.
    pub const TRANSFORM: &str = "TransformOutcome";
    /// Outcome of the verify stage.
    pub const VERIFY: &str = "VerifyOutcome";
}

/// Attribute keys that have no semantic convention.
pub mod attr {
    /// Outcome flag of a terminal outcome event.
    pub const IS_SUCCESSFUL: &str = "is.successful";
    /// Bucket a stage wrote to or read from.
    pub const BUCKET_ID: &str = "bucket.id";
    /// Queue a stage published to or consumed from.
    pub const QUEUE_ID: &str = "queue.id";
    /// Key of the object being handled.
    pub const OBJECT_KEY: &str = "object.key";
    /// Correlation id of the transaction.
    pub const CORRELATION_ID: &str = "correlation.id";
    /// Whether the stage span continues a propagated trace.
    pub const PROPAGATED: &str = "trace.propagated";
}

/// Writes the span context of `cx` and the correlation id into a fresh carrier.
pub fn inject(cx: &Context, correlation_id: &str) -> Carrier {
    let mut carrier = Carrier::new();
    TraceContextPropagator::new().inject_context(cx, &mut carrier);
    carrier.insert(CORRELATION_HEADER.to_owned(), correlation_id.to_owned());
    carrier
}

/// Reads a remote parent context from `carrier`.
///
/// Returns `None` when the carrier holds no valid trace context.
pub fn extract(carrier: &Carrier) -> Option<Context> {
    let cx = TraceContextPropagator::new().extract(carrier);
    if cx.span().span_context().is_valid() {
        Some(cx)
    } else {
        None
    }
}

/// Correlation id stored in `carrier`, if any.
pub fn correlation_id(carrier: &Carrier) -> Option<&str> {
    carrier.get(CORRELATION_HEADER).map(String::as_str).filter(|id| !id.is_empty())
}

/// Marks `span` as failed with `message: err` as the status description.
pub fn record_error(span: &SpanRef<'_>, message: &str, err: &dyn Display) {
    span.set_status(Status::error(format!("{message}: {err}")));
}

/// Attaches the terminal outcome event of a stage.
///
/// `resources` name what the stage acted on, e.g. `bucket.id`.
pub fn record_outcome(span: &SpanRef<'_>, event: &'static str, successful: bool, resources: impl IntoIterator<Item = KeyValue>) {
    let mut attributes = vec![KeyValue::new(attr::IS_SUCCESSFUL, successful)];
    attributes.extend(resources);
    span.add_event(event, attributes);
}
