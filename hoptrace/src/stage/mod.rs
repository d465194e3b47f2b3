// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! The three pipeline stages and the traced collaborator calls they share.
//!
//! Every collaborator call runs inside its own child span of the stage span. The span is ended before
//! the call's result is handed back, and failures are recorded on it with an error status carrying the
//! collaborator's own error text.

use crate::error::{PublishError, StorageError};
use crate::fault::{Fault, FAULT_BUCKET};
use crate::queue::{MessageQueue, QueueMessage};
use crate::record::ObjectKey;
use crate::store::{ObjectStore, StoredObject};
use crate::trace::{self, attr, span_name};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::trace::{MESSAGING_DESTINATION_NAME, MESSAGING_SYSTEM};
use tracing::{info, warn};

mod ingress;
mod transform;
mod verify;

pub use ingress::Ingress;
pub use transform::Transform;
pub use verify::Verify;

/// Messaging system reported on queue spans.
pub const MESSAGING_SYSTEM_NAME: &str = "aws_sqs";

/// Writes `body` under `bucket/key` inside a client span parented on `parent`.
///
/// `fault` is consulted once before the call. When it fires, the write goes to [`FAULT_BUCKET`] so the
/// store itself rejects it. The object metadata carries the write span's context and `correlation_id`.
#[allow(clippy::too_many_arguments)]
pub async fn write_object<S, T, F>(
    store: &S,
    tracer: &T,
    fault: &mut F,
    parent: &Context,
    correlation_id: &str,
    bucket: &str,
    key: &ObjectKey,
    body: Vec<u8>,
) -> Result<(), StorageError>
where
    S: ObjectStore,
    T: Tracer,
    T::Span: Send + Sync + 'static,
    F: Fault,
{
    let cx = parent.with_span(
        tracer
            .span_builder(span_name::PUT_OBJECT)
            .with_kind(SpanKind::Client)
            .with_attributes([KeyValue::new(attr::BUCKET_ID, bucket.to_owned()), KeyValue::new(attr::OBJECT_KEY, key.to_string())])
            .start_with_context(tracer, parent),
    );

    let target = if fault.inject() {
        warn!(%key, bucket, "injecting storage fault, redirecting write to {FAULT_BUCKET}");
        FAULT_BUCKET
    } else {
        bucket
    };

    info!(%key, bucket = target, "storing record");
    let result = store.put(target, key, body, trace::inject(&cx, correlation_id)).await;

    let span = cx.span();
    match &result {
        Ok(()) => {
            span.set_status(Status::Ok);
            info!(%key, "storing record succeeded");
        },
        Err(err) => {
            trace::record_error(&span, "storing record failed", err);
            warn!(%key, error = %err, "storing record failed");
        },
    }
    span.end();
    result
}

/// Reads `bucket/key` inside a client span parented on `parent`.
pub async fn read_object<S, T>(store: &S, tracer: &T, parent: &Context, bucket: &str, key: &ObjectKey) -> Result<StoredObject, StorageError>
where
    S: ObjectStore,
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    let cx = parent.with_span(
        tracer
            .span_builder(span_name::GET_OBJECT)
            .with_kind(SpanKind::Client)
            .with_attributes([KeyValue::new(attr::BUCKET_ID, bucket.to_owned()), KeyValue::new(attr::OBJECT_KEY, key.to_string())])
            .start_with_context(tracer, parent),
    );

    info!(%key, bucket, "reading record");
    let result = store.get(bucket, key).await;

    let span = cx.span();
    match &result {
        Ok(_) => span.set_status(Status::Ok),
        Err(err) => {
            trace::record_error(&span, "reading record failed", err);
            warn!(%key, error = %err, "reading record failed");
        },
    }
    span.end();
    result
}

/// Publishes `key` to `queue` inside a producer span parented on `parent`.
///
/// The message attributes carry the producer span's context and `correlation_id`.
pub async fn publish_message<Q, T>(queue: &Q, tracer: &T, parent: &Context, correlation_id: &str, queue_name: &str, key: &ObjectKey) -> Result<(), PublishError>
where
    Q: MessageQueue,
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    let cx = parent.with_span(
        tracer
            .span_builder(span_name::SEND_MESSAGE)
            .with_kind(SpanKind::Producer)
            .with_attributes([
                KeyValue::new(MESSAGING_SYSTEM, MESSAGING_SYSTEM_NAME),
                KeyValue::new(MESSAGING_DESTINATION_NAME, queue_name.to_owned()),
                KeyValue::new(attr::OBJECT_KEY, key.to_string()),
            ])
            .start_with_context(tracer, parent),
    );

    info!(%key, queue = queue_name, "publishing record key");
    let message = QueueMessage::new(key.as_str(), trace::inject(&cx, correlation_id));
    let result = queue.send(queue_name, message).await;

    let span = cx.span();
    match &result {
        Ok(()) => span.set_status(Status::Ok),
        Err(err) => {
            trace::record_error(&span, "publishing record key failed", err);
            warn!(%key, error = %err, "publishing record key failed");
        },
    }
    span.end();
    result
}

/// Parent context for a stage triggered by an event carrying `carrier`.
///
/// Falls back to an empty context, which makes the stage span the root of a new trace.
fn parent_context(carrier: &trace::Carrier, key: &ObjectKey) -> (Context, bool) {
    match trace::extract(carrier) {
        Some(cx) => (cx, true),
        None => {
            info!(%key, "event carries no trace context, starting a new trace");
            (Context::new(), false)
        },
    }
}
