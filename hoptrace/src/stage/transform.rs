// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Transform stage: reacts to object creation, flips `isUpdated` and hands the key on.

use super::{parent_context, publish_message, read_object, write_object};
use crate::config::StageConfig;
use crate::error::StageError;
use crate::fault::{Fault, RandomFault};
use crate::queue::MessageQueue;
use crate::record::DomainRecord;
use crate::store::{ObjectCreated, ObjectStore};
use crate::trace::{self, attr, event_name, span_name};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use tracing::info;

/// Handles [`ObjectCreated`] notifications.
///
/// The stage span continues the writer's trace when the notification carries its context and is a
/// fresh root otherwise. Nothing is retried here; a returned error is the signal for the notifier to
/// redeliver.
pub struct Transform<S, Q, T, F = RandomFault> {
    config: StageConfig,
    store: S,
    queue: Q,
    tracer: T,
    fault: F,
}

impl<S, Q, T, F> Transform<S, Q, T, F>
where
    S: ObjectStore,
    Q: MessageQueue,
    T: Tracer,
    T::Span: Send + Sync + 'static,
    F: Fault,
{
    /// Creates the stage.
    pub fn new(config: StageConfig, store: S, queue: Q, tracer: T, fault: F) -> Self {
        Self {
            config,
            store,
            queue,
            tracer,
            fault,
        }
    }

    /// Stage configuration.
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Handles one notification.
    pub async fn handle(&mut self, event: &ObjectCreated) -> Result<(), StageError> {
        let correlation_id = trace::correlation_id(&event.metadata).unwrap_or(event.key.as_str()).to_owned();
        let (parent, propagated) = parent_context(&event.metadata, &event.key);
        let cx = parent.with_span(
            self.tracer
                .span_builder(span_name::TRANSFORM)
                .with_kind(SpanKind::Consumer)
                .with_attributes([
                    KeyValue::new(attr::BUCKET_ID, event.bucket.to_string()),
                    KeyValue::new(attr::OBJECT_KEY, event.key.to_string()),
                    KeyValue::new(attr::CORRELATION_ID, correlation_id.clone()),
                    KeyValue::new(attr::PROPAGATED, propagated),
                ])
                .start_with_context(&self.tracer, &parent),
        );

        let result = self.update(&cx, event, &correlation_id).await;

        let span = cx.span();
        let resources = [
            KeyValue::new(attr::BUCKET_ID, event.bucket.to_string()),
            KeyValue::new(attr::QUEUE_ID, self.config.queue().to_string()),
        ];
        match &result {
            Ok(()) => {
                span.set_status(Status::Ok);
                trace::record_outcome(&span, event_name::TRANSFORM, true, resources);
                info!(key = %event.key, "record transformed");
            },
            Err(err) => {
                trace::record_error(&span, "transforming record failed", err);
                trace::record_outcome(&span, event_name::TRANSFORM, false, resources);
            },
        }
        span.end();
        result
    }

    async fn update(&mut self, cx: &Context, event: &ObjectCreated, correlation_id: &str) -> Result<(), StageError> {
        let object = read_object(&self.store, &self.tracer, cx, &event.bucket, &event.key).await?;
        let mut record = DomainRecord::from_json(&object.body)?;
        record.mark_updated();
        let body = record.to_json()?;

        write_object(&self.store, &self.tracer, &mut self.fault, cx, correlation_id, &event.bucket, &event.key, body.into_bytes()).await?;
        publish_message(&self.queue, &self.tracer, cx, correlation_id, self.config.queue(), &event.key).await?;
        Ok(())
    }
}
