// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Verify stage: consumes the queued key and flips `isChecked`.

use super::{parent_context, read_object, write_object, MESSAGING_SYSTEM_NAME};
use crate::config::StageConfig;
use crate::error::StageError;
use crate::fault::{Fault, RandomFault};
use crate::queue::QueueMessage;
use crate::record::{DomainRecord, ObjectKey};
use crate::store::ObjectStore;
use crate::trace::{self, attr, event_name, span_name};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::trace::{MESSAGING_DESTINATION_NAME, MESSAGING_SYSTEM};
use tracing::{info, warn};

/// Handles queue messages that reference a transformed record.
///
/// A record that was never transformed fails with [`StageError::Precondition`] and is left untouched.
/// Running the stage again on a checked record succeeds without writing it.
pub struct Verify<S, T, F = RandomFault> {
    config: StageConfig,
    store: S,
    tracer: T,
    fault: F,
}

impl<S, T, F> Verify<S, T, F>
where
    S: ObjectStore,
    T: Tracer,
    T::Span: Send + Sync + 'static,
    F: Fault,
{
    /// Creates the stage.
    pub fn new(config: StageConfig, store: S, tracer: T, fault: F) -> Self {
        Self { config, store, tracer, fault }
    }

    /// Stage configuration.
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Handles one message.
    pub async fn handle(&mut self, message: &QueueMessage) -> Result<(), StageError> {
        let key = ObjectKey::from(message.body.as_str());
        let correlation_id = trace::correlation_id(&message.attributes).unwrap_or(key.as_str()).to_owned();
        let (parent, propagated) = parent_context(&message.attributes, &key);
        let cx = parent.with_span(
            self.tracer
                .span_builder(span_name::VERIFY)
                .with_kind(SpanKind::Consumer)
                .with_attributes([
                    KeyValue::new(MESSAGING_SYSTEM, MESSAGING_SYSTEM_NAME),
                    KeyValue::new(MESSAGING_DESTINATION_NAME, self.config.queue().to_string()),
                    KeyValue::new(attr::OBJECT_KEY, key.to_string()),
                    KeyValue::new(attr::CORRELATION_ID, correlation_id.clone()),
                    KeyValue::new(attr::PROPAGATED, propagated),
                ])
                .start_with_context(&self.tracer, &parent),
        );

        let result = self.check(&cx, &key, &correlation_id).await;

        let span = cx.span();
        let resources = [KeyValue::new(attr::BUCKET_ID, self.config.bucket().to_string())];
        match &result {
            Ok(()) => {
                span.set_status(Status::Ok);
                trace::record_outcome(&span, event_name::VERIFY, true, resources);
                info!(%key, "record checked");
            },
            Err(err) => {
                trace::record_error(&span, "verifying record failed", err);
                trace::record_outcome(&span, event_name::VERIFY, false, resources);
            },
        }
        span.end();
        result
    }

    async fn check(&mut self, cx: &Context, key: &ObjectKey, correlation_id: &str) -> Result<(), StageError> {
        let object = read_object(&self.store, &self.tracer, cx, self.config.bucket(), key).await?;
        let mut record = DomainRecord::from_json(&object.body)?;
        if record.is_checked() {
            info!(%key, "record already checked");
            return Ok(());
        }
        if !record.mark_checked() {
            warn!(%key, "record reached verification without being updated");
            return Err(StageError::Precondition { key: key.to_faststr() });
        }
        let body = record.to_json()?;

        write_object(&self.store, &self.tracer, &mut self.fault, cx, correlation_id, self.config.bucket(), key, body.into_bytes()).await?;
        Ok(())
    }
}
