use assert_matches::assert_matches;
use hoptrace::fault::{Fault, NeverFault, RandomFault, ScriptedFault};
use hoptrace::http::{self, header, HeaderValue, HttpRequest, Method, FAILED_BODY};
use hoptrace::queue::{MemoryQueue, QueueMessage};
use hoptrace::stage::{Ingress, Transform, Verify};
use hoptrace::store::{MemoryObjectStore, ObjectCreated, ObjectStore};
use hoptrace::trace::{attr, span_name, Carrier};
use hoptrace::{DomainRecord, ObjectKey, PublishError, StageConfig, StageError, StorageError};
use opentelemetry::trace::{SpanId, SpanKind, Status, TracerProvider as _};
use opentelemetry::Value;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::testing::trace::{InMemorySpanExporter, InMemorySpanExporterBuilder};
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

const BUCKET: &str = "records";
const QUEUE: &str = "checks";

struct Harness {
    provider: TracerProvider,
    exporter: InMemorySpanExporter,
    store: Arc<MemoryObjectStore>,
    notifications: UnboundedReceiver<ObjectCreated>,
    queue: Arc<MemoryQueue>,
    messages: UnboundedReceiver<QueueMessage>,
}

impl Harness {
    fn new() -> Self {
        let exporter = InMemorySpanExporterBuilder::new().build();
        let provider = TracerProvider::builder().with_simple_exporter(exporter.clone()).build();
        let (store, notifications) = MemoryObjectStore::new([BUCKET]).with_notifications();
        let (queue, messages) = MemoryQueue::new(QUEUE);
        Self {
            provider,
            exporter,
            store: Arc::new(store),
            notifications,
            queue: Arc::new(queue),
            messages,
        }
    }

    fn config(&self) -> StageConfig {
        StageConfig::new(BUCKET, QUEUE, "hoptrace-test")
    }

    fn tracer(&self) -> Tracer {
        self.provider.tracer("hoptrace-test")
    }

    fn ingress<F: Fault>(&self, fault: F) -> Ingress<Arc<MemoryObjectStore>, Tracer, F> {
        Ingress::new(self.config(), self.store.clone(), self.tracer(), fault)
    }

    fn transform<F: Fault>(&self, fault: F) -> Transform<Arc<MemoryObjectStore>, Arc<MemoryQueue>, Tracer, F> {
        Transform::new(self.config(), self.store.clone(), self.queue.clone(), self.tracer(), fault)
    }

    fn verify<F: Fault>(&self, fault: F) -> Verify<Arc<MemoryObjectStore>, Tracer, F> {
        Verify::new(self.config(), self.store.clone(), self.tracer(), fault)
    }

    fn record(&self, key: &ObjectKey) -> DomainRecord {
        let object = self.store.object(BUCKET, key).expect("stored object");
        DomainRecord::from_json(&object.body).expect("valid record")
    }

    fn spans(&self) -> Vec<SpanData> {
        self.exporter.get_finished_spans().expect("finished spans")
    }

    fn reset_spans(&self) {
        self.exporter.reset();
    }
}

fn request() -> HttpRequest {
    let mut request = http::request(Method::POST, "/create");
    request.headers.insert(header::HOST, HeaderValue::from_static("api.example.com"));
    request.headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.4.0"));
    request.headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
    request
}

fn span<'a>(spans: &'a [SpanData], name: &str) -> &'a SpanData {
    spans.iter().find(|s| s.name == name).unwrap_or_else(|| panic!("no span named {name}"))
}

fn attribute<'a>(span: &'a SpanData, key: &str) -> Option<&'a Value> {
    span.attributes.iter().find(|kv| kv.key.as_str() == key).map(|kv| &kv.value)
}

fn outcome(span: &SpanData) -> Option<bool> {
    let event = span.events.iter().find(|e| e.name.ends_with("Outcome"))?;
    event.attributes.iter().find(|kv| kv.key.as_str() == attr::IS_SUCCESSFUL).and_then(|kv| match kv.value {
        Value::Bool(successful) => Some(successful),
        _ => None,
    })
}

/// Runs ingress without faults and returns the created key.
async fn created(harness: &mut Harness) -> ObjectCreated {
    let response = harness.ingress(NeverFault).handle(&request()).await;
    assert!(http::is_success(&response));
    harness.notifications.try_recv().expect("create notification")
}

#[tokio::test]
async fn ingress_stores_record() {
    let mut harness = Harness::new();
    let response = harness.ingress(NeverFault).handle(&request()).await;

    assert_eq!(response.status_code, 200);
    assert_eq!(http::body_text(&response), r#"{"item":"test","isUpdated":false,"isChecked":false}"#);
    let body: DomainRecord = serde_json::from_str(http::body_text(&response)).unwrap();
    assert!(!body.is_updated() && !body.is_checked());
    assert_eq!(harness.store.len(BUCKET), 1);

    let event = harness.notifications.try_recv().unwrap();
    assert_eq!(harness.record(&event.key), DomainRecord::default());

    let spans = harness.spans();
    assert_eq!(spans.len(), 2);
    let root = span(&spans, span_name::INGRESS);
    let put = span(&spans, span_name::PUT_OBJECT);
    assert_eq!(root.span_kind, SpanKind::Server);
    assert_eq!(root.parent_span_id, SpanId::INVALID);
    assert_eq!(root.status, Status::Ok);
    assert_eq!(outcome(root), Some(true));
    assert_eq!(attribute(root, "http.request.method"), Some(&Value::from("POST")));
    assert_eq!(attribute(root, "server.address"), Some(&Value::from("api.example.com")));
    assert_eq!(attribute(root, "http.response.status_code"), Some(&Value::I64(200)));
    assert_eq!(attribute(root, "network.protocol.name"), Some(&Value::from("http")));
    assert_eq!(attribute(root, "network.protocol.version"), Some(&Value::from("1.1")));
    assert_eq!(attribute(root, "url.scheme"), Some(&Value::from("https")));

    assert_eq!(put.span_kind, SpanKind::Client);
    assert_eq!(put.parent_span_id, root.span_context.span_id());
    assert_eq!(put.span_context.trace_id(), root.span_context.trace_id());
    assert_eq!(put.status, Status::Ok);

    // the stored object names its writer and transaction
    assert!(event.metadata.contains_key("traceparent"));
    assert_eq!(event.metadata.get("x-correlation-id"), Some(&event.key.to_string()));
}

#[tokio::test]
async fn ingress_reports_injected_fault() {
    let mut harness = Harness::new();
    let response = harness.ingress(ScriptedFault::once()).handle(&request()).await;

    assert_eq!(response.status_code, 500);
    assert_eq!(http::body_text(&response), FAILED_BODY);
    assert!(harness.store.is_empty(BUCKET));
    assert!(harness.notifications.try_recv().is_err());

    let spans = harness.spans();
    let root = span(&spans, span_name::INGRESS);
    let put = span(&spans, span_name::PUT_OBJECT);
    assert_matches!(&root.status, Status::Error { description } if description.contains("wrong-bucket-name"));
    assert_eq!(outcome(root), Some(false));
    assert_eq!(attribute(root, "http.response.status_code"), Some(&Value::I64(500)));
    assert_matches!(&put.status, Status::Error { description } if description.starts_with("storing record failed"));
}

#[tokio::test]
async fn transform_updates_and_publishes() {
    let mut harness = Harness::new();
    let event = created(&mut harness).await;
    let ingress_put = harness.spans().into_iter().find(|s| s.name == span_name::PUT_OBJECT).unwrap();
    harness.reset_spans();

    harness.transform(NeverFault).handle(&event).await.unwrap();

    let record = harness.record(&event.key);
    assert!(record.is_updated());
    assert!(!record.is_checked());
    assert_eq!(harness.store.len(BUCKET), 1);
    assert_eq!(harness.queue.sent(), 1);

    let message = harness.messages.try_recv().unwrap();
    assert_eq!(message.body, event.key.as_str());
    assert!(harness.messages.try_recv().is_err());

    // an overwrite is not a create
    assert!(harness.notifications.try_recv().is_err());

    let spans = harness.spans();
    let root = span(&spans, span_name::TRANSFORM);
    assert_eq!(root.span_kind, SpanKind::Consumer);
    assert_eq!(root.span_context.trace_id(), ingress_put.span_context.trace_id());
    assert_eq!(root.parent_span_id, ingress_put.span_context.span_id());
    assert_eq!(attribute(root, attr::PROPAGATED), Some(&Value::Bool(true)));
    assert_eq!(root.status, Status::Ok);
    assert_eq!(outcome(root), Some(true));

    let send = span(&spans, span_name::SEND_MESSAGE);
    assert_eq!(send.span_kind, SpanKind::Producer);
    assert_eq!(send.parent_span_id, root.span_context.span_id());
    for name in [span_name::GET_OBJECT, span_name::PUT_OBJECT] {
        assert_eq!(span(&spans, name).parent_span_id, root.span_context.span_id());
    }
}

#[tokio::test]
async fn transform_without_trace_context_starts_new_trace() {
    let harness = Harness::new();
    let key = ObjectKey::now();
    harness.store.put(BUCKET, &key, DomainRecord::default().to_json().unwrap().into_bytes(), Carrier::new()).await.unwrap();
    let event = ObjectCreated {
        bucket: BUCKET.into(),
        key: key.clone(),
        metadata: Carrier::new(),
    };
    harness.reset_spans();

    harness.transform(NeverFault).handle(&event).await.unwrap();

    let spans = harness.spans();
    let root = span(&spans, span_name::TRANSFORM);
    assert_eq!(root.parent_span_id, SpanId::INVALID);
    assert_eq!(attribute(root, attr::PROPAGATED), Some(&Value::Bool(false)));
    assert_eq!(attribute(root, attr::CORRELATION_ID), Some(&Value::from(key.to_string())));
    assert!(harness.record(&key).is_updated());
}

#[tokio::test]
async fn transform_write_fault_skips_publish() {
    let mut harness = Harness::new();
    let event = created(&mut harness).await;
    harness.reset_spans();

    let result = harness.transform(ScriptedFault::once()).handle(&event).await;

    assert_matches!(result, Err(StageError::Storage(StorageError::NoSuchBucket(_))));
    assert_eq!(harness.queue.sent(), 0);
    // the original record is intact
    assert_eq!(harness.record(&event.key), DomainRecord::default());

    let spans = harness.spans();
    let root = span(&spans, span_name::TRANSFORM);
    assert_matches!(root.status, Status::Error { .. });
    assert_eq!(outcome(root), Some(false));
    assert!(spans.iter().all(|s| s.name != span_name::SEND_MESSAGE));
}

#[tokio::test]
async fn transform_reports_publish_failure() {
    let mut harness = Harness::new();
    let event = created(&mut harness).await;
    let (closed, rx) = MemoryQueue::new(QUEUE);
    drop(rx);
    harness.reset_spans();

    let mut transform = Transform::new(harness.config(), harness.store.clone(), closed, harness.tracer(), NeverFault);
    let result = transform.handle(&event).await;

    assert_matches!(result, Err(StageError::Publish(PublishError::Closed(_))));
    let spans = harness.spans();
    assert_matches!(span(&spans, span_name::SEND_MESSAGE).status, Status::Error { .. });
    assert_matches!(span(&spans, span_name::TRANSFORM).status, Status::Error { .. });
    assert_eq!(outcome(span(&spans, span_name::TRANSFORM)), Some(false));
}

#[tokio::test]
async fn transform_missing_object() {
    let harness = Harness::new();
    let event = ObjectCreated {
        bucket: BUCKET.into(),
        key: ObjectKey::from("404"),
        metadata: Carrier::new(),
    };
    let result = harness.transform(NeverFault).handle(&event).await;
    assert_matches!(result, Err(StageError::Storage(StorageError::NoSuchKey { .. })));
    assert_matches!(span(&harness.spans(), span_name::GET_OBJECT).status, Status::Error { .. });
}

#[tokio::test]
async fn verify_checks_record() {
    let mut harness = Harness::new();
    let event = created(&mut harness).await;
    harness.transform(NeverFault).handle(&event).await.unwrap();
    let message = harness.messages.try_recv().unwrap();
    let send = harness.spans().into_iter().find(|s| s.name == span_name::SEND_MESSAGE).unwrap();
    harness.reset_spans();

    harness.verify(NeverFault).handle(&message).await.unwrap();

    let record = harness.record(&event.key);
    assert!(record.is_updated() && record.is_checked());

    let spans = harness.spans();
    let root = span(&spans, span_name::VERIFY);
    assert_eq!(root.span_kind, SpanKind::Consumer);
    assert_eq!(root.status, Status::Ok);
    assert_eq!(outcome(root), Some(true));
    assert_eq!(root.parent_span_id, send.span_context.span_id());
    assert_eq!(root.span_context.trace_id(), send.span_context.trace_id());
    assert_eq!(attribute(root, attr::CORRELATION_ID), Some(&Value::from(event.key.to_string())));
}

#[tokio::test]
async fn verify_rejects_unmutated_record() {
    let harness = Harness::new();
    let key = ObjectKey::now();
    let body = DomainRecord::default().to_json().unwrap().into_bytes();
    harness.store.put(BUCKET, &key, body.clone(), Carrier::new()).await.unwrap();
    harness.reset_spans();

    let message = QueueMessage::new(key.as_str(), Carrier::new());
    let result = harness.verify(NeverFault).handle(&message).await;

    assert_matches!(result, Err(StageError::Precondition { key: k }) if k.as_str() == key.as_str());
    assert_eq!(harness.store.object(BUCKET, &key).unwrap().body, body);

    let spans = harness.spans();
    let root = span(&spans, span_name::VERIFY);
    assert_matches!(&root.status, Status::Error { description } if description.contains("has not been updated"));
    assert_eq!(outcome(root), Some(false));
    assert!(spans.iter().all(|s| s.name != span_name::PUT_OBJECT));

    // redelivery fails the same way
    let again = harness.verify(NeverFault).handle(&message).await;
    assert_matches!(again, Err(StageError::Precondition { .. }));
}

#[tokio::test]
async fn verify_is_idempotent() {
    let mut harness = Harness::new();
    let event = created(&mut harness).await;
    harness.transform(NeverFault).handle(&event).await.unwrap();
    let message = harness.messages.try_recv().unwrap();

    let mut verify = harness.verify(NeverFault);
    verify.handle(&message).await.unwrap();
    verify.handle(&message).await.unwrap();

    let record = harness.record(&event.key);
    assert!(record.is_checked());
}

#[tokio::test]
async fn verify_rerun_skips_write() {
    let mut harness = Harness::new();
    let event = created(&mut harness).await;
    harness.transform(NeverFault).handle(&event).await.unwrap();
    let message = harness.messages.try_recv().unwrap();
    harness.verify(NeverFault).handle(&message).await.unwrap();
    let checked = harness.store.object(BUCKET, &event.key).unwrap();
    harness.reset_spans();

    // a fault on the next write must not matter: a checked record is not written again
    let mut verify = harness.verify(ScriptedFault::once());
    verify.handle(&message).await.unwrap();

    assert_eq!(harness.store.object(BUCKET, &event.key).unwrap(), checked);
    let spans = harness.spans();
    let root = span(&spans, span_name::VERIFY);
    assert_eq!(root.status, Status::Ok);
    assert_eq!(outcome(root), Some(true));
    assert!(spans.iter().all(|s| s.name != span_name::PUT_OBJECT));
}

#[tokio::test]
async fn verify_missing_object() {
    let harness = Harness::new();
    let message = QueueMessage::new("404", Carrier::new());

    let result = harness.verify(NeverFault).handle(&message).await;

    assert_matches!(result, Err(StageError::Storage(StorageError::NoSuchKey { .. })));
    let spans = harness.spans();
    assert_matches!(&span(&spans, span_name::GET_OBJECT).status, Status::Error { description } if description.starts_with("reading record failed"));
    let root = span(&spans, span_name::VERIFY);
    assert_matches!(root.status, Status::Error { .. });
    assert_eq!(outcome(root), Some(false));
    assert!(spans.iter().all(|s| s.name != span_name::PUT_OBJECT));
}

#[tokio::test]
async fn verify_write_fault_is_reported() {
    let mut harness = Harness::new();
    let event = created(&mut harness).await;
    harness.transform(NeverFault).handle(&event).await.unwrap();
    let message = harness.messages.try_recv().unwrap();
    harness.reset_spans();

    let result = harness.verify(ScriptedFault::once()).handle(&message).await;

    assert_matches!(result, Err(StageError::Storage(_)));
    assert!(!harness.record(&event.key).is_checked());
    assert_matches!(span(&harness.spans(), span_name::VERIFY).status, Status::Error { .. });
}

#[tokio::test]
async fn flags_stay_monotonic_under_random_faults() {
    let mut harness = Harness::new();
    let mut ingress = harness.ingress(RandomFault::with_seed(1));
    let mut transform = harness.transform(RandomFault::with_seed(2));
    let mut verify = harness.verify(RandomFault::with_seed(3));

    let mut stored = 0;
    for _ in 0..60 {
        let before = harness.store.len(BUCKET);
        let response = ingress.handle(&request()).await;
        // 200 exactly when the write landed
        assert_eq!(http::is_success(&response), harness.store.len(BUCKET) == before + 1);
        if http::is_success(&response) {
            stored += 1;
        }
    }

    let mut keys = Vec::new();
    while let Ok(event) = harness.notifications.try_recv() {
        keys.push(event.key.clone());
        let _ = transform.handle(&event).await;
    }
    while let Ok(message) = harness.messages.try_recv() {
        let _ = verify.handle(&message).await;
    }

    assert_eq!(keys.len(), stored);
    for key in &keys {
        let record = harness.record(key);
        assert!(!record.is_checked() || record.is_updated());
    }
}
