// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Ingress stage: request in, record stored, response out.

use super::write_object;
use crate::config::StageConfig;
use crate::fault::{Fault, RandomFault};
use crate::http::{self, HttpRequest, HttpResponse};
use crate::record::{DomainRecord, ObjectKey};
use crate::store::ObjectStore;
use crate::trace::{self, attr, event_name, span_name};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::trace::{
    FAAS_TRIGGER, HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE, NETWORK_PROTOCOL_NAME, NETWORK_PROTOCOL_VERSION, SERVER_ADDRESS,
    URL_SCHEME, USER_AGENT_ORIGINAL,
};
use tracing::{error, info};

/// Handles inbound requests: creates a [`DomainRecord`] under a fresh root span and stores it.
///
/// The response is 200 with the record JSON when the write succeeded, 500 with
/// [`FAILED_BODY`](crate::http::FAILED_BODY) otherwise.
pub struct Ingress<S, T, F = RandomFault> {
    config: StageConfig,
    store: S,
    tracer: T,
    fault: F,
}

impl<S, T, F> Ingress<S, T, F>
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

    /// Handles one request.
    pub async fn handle(&mut self, request: &HttpRequest) -> HttpResponse {
        let cx = Context::new().with_span(self.start_span(request));
        let response = self.create(&cx).await;

        let span = cx.span();
        span.set_attribute(KeyValue::new(HTTP_RESPONSE_STATUS_CODE, response.status_code));
        span.end();
        response
    }

    fn start_span(&self, request: &HttpRequest) -> T::Span {
        let protocol = http::protocol(request);
        let (protocol_name, protocol_version) = protocol.split_once('/').unwrap_or(("http", protocol));
        self.tracer
            .span_builder(span_name::INGRESS)
            .with_kind(SpanKind::Server)
            .with_attributes([
                KeyValue::new(FAAS_TRIGGER, "http"),
                KeyValue::new(HTTP_REQUEST_METHOD, request.http_method.to_string()),
                KeyValue::new(NETWORK_PROTOCOL_NAME, protocol_name.to_ascii_lowercase()),
                KeyValue::new(NETWORK_PROTOCOL_VERSION, protocol_version.to_owned()),
                KeyValue::new(HTTP_ROUTE, request.resource.clone().unwrap_or_default()),
                KeyValue::new(URL_SCHEME, http::header(request, "X-Forwarded-Proto").to_owned()),
                KeyValue::new(USER_AGENT_ORIGINAL, http::header(request, "User-Agent").to_owned()),
                KeyValue::new(SERVER_ADDRESS, http::header(request, "Host").to_owned()),
            ])
            .start_with_context(&self.tracer, &Context::new())
    }

    async fn create(&mut self, cx: &Context) -> HttpResponse {
        let bucket = KeyValue::new(attr::BUCKET_ID, self.config.bucket().to_string());

        let body = match DomainRecord::default().to_json() {
            Ok(body) => body,
            Err(err) => {
                error!(error = %err, "encoding record failed");
                let span = cx.span();
                trace::record_error(&span, "encoding record failed", &err);
                trace::record_outcome(&span, event_name::INGRESS, false, [bucket]);
                return http::failed();
            },
        };

        let key = ObjectKey::now();
        let written = write_object(&self.store, &self.tracer, &mut self.fault, cx, key.as_str(), self.config.bucket(), &key, body.clone().into_bytes()).await;

        let span = cx.span();
        span.set_attribute(KeyValue::new(attr::OBJECT_KEY, key.to_string()));
        match written {
            Ok(()) => {
                span.set_status(Status::Ok);
                trace::record_outcome(&span, event_name::INGRESS, true, [bucket]);
                info!(%key, "record created");
                http::ok(body)
            },
            Err(err) => {
                trace::record_error(&span, "storing record failed", &err);
                trace::record_outcome(&span, event_name::INGRESS, false, [bucket]);
                http::failed()
            },
        }
    }
}
