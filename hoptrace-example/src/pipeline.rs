// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use clap::Parser;
use demo::init_tracing;
use hoptrace::fault::RandomFault;
use hoptrace::http::{self, header, HeaderValue, Method};
use hoptrace::queue::{MemoryQueue, QueueMessage};
use hoptrace::stage::{Ingress, Transform, Verify};
use hoptrace::store::{MemoryObjectStore, ObjectCreated};
use hoptrace::StageConfig;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::Tracer;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

#[derive(Parser)]
struct Flags {
    /// Sets the bucket records are stored in.
    #[clap(long, env = "INPUT_S3_BUCKET_NAME")]
    bucket: String,
    /// Sets the queue the transform stage publishes to.
    #[clap(long, env = "OUTPUT_QUEUE_NAME")]
    queue: String,
    /// Sets the service name reported to the tracing backend.
    #[clap(long, env = "OTEL_SERVICE_NAME")]
    service_name: String,
    /// Sets how many ingress requests are sent.
    #[clap(long, default_value_t = 30)]
    requests: usize,
    /// Seeds the fault injectors. Every stage derives its own seed; without it they seed from the clock.
    #[clap(long)]
    seed: Option<u64>,
}

type Store = Arc<MemoryObjectStore>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let flags = Flags::parse();
    let config = StageConfig::new(flags.bucket, flags.queue, flags.service_name);
    config.validate()?;

    let provider = init_tracing(config.service_name())?;
    let tracer = || provider.tracer(config.service_name().to_string());

    let (store, notifications) = MemoryObjectStore::new([config.bucket().clone()]).with_notifications();
    let store = Arc::new(store);
    let (queue, messages) = MemoryQueue::new(config.queue().clone());

    // each stage owns its generator, as separate processes would
    let transform = Transform::new(config.clone(), store.clone(), queue, tracer(), fault(flags.seed, 1));
    let verify = Verify::new(config.clone(), store.clone(), tracer(), fault(flags.seed, 2));
    let transform_task = tokio::spawn(run_transform(transform, notifications));
    let verify_task = tokio::spawn(run_verify(verify, messages));

    let mut ingress = Ingress::new(config.clone(), store.clone(), tracer(), fault(flags.seed, 0));
    let mut created = 0;
    for n in 0..flags.requests {
        let mut request = http::request(Method::POST, "/create");
        request.headers.insert(header::HOST, HeaderValue::from_static("localhost"));
        request.headers.insert(header::USER_AGENT, HeaderValue::from_static(concat!("hoptrace-example/", env!("CARGO_PKG_VERSION"))));
        request.headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        let response = ingress.handle(&request).await;
        if http::is_success(&response) {
            created += 1;
        } else {
            warn!(request = n, status = response.status_code, "ingress failed");
        }
    }

    // no more creates: the transform loop drains and ends, dropping the queue, which ends the verify loop
    store.close_notifications();
    let transformed = transform_task.await?;
    let checked = verify_task.await?;
    info!(requests = flags.requests, created, transformed, checked, "pipeline finished");

    for result in provider.force_flush() {
        if let Err(err) = result {
            warn!(error = %err, "flushing spans failed");
        }
    }
    opentelemetry::global::shutdown_tracer_provider();

    Ok(())
}

fn fault(seed: Option<u64>, stage: u64) -> RandomFault {
    seed.map_or_else(RandomFault::from_clock, |seed| RandomFault::with_seed(seed.wrapping_add(stage)))
}

async fn run_transform(mut stage: Transform<Store, MemoryQueue, Tracer>, mut notifications: UnboundedReceiver<ObjectCreated>) -> usize {
    let mut done = 0;
    while let Some(event) = notifications.recv().await {
        match stage.handle(&event).await {
            Ok(()) => done += 1,
            Err(err) => warn!(key = %event.key, error = %err, "transform failed, redelivery is up to the notifier"),
        }
    }
    done
}

async fn run_verify(mut stage: Verify<Store, Tracer>, mut messages: UnboundedReceiver<QueueMessage>) -> usize {
    let mut done = 0;
    while let Some(message) = messages.recv().await {
        match stage.handle(&message).await {
            Ok(()) => done += 1,
            Err(err) => warn!(key = %message.body, error = %err, "verify failed, redelivery is up to the queue"),
        }
    }
    done
}
