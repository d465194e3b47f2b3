// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Message queue collaborator.

use crate::error::PublishError;
use crate::trace::Carrier;
use std::future::Future;
use std::sync::Arc;

pub mod memory;
pub use memory::MemoryQueue;

/// [`MessageQueue`] is the publish surface the transform stage needs.
pub trait MessageQueue: Send + Sync + 'static {
    /// `send` enqueues `message` on `queue`.
    fn send<'s>(&'s self, queue: &'s str, message: QueueMessage) -> impl Future<Output = Result<(), PublishError>> + Send;
}

impl<Q: MessageQueue> MessageQueue for Arc<Q> {
    fn send<'s>(&'s self, queue: &'s str, message: QueueMessage) -> impl Future<Output = Result<(), PublishError>> + Send {
        (**self).send(queue, message)
    }
}

/// A queued message: the key of the object to verify plus string attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueMessage {
    /// object key
    pub body: String,
    /// message attributes, carries the trace context of the producer
    pub attributes: Carrier,
}

impl QueueMessage {
    /// Creates a message.
    pub fn new(body: impl Into<String>, attributes: Carrier) -> Self {
        Self {
            body: body.into(),
            attributes,
        }
    }
}
