// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! In-memory queue.

use super::{MessageQueue, QueueMessage};
use crate::error::PublishError;
use faststr::FastStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// [`MemoryQueue`] delivers to a single named queue over an unbounded channel.
#[derive(Debug)]
pub struct MemoryQueue {
    name: FastStr,
    tx: mpsc::UnboundedSender<QueueMessage>,
    sent: AtomicUsize,
}

impl MemoryQueue {
    /// Creates the queue `name` and returns its consuming end.
    pub fn new(name: impl Into<FastStr>) -> (Self, mpsc::UnboundedReceiver<QueueMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            name: name.into(),
            tx,
            sent: AtomicUsize::new(0),
        };
        (queue, rx)
    }

    /// Queue name.
    pub fn name(&self) -> &FastStr {
        &self.name
    }

    /// Number of messages accepted so far.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Acquire)
    }
}

impl MessageQueue for MemoryQueue {
    async fn send<'s>(&'s self, queue: &'s str, message: QueueMessage) -> Result<(), PublishError> {
        if queue != self.name.as_str() {
            return Err(PublishError::NoSuchQueue(FastStr::new(queue)));
        }
        self.tx.send(message).map_err(|_| PublishError::Closed(self.name.clone()))?;
        self.sent.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
