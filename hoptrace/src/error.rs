// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Error taxonomy of the pipeline.

use faststr::FastStr;

/// A read or write against the object store failed, injected faults included.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The target bucket does not exist.
    #[error("the specified bucket does not exist: {0}")]
    NoSuchBucket(FastStr),
    /// No object is stored under the key.
    #[error("the specified key does not exist: {bucket}/{key}")]
    NoSuchKey {
        /// bucket name
        bucket: FastStr,
        /// object key
        key: FastStr,
    },
    /// Any other store failure.
    #[error("object store failure: {0}")]
    Backend(FastStr),
}

/// Sending a message to the queue failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The target queue does not exist.
    #[error("the specified queue does not exist: {0}")]
    NoSuchQueue(FastStr),
    /// The queue no longer accepts messages.
    #[error("queue is closed: {0}")]
    Closed(FastStr),
}

/// Failure of one stage invocation.
///
/// Storage and publish failures have already been recorded on the active span when a stage returns
/// one of these; the invoker only needs to decide about redelivery.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    /// The record could not be encoded or decoded.
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The object store rejected a read or write.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The queue rejected the message.
    #[error(transparent)]
    Publish(#[from] PublishError),
    /// The verify stage received a record that was never transformed.
    #[error("record {key} has not been updated")]
    Precondition {
        /// object key
        key: FastStr,
    },
}

/// Startup configuration is incomplete.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is empty or absent.
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
}
