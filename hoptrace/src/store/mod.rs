// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! Object store collaborator.

use crate::error::StorageError;
use crate::record::ObjectKey;
use crate::trace::Carrier;
use faststr::FastStr;
use std::future::Future;
use std::sync::Arc;

pub mod memory;
pub use memory::MemoryObjectStore;

/// [`ObjectStore`] is the put/get surface the stages need from object storage.
pub trait ObjectStore: Send + Sync + 'static {
    /// `put` stores `body` with user `metadata` under `bucket/key`, replacing any previous object.
    fn put<'s>(&'s self, bucket: &'s str, key: &'s ObjectKey, body: Vec<u8>, metadata: Carrier) -> impl Future<Output = Result<(), StorageError>> + Send;
    /// `get` returns the object stored under `bucket/key`.
    fn get<'s>(&'s self, bucket: &'s str, key: &'s ObjectKey) -> impl Future<Output = Result<StoredObject, StorageError>> + Send;
}

impl<S: ObjectStore> ObjectStore for Arc<S> {
    fn put<'s>(&'s self, bucket: &'s str, key: &'s ObjectKey, body: Vec<u8>, metadata: Carrier) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).put(bucket, key, body, metadata)
    }

    fn get<'s>(&'s self, bucket: &'s str, key: &'s ObjectKey) -> impl Future<Output = Result<StoredObject, StorageError>> + Send {
        (**self).get(bucket, key)
    }
}

/// An object body with its user metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredObject {
    /// object body
    pub body: Vec<u8>,
    /// user metadata, carries the trace context of the writer
    pub metadata: Carrier,
}

/// Notification emitted when an object is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectCreated {
    /// bucket name
    pub bucket: FastStr,
    /// object key
    pub key: ObjectKey,
    /// user metadata of the created object
    pub metadata: Carrier,
}
