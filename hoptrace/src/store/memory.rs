// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! In-memory object store.

use super::{ObjectCreated, ObjectStore, StoredObject};
use crate::error::StorageError;
use crate::record::ObjectKey;
use crate::trace::Carrier;
use faststr::FastStr;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// [`MemoryObjectStore`] keeps objects in a map per bucket.
///
/// Writes to a bucket that was not declared up front fail with [`StorageError::NoSuchBucket`]. When
/// notifications are enabled, every put that creates a new key emits an [`ObjectCreated`]; overwrites
/// do not.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<HashMap<FastStr, HashMap<ObjectKey, StoredObject>>>,
    notifier: Mutex<Option<mpsc::UnboundedSender<ObjectCreated>>>,
}

impl MemoryObjectStore {
    /// Creates a store with the given buckets.
    pub fn new<B: Into<FastStr>>(buckets: impl IntoIterator<Item = B>) -> Self {
        Self {
            buckets: Mutex::new(buckets.into_iter().map(|b| (b.into(), HashMap::new())).collect()),
            notifier: Mutex::new(None),
        }
    }

    /// Enables create notifications and returns their receiving end.
    pub fn with_notifications(self) -> (Self, mpsc::UnboundedReceiver<ObjectCreated>) {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.notifier) = Some(tx);
        (self, rx)
    }

    /// Stops emitting notifications. The receiver drains what is pending and then ends.
    pub fn close_notifications(&self) {
        lock(&self.notifier).take();
    }

    /// Returns a copy of the object under `bucket/key`.
    pub fn object(&self, bucket: &str, key: &ObjectKey) -> Option<StoredObject> {
        lock(&self.buckets).get(bucket)?.get(key).cloned()
    }

    /// Number of objects in `bucket`.
    pub fn len(&self, bucket: &str) -> usize {
        lock(&self.buckets).get(bucket).map_or(0, HashMap::len)
    }

    /// Whether `bucket` holds no objects.
    pub fn is_empty(&self, bucket: &str) -> bool {
        self.len(bucket) == 0
    }

    fn put_sync(&self, bucket: &str, key: &ObjectKey, body: Vec<u8>, metadata: Carrier) -> Result<(), StorageError> {
        let created = {
            let mut buckets = lock(&self.buckets);
            let objects = buckets.get_mut(bucket).ok_or_else(|| StorageError::NoSuchBucket(FastStr::new(bucket)))?;
            objects
                .insert(
                    key.clone(),
                    StoredObject {
                        body,
                        metadata: metadata.clone(),
                    },
                )
                .is_none()
        };
        if created {
            if let Some(tx) = lock(&self.notifier).as_ref() {
                // a dropped receiver only means nobody listens anymore
                let _ = tx.send(ObjectCreated {
                    bucket: FastStr::new(bucket),
                    key: key.clone(),
                    metadata,
                });
            }
        }
        Ok(())
    }

    fn get_sync(&self, bucket: &str, key: &ObjectKey) -> Result<StoredObject, StorageError> {
        let buckets = lock(&self.buckets);
        let objects = buckets.get(bucket).ok_or_else(|| StorageError::NoSuchBucket(FastStr::new(bucket)))?;
        objects.get(key).cloned().ok_or_else(|| StorageError::NoSuchKey {
            bucket: FastStr::new(bucket),
            key: key.to_faststr(),
        })
    }
}

impl ObjectStore for MemoryObjectStore {
    async fn put<'s>(&'s self, bucket: &'s str, key: &'s ObjectKey, body: Vec<u8>, metadata: Carrier) -> Result<(), StorageError> {
        self.put_sync(bucket, key, body, metadata)
    }

    async fn get<'s>(&'s self, bucket: &'s str, key: &'s ObjectKey) -> Result<StoredObject, StorageError> {
        self.get_sync(bucket, key)
    }
}

#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
