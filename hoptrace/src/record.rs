// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! The record that flows through the pipeline and the key it is stored under.

use faststr::FastStr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Payload written by ingress and used by every later stage.
pub const DEFAULT_ITEM: &str = "test";

/// The unit of work flowing through the pipeline.
///
/// Flags only ever move from `false` to `true`: `is_updated` is set by the transform stage and
/// `is_checked` by the verify stage, and only once `is_updated` holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    item: String,
    is_updated: bool,
    is_checked: bool,
}

impl DomainRecord {
    /// Creates a record with both flags unset.
    pub fn new(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            is_updated: false,
            is_checked: false,
        }
    }

    /// Opaque payload identifier.
    #[inline]
    pub fn item(&self) -> &str {
        &self.item
    }

    /// Whether the transform stage has processed the record.
    #[inline]
    pub fn is_updated(&self) -> bool {
        self.is_updated
    }

    /// Whether the verify stage has processed the record.
    #[inline]
    pub fn is_checked(&self) -> bool {
        self.is_checked
    }

    /// Marks the record as transformed. Idempotent.
    pub fn mark_updated(&mut self) {
        self.is_updated = true;
    }

    /// Marks the record as checked.
    ///
    /// Returns `false` and leaves the record untouched when it has not been transformed yet.
    pub fn mark_checked(&mut self) -> bool {
        if !self.is_updated {
            return false;
        }
        self.is_checked = true;
        true
    }

    /// Encodes the record as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decodes a record from JSON.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl Default for DomainRecord {
    fn default() -> Self {
        Self::new(DEFAULT_ITEM)
    }
}

static LAST_KEY_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Storage key of a record: the decimal millisecond timestamp taken when it was first written.
///
/// The key is kept verbatim through every rewrite and doubles as the correlation id of the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(FastStr);

impl ObjectKey {
    /// Picks a fresh key from the wall clock.
    ///
    /// Keys handed out by one process are strictly increasing, so two writes in the same millisecond
    /// still get distinct keys.
    pub fn now() -> Self {
        let wall = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default();
        let mut last = LAST_KEY_MILLIS.load(Ordering::Relaxed);
        loop {
            let next = wall.max(last + 1);
            match LAST_KEY_MILLIS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return Self::from_millis(next),
                Err(current) => last = current,
            }
        }
    }

    /// Key for the given millisecond timestamp.
    pub fn from_millis(millis: u64) -> Self {
        Self(FastStr::new(millis.to_string()))
    }

    /// Borrows the key as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the underlying string.
    #[inline]
    pub fn to_faststr(&self) -> FastStr {
        self.0.clone()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectKey {
    fn from(value: &str) -> Self {
        Self(FastStr::new(value))
    }
}

impl From<String> for ObjectKey {
    fn from(value: String) -> Self {
        Self(FastStr::new(value))
    }
}

impl From<FastStr> for ObjectKey {
    fn from(value: FastStr) -> Self {
        Self(value)
    }
}
