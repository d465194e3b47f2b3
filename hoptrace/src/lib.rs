// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//!
//! hoptrace carries one logical trace across three independently-triggered stages:
//!
//! 1. [`Ingress`](stage::Ingress) handles an HTTP-shaped request and writes a [`DomainRecord`](record::DomainRecord)
//!    into an [`ObjectStore`](store::ObjectStore).
//! 2. [`Transform`](stage::Transform) reacts to the [`ObjectCreated`](store::ObjectCreated) notification, flips
//!    `isUpdated`, writes the record back under the same key and publishes the key to a
//!    [`MessageQueue`](queue::MessageQueue).
//! 3. [`Verify`](stage::Verify) consumes the message and flips `isChecked`.
//!
//! No hop shares memory or a call stack with another. The trace identity rides on object metadata and
//! message attributes as W3C trace context, next to an explicit correlation id. Every storage write
//! consults a [`Fault`](fault::Fault) so that failures are reported on the trace exactly as real ones are.
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod fault;
pub mod http;
pub mod queue;
pub mod record;
pub mod stage;
pub mod store;
pub mod trace;

pub use config::StageConfig;
pub use error::{ConfigError, PublishError, StageError, StorageError};
pub use record::{DomainRecord, ObjectKey};
