// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! Stage configuration.

use crate::error::ConfigError;
use faststr::FastStr;

/// Environment variable holding the bucket name.
pub const ENV_BUCKET: &str = "INPUT_S3_BUCKET_NAME";
/// Environment variable holding the queue name.
pub const ENV_QUEUE: &str = "OUTPUT_QUEUE_NAME";
/// Environment variable holding the tracing service name.
pub const ENV_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";

/// Configuration shared by the three stages.
///
/// Every field is required. Build it once at startup, call [`StageConfig::validate`] and hand it to
/// the stage constructors; stages never read the environment themselves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct StageConfig {
    /// Bucket the record is written to and read from.
    pub(crate) bucket: FastStr,
    /// Queue the transform stage publishes to and the verify stage consumes from.
    pub(crate) queue: FastStr,
    /// Service name reported to the tracing backend.
    pub(crate) service_name: FastStr,
}

impl StageConfig {
    /// Create a new stage config.
    pub fn new(bucket: impl Into<FastStr>, queue: impl Into<FastStr>, service_name: impl Into<FastStr>) -> Self {
        Self {
            bucket: bucket.into(),
            queue: queue.into(),
            service_name: service_name.into(),
        }
    }
    /// Set bucket name.
    pub fn with_bucket(mut self, bucket: impl Into<FastStr>) -> Self {
        self.bucket = bucket.into();
        self
    }
    /// Bucket name.
    pub fn bucket(&self) -> &FastStr {
        &self.bucket
    }
    /// Set queue name.
    pub fn with_queue(mut self, queue: impl Into<FastStr>) -> Self {
        self.queue = queue.into();
        self
    }
    /// Queue name.
    pub fn queue(&self) -> &FastStr {
        &self.queue
    }
    /// Set tracing service name.
    pub fn with_service_name(mut self, service_name: impl Into<FastStr>) -> Self {
        self.service_name = service_name.into();
        self
    }
    /// Tracing service name.
    pub fn service_name(&self) -> &FastStr {
        &self.service_name
    }

    /// Fails on the first empty field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, name) in [(&self.bucket, ENV_BUCKET), (&self.queue, ENV_QUEUE), (&self.service_name, ENV_SERVICE_NAME)] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        Ok(())
    }
}
