//! # Call Entities
//!
//! The two records produced for every call that passes the interceptor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host reported when the caller's network origin is not available.
pub const UNKNOWN_HOST: &str = "unknown";

/// Identifier of a bus subscriber.
///
/// Issued from a monotonic counter per bus and never reused within the
/// lifetime of the process, even after the subscriber is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A single intercepted call, as seen by log subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Caller identity asserted in the `consumer` metadata.
    pub consumer: String,
    /// Fully qualified operation name, e.g. `/callguard.Biz/Add`.
    pub method: String,
    /// Network origin of the caller, or [`UNKNOWN_HOST`].
    pub host: String,
}

impl Event {
    pub fn new(
        consumer: impl Into<String>,
        method: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            consumer: consumer.into(),
            method: method.into(),
            host: host.into(),
        }
    }
}

/// A single intercepted call, as counted by stat subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataPoint {
    pub consumer: String,
    pub method: String,
}

impl DataPoint {
    pub fn new(consumer: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            consumer: consumer.into(),
            method: method.into(),
        }
    }
}

impl From<&Event> for DataPoint {
    fn from(event: &Event) -> Self {
        Self {
            consumer: event.consumer.clone(),
            method: event.method.clone(),
        }
    }
}
