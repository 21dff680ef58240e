//! # Call Statistics
//!
//! Counters accumulated over one window and the snapshot emitted when the
//! window is flushed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Call counts accumulated since the previous flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationWindow {
    /// Calls per fully qualified operation name.
    pub by_method: HashMap<String, u64>,
    /// Calls per consumer identity.
    pub by_consumer: HashMap<String, u64>,
}

impl AggregationWindow {
    /// Whether no call was counted in this window.
    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty() && self.by_consumer.is_empty()
    }

    /// Total number of calls counted in this window.
    pub fn total_calls(&self) -> u64 {
        self.by_consumer.values().sum()
    }
}

/// A flushed window, stamped with the wall-clock time of emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub timestamp: DateTime<Utc>,
    pub by_consumer: HashMap<String, u64>,
    pub by_method: HashMap<String, u64>,
}

impl StatSnapshot {
    pub fn new(window: AggregationWindow, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            by_consumer: window.by_consumer,
            by_method: window.by_method,
        }
    }

    /// Snapshot of `window` stamped with the current time.
    pub fn now(window: AggregationWindow) -> Self {
        Self::new(window, Utc::now())
    }
}
