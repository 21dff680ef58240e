//! # Stat Aggregator
//!
//! Per-consumer and per-method call counters for one window. Owned by a
//! single stat worker; takes `&mut self` and does no locking of its own.

use shared_types::{AggregationWindow, DataPoint};
use std::mem;

#[derive(Debug, Default)]
pub struct StatAggregator {
    window: AggregationWindow,
}

impl StatAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call by `consumer` to `method`.
    pub fn add_data(&mut self, consumer: &str, method: &str) {
        *self.window.by_method.entry(method.to_owned()).or_default() += 1;
        *self.window.by_consumer.entry(consumer.to_owned()).or_default() += 1;
    }

    pub fn add_point(&mut self, point: &DataPoint) {
        self.add_data(&point.consumer, &point.method);
    }

    /// Move the counters out, leaving both maps empty.
    pub fn snapshot(&mut self) -> AggregationWindow {
        mem::take(&mut self.window)
    }

    /// Calls counted since the last snapshot.
    pub fn pending_calls(&self) -> u64 {
        self.window.total_calls()
    }
}
