//! # Shared Bus - Call Telemetry Fan-out
//!
//! Two in-process buses fed by the gateway's interceptor chain:
//!
//! - [`EventBus`]: every intercepted call is broadcast as an [`Event`] to all
//!   log subscribers.
//! - [`StatBus`]: every intercepted call is broadcast as a [`DataPoint`] to
//!   all stat subscribers; each subscriber owns a worker that aggregates the
//!   points and flushes a [`StatSnapshot`] once per window.
//!
//! ```text
//!                      publish() / send_stats()
//!   interceptor ───────────────┐
//!                              ▼
//!                     ┌──────────────────┐   read lock held for the
//!                     │ Registry<T>      │   whole broadcast
//!                     │  id -> endpoint  │
//!                     └──────────────────┘
//!                       │      │      │      one bounded endpoint
//!                       ▼      ▼      ▼      per subscriber
//!                     sub-0  sub-1  sub-2
//! ```
//!
//! ## Backpressure
//!
//! Delivery endpoints hold a single item. A broadcast waits until every
//! subscriber has accepted the item, so nothing is ever dropped, and a
//! subscriber that stops reading stalls every publisher behind it. There is
//! no timeout and no eviction of slow subscribers.
//!
//! [`Event`]: shared_types::Event
//! [`DataPoint`]: shared_types::DataPoint
//! [`StatSnapshot`]: shared_types::StatSnapshot

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod aggregator;
pub mod error;
pub mod publisher;
pub mod registry;
pub mod stat_bus;
pub mod subscriber;

pub use aggregator::StatAggregator;
pub use error::BusError;
pub use publisher::{EventBus, EventPublisher, EventSubscription, StatPublisher};
pub use registry::Registry;
pub use stat_bus::{StatBus, StatSubscription, StatWindow};
pub use subscriber::Subscription;

/// Items a delivery endpoint holds before its publisher has to wait.
pub const DEFAULT_DELIVERY_CAPACITY: usize = 1;
