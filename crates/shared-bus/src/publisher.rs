//! # Publishers
//!
//! The publishing side of both buses, and the in-memory event bus.

use crate::registry::Registry;
use crate::subscriber::Subscription;
use crate::DEFAULT_DELIVERY_CAPACITY;
use async_trait::async_trait;
use shared_types::{DataPoint, Event};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Trait for publishing call events.
///
/// This is the interface the interceptor chain uses to report every
/// authorized call to log subscribers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to every active subscriber.
    ///
    /// Waits until each subscriber has accepted the event.
    ///
    /// # Returns
    ///
    /// The number of subscribers that received the event.
    async fn publish(&self, event: Event) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// Trait for feeding call data points to stat subscribers.
#[async_trait]
pub trait StatPublisher: Send + Sync {
    /// Hand a data point to every active stat worker.
    ///
    /// # Returns
    ///
    /// The number of workers that accepted the point.
    async fn send_stats(&self, point: DataPoint) -> usize;
}

/// Subscription to the event bus.
pub type EventSubscription = Subscription<Event>;

/// In-memory event bus.
///
/// Has no task of its own: `publish` delivers directly into each
/// subscriber's endpoint while holding the registry read lock.
pub struct EventBus {
    registry: Arc<Registry<Event>>,

    /// Total events published.
    events_published: AtomicU64,
}

impl EventBus {
    /// Create an event bus with the default delivery capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DELIVERY_CAPACITY)
    }

    /// Create an event bus whose endpoints hold `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry::new(capacity)),
            events_published: AtomicU64::new(0),
        }
    }

    /// Subscribe with a fresh cancellation token.
    pub async fn subscribe(&self) -> EventSubscription {
        self.subscribe_with(CancellationToken::new()).await
    }

    /// Subscribe, ending the subscription when `cancel` fires.
    pub async fn subscribe_with(&self, cancel: CancellationToken) -> EventSubscription {
        let (id, receiver) = self.registry.register().await;
        debug!(subscriber = %id, "New event subscription");
        Subscription::new(id, receiver, cancel, Arc::clone(&self.registry))
    }

    /// Get the number of registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.registry.len().await
    }

    /// Get the delivery capacity of each endpoint.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.registry.capacity()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: Event) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let consumer = event.consumer.clone();
        let method = event.method.clone();
        let delivered = self.registry.broadcast(event).await;

        trace!(
            consumer = %consumer,
            method = %method,
            receivers = delivered,
            "Event published"
        );
        delivered
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
