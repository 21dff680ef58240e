//! # Subscriber Registry
//!
//! Maps subscriber ids to their delivery endpoints. The registry supports
//! exactly two kinds of operation:
//!
//! - **broadcast** takes the read lock and holds it until every endpoint has
//!   accepted the item, so no broadcast observes a half-updated set;
//! - **membership changes** (register/remove) take the write lock.
//!
//! Ids come from a monotonic counter and are never handed out twice.

use shared_types::SubscriberId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};

/// Registry of live subscribers for items of type `T`.
pub struct Registry<T> {
    subscribers: RwLock<BTreeMap<SubscriberId, mpsc::Sender<T>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<T> Registry<T>
where
    T: Clone + Send + 'static,
{
    /// Create a registry whose endpoints hold `capacity` items (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber and hand back the receiving end of its
    /// endpoint.
    pub async fn register(&self) -> (SubscriberId, mpsc::Receiver<T>) {
        let (sender, receiver) = mpsc::channel(self.capacity);

        let mut subscribers = self.subscribers.write().await;
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        subscribers.insert(id, sender);
        debug!(subscriber = %id, total = subscribers.len(), "Subscriber registered");

        (id, receiver)
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub async fn remove(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let removed = subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, total = subscribers.len(), "Subscriber removed");
        }
        removed
    }

    /// Remove a subscriber from a synchronous context.
    ///
    /// Removes in place when the lock is free, otherwise hands the removal to
    /// the current runtime. Outside a runtime the entry is left behind; its
    /// receiver is already closed so broadcasts skip it.
    pub fn remove_detached(self: &Arc<Self>, id: SubscriberId) {
        if let Ok(mut subscribers) = self.subscribers.try_write() {
            subscribers.remove(&id);
            debug!(subscriber = %id, "Subscriber removed on drop");
            return;
        }

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let registry = Arc::clone(self);
            handle.spawn(async move {
                registry.remove(id).await;
            });
        }
    }

    /// Deliver `item` to every registered subscriber.
    ///
    /// Waits for each endpoint in turn. Endpoints whose receiver has been
    /// closed are skipped. Returns the number of subscribers that accepted
    /// the item.
    pub async fn broadcast(&self, item: T) -> usize {
        let subscribers = self.subscribers.read().await;
        let mut delivered = 0;

        for (id, sender) in subscribers.iter() {
            match sender.send(item.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => trace!(subscriber = %id, "Skipping closed endpoint"),
            }
        }

        delivered
    }

    /// Number of registered subscribers.
    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether `id` is currently registered.
    pub async fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().await.contains_key(&id)
    }

    /// Capacity of each delivery endpoint.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_ids_are_never_reused() {
        let registry = Registry::<u32>::new(1);

        let (first, _rx1) = registry.register().await;
        assert!(registry.remove(first).await);
        let (second, _rx2) = registry.register().await;

        assert_ne!(first, second);
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_remove_twice() {
        let registry = Registry::<u32>::new(1);
        let (id, _rx) = registry.register().await;

        assert!(registry.remove(id).await);
        assert!(!registry.remove(id).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised() {
        let registry = Registry::<u32>::new(0);
        assert_eq!(registry.capacity(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all() {
        let registry = Registry::<u32>::new(4);
        let (_, mut rx1) = registry.register().await;
        let (_, mut rx2) = registry.register().await;

        assert_eq!(registry.broadcast(7).await, 2);
        assert_eq!(rx1.recv().await, Some(7));
        assert_eq!(rx2.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_broadcast_skips_closed_endpoint() {
        let registry = Registry::<u32>::new(1);
        let (_, mut open) = registry.register().await;
        let (_, mut closed) = registry.register().await;
        closed.close();

        assert_eq!(registry.broadcast(1).await, 1);
        assert_eq!(open.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_remove_detached_without_contention() {
        let registry = Arc::new(Registry::<u32>::new(1));
        let (id, _rx) = registry.register().await;

        registry.remove_detached(id);
        assert!(!registry.contains(id).await);
    }

    #[tokio::test]
    async fn test_membership_waits_for_broadcast() {
        let registry = Arc::new(Registry::<u32>::new(1));
        let (_, mut rx) = registry.register().await;

        // Fill the endpoint so the next broadcast parks under the read lock.
        registry.broadcast(1).await;
        let publisher = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.broadcast(2).await })
        };
        tokio::task::yield_now().await;

        let register = registry.register();
        assert!(timeout(Duration::from_millis(50), register).await.is_err());

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(publisher.await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_yields_distinct_ids() {
        let registry = Arc::new(Registry::<u32>::new(1));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.register().await.0 })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(registry.len().await, 64);
    }
}
