//! # Subscription
//!
//! The receiving side of a bus registration.
//!
//! A subscription owns its delivery endpoint. Teardown happens once, either
//! when the cancellation token fires during [`Subscription::recv`], through
//! [`Subscription::unsubscribe`], or on drop:
//!
//! 1. close the receiving side, which releases any publisher parked on it;
//! 2. remove the registration under the registry's write lock.

use crate::registry::Registry;
use shared_types::SubscriberId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A handle for receiving items from a bus.
///
/// When dropped, the registration is cleaned up automatically.
pub struct Subscription<T>
where
    T: Clone + Send + 'static,
{
    id: SubscriberId,
    receiver: mpsc::Receiver<T>,
    cancel: CancellationToken,
    registry: Arc<Registry<T>>,
    closed: bool,
    removed: bool,
}

impl<T> Subscription<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn new(
        id: SubscriberId,
        receiver: mpsc::Receiver<T>,
        cancel: CancellationToken,
        registry: Arc<Registry<T>>,
    ) -> Self {
        Self {
            id,
            receiver,
            cancel,
            registry,
            closed: false,
            removed: false,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Token that ends this subscription when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receive the next item.
    ///
    /// # Returns
    ///
    /// - `Some(item)` - The next item, in publish order
    /// - `None` - The subscription was cancelled and has been torn down
    pub async fn recv(&mut self) -> Option<T> {
        if self.closed {
            return None;
        }

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                self.close().await;
                None
            }
            item = self.receiver.recv() => item,
        }
    }

    /// Cancel and tear down the registration, waiting for the removal.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        self.close().await;
    }

    // `removed` is only set once the write lock was obtained, so a close
    // abandoned while waiting for it still leaves the removal to `Drop`.
    async fn close(&mut self) {
        if self.removed {
            return;
        }
        self.closed = true;
        self.receiver.close();

        self.registry.remove(self.id).await;
        self.removed = true;
        debug!(subscriber = %self.id, "Subscription closed");
    }
}

impl<T> Drop for Subscription<T>
where
    T: Clone + Send + 'static,
{
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        self.receiver.close();
        self.registry.remove_detached(self.id);
    }
}
