//! # Stat Bus
//!
//! Fans data points out to stat subscribers. Every subscription gets its own
//! worker task that owns a [`StatAggregator`] and an intake endpoint, and
//! wakes on exactly three conditions:
//!
//! 1. the window timer fires: flush the aggregator and hand the snapshot to
//!    the subscriber, waiting for it to read;
//! 2. a data point arrives on the intake: count it;
//! 3. the subscription is cancelled: close the intake, deregister and exit.
//!
//! The worker also exits, with the same teardown, once the subscriber has
//! dropped its end of the snapshot stream.

use crate::aggregator::StatAggregator;
use crate::error::BusError;
use crate::publisher::StatPublisher;
use crate::registry::Registry;
use crate::DEFAULT_DELIVERY_CAPACITY;
use async_trait::async_trait;
use shared_types::{DataPoint, StatSnapshot, SubscriberId};
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Length of a stat window in whole seconds. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatWindow(NonZeroU64);

impl StatWindow {
    /// Validate a window length.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidWindow`] when `secs` is zero.
    pub fn from_secs(secs: u64) -> Result<Self, BusError> {
        NonZeroU64::new(secs)
            .map(Self)
            .ok_or(BusError::InvalidWindow(secs))
    }

    pub fn as_secs(self) -> u64 {
        self.0.get()
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0.get())
    }
}

impl TryFrom<u64> for StatWindow {
    type Error = BusError;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        Self::from_secs(secs)
    }
}

/// Bus feeding data points to per-subscriber stat workers.
pub struct StatBus {
    registry: Arc<Registry<DataPoint>>,
}

impl StatBus {
    /// Create a stat bus with the default delivery capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DELIVERY_CAPACITY)
    }

    /// Create a stat bus whose endpoints hold `capacity` items. Applies to
    /// both the worker intake and the snapshot stream.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry::new(capacity)),
        }
    }

    /// Subscribe with a fresh cancellation token.
    pub async fn subscribe(&self, window: StatWindow) -> StatSubscription {
        self.subscribe_with(window, CancellationToken::new()).await
    }

    /// Subscribe, ending the subscription when `cancel` fires.
    ///
    /// Registers the worker's intake and spawns the worker on the current
    /// runtime.
    pub async fn subscribe_with(
        &self,
        window: StatWindow,
        cancel: CancellationToken,
    ) -> StatSubscription {
        let (id, intake) = self.registry.register().await;
        let (snapshot_tx, snapshot_rx) = mpsc::channel(self.registry.capacity());

        let worker = StatWorker {
            id,
            period: window.as_duration(),
            aggregator: StatAggregator::new(),
            intake,
            snapshots: snapshot_tx,
            cancel: cancel.clone(),
            registry: Arc::clone(&self.registry),
        };
        let handle = tokio::spawn(worker.run());

        debug!(subscriber = %id, window_secs = window.as_secs(), "New stat subscription");

        StatSubscription {
            id,
            snapshots: snapshot_rx,
            cancel,
            worker: Some(handle),
        }
    }

    /// Get the number of registered stat workers.
    pub async fn subscriber_count(&self) -> usize {
        self.registry.len().await
    }
}

impl Default for StatBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatPublisher for StatBus {
    async fn send_stats(&self, point: DataPoint) -> usize {
        self.registry.broadcast(point).await
    }
}

/// Subscription to the stat bus: a stream of snapshots, one per window.
///
/// Dropping the subscription cancels its worker.
pub struct StatSubscription {
    id: SubscriberId,
    snapshots: mpsc::Receiver<StatSnapshot>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl StatSubscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Token that stops the worker when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receive the next snapshot.
    ///
    /// Returns `None` once the subscription has been cancelled.
    pub async fn recv(&mut self) -> Option<StatSnapshot> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            snapshot = self.snapshots.recv() => snapshot,
        }
    }

    /// Cancel the worker and wait until it has deregistered.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(subscriber = %self.id, error = %e, "Stat worker failed");
            }
        }
    }
}

impl Drop for StatSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct StatWorker {
    id: SubscriberId,
    period: Duration,
    aggregator: StatAggregator,
    intake: mpsc::Receiver<DataPoint>,
    snapshots: mpsc::Sender<StatSnapshot>,
    cancel: CancellationToken,
    registry: Arc<Registry<DataPoint>>,
}

impl StatWorker {
    async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.flush().await {
                        break;
                    }
                }
                () = self.snapshots.closed() => {
                    debug!(subscriber = %self.id, "Snapshot consumer gone");
                    break;
                }
                point = self.intake.recv() => match point {
                    Some(point) => self.aggregator.add_point(&point),
                    None => break,
                },
            }
        }

        self.intake.close();
        self.registry.remove(self.id).await;
        debug!(subscriber = %self.id, "Stat worker stopped");
    }

    /// Emit the current window. Returns `false` when the worker should stop.
    async fn flush(&mut self) -> bool {
        debug!(
            subscriber = %self.id,
            calls = self.aggregator.pending_calls(),
            "Flushing stat window"
        );
        let snapshot = StatSnapshot::now(self.aggregator.snapshot());

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.snapshots.send(snapshot) => match sent {
                Ok(()) => true,
                Err(_) => {
                    debug!(subscriber = %self.id, "Snapshot consumer gone");
                    false
                }
            },
        }
    }
}
