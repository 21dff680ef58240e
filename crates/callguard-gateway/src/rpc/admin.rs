//! The admin service: live call events and windowed call statistics.
//!
//! Each stream runs until its context is cancelled (the client went away
//! or the server is shutting down), which ends it with `CANCELLED`, or
//! until pushing to the client fails, which ends it with `UNAVAILABLE`
//! (`INTERNAL` when the item could not be encoded). Either way the bus subscription is torn down before returning.

use crate::domain::Status;
use crate::middleware::GatewayMetrics;
use crate::rpc::StreamSink;
use shared_bus::{EventBus, StatBus, StatWindow};
use shared_types::{Event, StatSnapshot};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct AdminService {
    events: Arc<EventBus>,
    stats: Arc<StatBus>,
    metrics: Arc<GatewayMetrics>,
    max_window_secs: u64,
}

impl AdminService {
    pub fn new(
        events: Arc<EventBus>,
        stats: Arc<StatBus>,
        metrics: Arc<GatewayMetrics>,
        max_window_secs: u64,
    ) -> Self {
        Self {
            events,
            stats,
            metrics,
            max_window_secs,
        }
    }

    /// Validate a requested stat interval.
    pub fn stat_window(&self, interval_seconds: u64) -> Result<StatWindow, Status> {
        let window = StatWindow::from_secs(interval_seconds)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        if window.as_secs() > self.max_window_secs {
            return Err(Status::invalid_argument(format!(
                "interval_seconds must be at most {}, got {}",
                self.max_window_secs, interval_seconds
            )));
        }

        Ok(window)
    }

    /// Relay every event published after subscribing into `sink`.
    ///
    /// Returns the stream's terminal status.
    pub async fn stream_events<S>(&self, ctx: CancellationToken, sink: &mut S) -> Status
    where
        S: StreamSink<Event> + ?Sized,
    {
        let mut subscription = self.events.subscribe_with(ctx.child_token()).await;
        let id = subscription.id();
        info!(subscriber = %id, "Event stream opened");

        loop {
            let Some(event) = subscription.recv().await else {
                info!(subscriber = %id, "Event stream cancelled");
                return Status::cancelled("event stream cancelled");
            };

            tokio::select! {
                biased;
                () = ctx.cancelled() => {
                    subscription.unsubscribe().await;
                    info!(subscriber = %id, "Event stream cancelled");
                    return Status::cancelled("event stream cancelled");
                }
                sent = sink.send(event) => {
                    if let Err(e) = sent {
                        subscription.unsubscribe().await;
                        info!(subscriber = %id, error = %e, "Event stream lost its client");
                        return Status::from(e);
                    }
                    self.metrics.record_frame();
                }
            }
        }
    }

    /// Relay one snapshot per `interval_seconds` into `sink`.
    ///
    /// Fails with `INVALID_ARGUMENT` before subscribing when the interval is
    /// zero or too long. Otherwise returns the stream's terminal status.
    pub async fn stream_stats<S>(
        &self,
        interval_seconds: u64,
        ctx: CancellationToken,
        sink: &mut S,
    ) -> Status
    where
        S: StreamSink<StatSnapshot> + ?Sized,
    {
        let window = match self.stat_window(interval_seconds) {
            Ok(window) => window,
            Err(status) => return status,
        };

        let mut subscription = self.stats.subscribe_with(window, ctx.child_token()).await;
        let id = subscription.id();
        info!(subscriber = %id, window_secs = window.as_secs(), "Stat stream opened");

        loop {
            let Some(snapshot) = subscription.recv().await else {
                subscription.unsubscribe().await;
                info!(subscriber = %id, "Stat stream cancelled");
                return Status::cancelled("stat stream cancelled");
            };
            debug!(subscriber = %id, calls = snapshot.by_consumer.values().sum::<u64>(), "Snapshot ready");

            tokio::select! {
                biased;
                () = ctx.cancelled() => {
                    subscription.unsubscribe().await;
                    info!(subscriber = %id, "Stat stream cancelled");
                    return Status::cancelled("stat stream cancelled");
                }
                sent = sink.send(snapshot) => {
                    if let Err(e) = sent {
                        subscription.unsubscribe().await;
                        info!(subscriber = %id, error = %e, "Stat stream lost its client");
                        return Status::from(e);
                    }
                    self.metrics.record_frame();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Code;
    use crate::rpc::SinkError;
    use async_trait::async_trait;
    use shared_bus::{EventPublisher, StatPublisher};
    use shared_types::DataPoint;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        events: Arc<EventBus>,
        stats: Arc<StatBus>,
        admin: Arc<AdminService>,
    }

    fn fixture() -> Fixture {
        let events = Arc::new(EventBus::new());
        let stats = Arc::new(StatBus::new());
        let admin = Arc::new(AdminService::new(
            Arc::clone(&events),
            Arc::clone(&stats),
            Arc::new(GatewayMetrics::new()),
            60,
        ));
        Fixture {
            events,
            stats,
            admin,
        }
    }

    async fn wait_for_subscribers(bus: &EventBus, count: usize) {
        while bus.subscriber_count().await != count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_stream_events_relays_and_cancels() {
        let fx = fixture();
        let ctx = CancellationToken::new();
        let (mut tx, mut rx) = mpsc::channel(4);

        let stream = {
            let admin = Arc::clone(&fx.admin);
            let ctx = ctx.clone();
            tokio::spawn(async move { admin.stream_events(ctx, &mut tx).await })
        };
        wait_for_subscribers(&fx.events, 1).await;

        fx.events
            .publish(Event::new("alice", "/callguard.Biz/Add", "127.0.0.1:1"))
            .await;
        assert_eq!(rx.recv().await.unwrap().consumer, "alice");

        ctx.cancel();
        let status = stream.await.unwrap();
        assert_eq!(status.code, Code::Cancelled);
        assert_eq!(fx.events.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_stream_events_send_failure_is_unavailable() {
        let fx = fixture();
        let ctx = CancellationToken::new();
        let (mut tx, rx) = mpsc::channel(1);
        drop(rx);

        let stream = {
            let admin = Arc::clone(&fx.admin);
            tokio::spawn(async move { admin.stream_events(ctx, &mut tx).await })
        };
        wait_for_subscribers(&fx.events, 1).await;

        fx.events
            .publish(Event::new("alice", "/callguard.Biz/Add", "127.0.0.1:1"))
            .await;

        let status = stream.await.unwrap();
        assert_eq!(status.code, Code::Unavailable);
        assert_eq!(fx.events.subscriber_count().await, 0);
    }

    struct Unencodable;

    #[async_trait]
    impl StreamSink<Event> for Unencodable {
        async fn send(&mut self, _item: Event) -> Result<(), SinkError> {
            Err(SinkError::Encode("unsupported value".to_string()))
        }
    }

    #[tokio::test]
    async fn test_stream_events_encode_failure_is_internal() {
        let fx = fixture();
        let ctx = CancellationToken::new();

        let stream = {
            let admin = Arc::clone(&fx.admin);
            tokio::spawn(async move { admin.stream_events(ctx, &mut Unencodable).await })
        };
        wait_for_subscribers(&fx.events, 1).await;

        fx.events
            .publish(Event::new("alice", "/callguard.Biz/Add", "127.0.0.1:1"))
            .await;

        let status = stream.await.unwrap();
        assert_eq!(status.code, Code::Internal);
        assert_eq!(fx.events.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_stream_stats_rejects_zero_interval() {
        let fx = fixture();
        let (mut tx, _rx) = mpsc::channel(1);

        let status = fx
            .admin
            .stream_stats(0, CancellationToken::new(), &mut tx)
            .await;

        assert_eq!(status.code, Code::InvalidArgument);
        assert_eq!(fx.stats.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_stream_stats_rejects_long_interval() {
        let fx = fixture();
        assert_eq!(fx.admin.stat_window(61).unwrap_err().code, Code::InvalidArgument);
        assert_eq!(fx.admin.stat_window(60).unwrap().as_secs(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_stats_relays_snapshots() {
        let fx = fixture();
        let ctx = CancellationToken::new();
        let (mut tx, mut rx) = mpsc::channel(4);

        let stream = {
            let admin = Arc::clone(&fx.admin);
            let ctx = ctx.clone();
            tokio::spawn(async move { admin.stream_stats(2, ctx, &mut tx).await })
        };
        while fx.stats.subscriber_count().await != 1 {
            tokio::task::yield_now().await;
        }

        fx.stats
            .send_stats(DataPoint::new("alice", "/callguard.Biz/Add"))
            .await;
        fx.stats
            .send_stats(DataPoint::new("alice", "/callguard.Biz/Check"))
            .await;

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.by_consumer["alice"], 2);
        assert_eq!(snapshot.by_method.len(), 2);

        ctx.cancel();
        let status = stream.await.unwrap();
        assert_eq!(status.code, Code::Cancelled);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fx.stats.subscriber_count().await, 0);
    }
}
