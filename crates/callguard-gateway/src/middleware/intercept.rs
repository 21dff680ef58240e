//! Interceptor chain: authorization and call telemetry.
//!
//! Every call routed to an operation passes through [`InterceptLayer`]:
//!
//! 1. read the caller identity from the `consumer` metadata;
//! 2. authorize it against the access policy;
//! 3. record one data point on the stat bus and one event on the event bus;
//! 4. hand the request to the operation handler.
//!
//! A call refused in step 1 or 2 answers `UNAUTHENTICATED` and leaves no
//! trace on either bus. Unary calls and streaming upgrades share the same
//! logic; only their [`CallKind`] differs.

use crate::acl::AccessControl;
use crate::domain::{CallKind, Status};
use crate::middleware::metrics::{GatewayMetrics, Rejection};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    response::{IntoResponse, Response},
};
use shared_bus::{EventPublisher, StatPublisher};
use shared_types::{DataPoint, Event, UNKNOWN_HOST};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Metadata key carrying the caller identity.
pub const CONSUMER_HEADER: &str = "consumer";

/// Shared state of the interceptor chain
struct InterceptState {
    acl: Arc<AccessControl>,
    events: Arc<dyn EventPublisher>,
    stats: Arc<dyn StatPublisher>,
    metrics: Arc<GatewayMetrics>,
}

/// Interceptor layer
#[derive(Clone)]
pub struct InterceptLayer {
    state: Arc<InterceptState>,
}

impl InterceptLayer {
    pub fn new(
        acl: Arc<AccessControl>,
        events: Arc<dyn EventPublisher>,
        stats: Arc<dyn StatPublisher>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            state: Arc::new(InterceptState {
                acl,
                events,
                stats,
                metrics,
            }),
        }
    }
}

impl<S> Layer<S> for InterceptLayer {
    type Service = InterceptService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InterceptService {
            inner,
            state: Arc::clone(&self.state),
        }
    }
}

/// Interceptor service
#[derive(Clone)]
pub struct InterceptService<S> {
    inner: S,
    state: Arc<InterceptState>,
}

impl<S> Service<Request<Body>> for InterceptService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let state = Arc::clone(&self.state);
        // Take the instance `poll_ready` was called on; leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let kind = CallKind::classify(req.method(), req.headers());
            let method = req.uri().path().to_owned();

            let Some(consumer) = consumer_of(req.headers()) else {
                warn!(method = %method, kind = %kind, "Rejected call without consumer metadata");
                state.metrics.record_rejected(kind, Rejection::MissingConsumer);
                return Ok(Status::unauthenticated("consumer metadata required").into_response());
            };

            if let Err(denial) = state.acl.check(&consumer, &method) {
                warn!(
                    consumer = %consumer,
                    method = %method,
                    kind = %kind,
                    known_consumer = state.acl.is_known(&consumer),
                    reason = denial.message(),
                    "Rejected call"
                );
                state.metrics.record_rejected(kind, Rejection::Denied);
                return Ok(Status::unauthenticated(denial.message()).into_response());
            }

            let event = Event::new(consumer.as_str(), method.as_str(), peer_host(&req));
            let stat_receivers = state.stats.send_stats(DataPoint::from(&event)).await;
            let event_receivers = state.events.publish(event).await;
            state.metrics.record_allowed(kind);

            debug!(
                consumer = %consumer,
                method = %method,
                kind = %kind,
                stat_receivers,
                event_receivers,
                "Call authorized"
            );

            inner.call(req).await
        })
    }
}

/// First `consumer` value, if present, valid UTF-8 and non-empty.
pub fn consumer_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONSUMER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Caller's socket address, or [`UNKNOWN_HOST`] when the transport did not
/// record one.
pub fn peer_host<B>(req: &Request<B>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::AccessPolicy;
    use crate::domain::Code;
    use async_trait::async_trait;
    use axum::{body::to_bytes, http::StatusCode, routing::post, Router};
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
        points: Mutex<Vec<DataPoint>>,
    }

    #[async_trait]
    impl EventPublisher for Recorder {
        async fn publish(&self, event: Event) -> usize {
            self.events.lock().unwrap().push(event);
            1
        }

        fn events_published(&self) -> u64 {
            self.events.lock().unwrap().len() as u64
        }
    }

    #[async_trait]
    impl StatPublisher for Recorder {
        async fn send_stats(&self, point: DataPoint) -> usize {
            self.points.lock().unwrap().push(point);
            1
        }
    }

    fn layer(recorder: &Arc<Recorder>, metrics: &Arc<GatewayMetrics>) -> InterceptLayer {
        let policy = AccessPolicy::from_json(r#"{"alice": ["/Biz/*"], "stat1": ["/Admin/Stats"]}"#)
            .unwrap();
        InterceptLayer::new(
            Arc::new(AccessControl::new(policy)),
            Arc::clone(recorder) as Arc<dyn EventPublisher>,
            Arc::clone(recorder) as Arc<dyn StatPublisher>,
            Arc::clone(metrics),
        )
    }

    fn router(recorder: &Arc<Recorder>, metrics: &Arc<GatewayMetrics>) -> Router {
        Router::new()
            .route("/Biz/Add", post(|| async { "handled" }))
            .route_layer(layer(recorder, metrics))
    }

    /// Answers 503 unless called on the instance that was polled ready.
    /// Clones start out unready.
    #[derive(Default)]
    struct ReadyTracking {
        ready: bool,
    }

    impl Clone for ReadyTracking {
        fn clone(&self) -> Self {
            Self { ready: false }
        }
    }

    impl Service<Request<Body>> for ReadyTracking {
        type Response = Response;
        type Error = std::convert::Infallible;
        type Future = std::future::Ready<Result<Response, Self::Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            self.ready = true;
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request<Body>) -> Self::Future {
            let status = if self.ready {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            std::future::ready(Ok(status.into_response()))
        }
    }

    fn request(consumer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/Biz/Add");
        if let Some(consumer) = consumer {
            builder = builder.header(CONSUMER_HEADER, consumer);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn status_of(response: Response) -> Status {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_missing_consumer_is_unauthenticated() {
        let recorder = Arc::new(Recorder::default());
        let metrics = Arc::new(GatewayMetrics::new());

        let response = router(&recorder, &metrics)
            .oneshot(request(None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(response).await.code, Code::Unauthenticated);
        assert!(recorder.events.lock().unwrap().is_empty());
        assert!(recorder.points.lock().unwrap().is_empty());
        assert_eq!(metrics.unary_unauthenticated.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_empty_consumer_is_unauthenticated() {
        let recorder = Arc::new(Recorder::default());
        let metrics = Arc::new(GatewayMetrics::new());

        let response = router(&recorder, &metrics)
            .oneshot(request(Some("")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_denied_call_fails_closed() {
        let recorder = Arc::new(Recorder::default());
        let metrics = Arc::new(GatewayMetrics::new());

        for consumer in ["stat1", "mallory"] {
            let response = router(&recorder, &metrics)
                .oneshot(request(Some(consumer)))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(status_of(response).await.code, Code::Unauthenticated);
        }

        assert!(recorder.events.lock().unwrap().is_empty());
        assert!(recorder.points.lock().unwrap().is_empty());
        assert_eq!(metrics.unary_denied.load(std::sync::atomic::Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_allowed_call_records_and_invokes_handler() {
        let recorder = Arc::new(Recorder::default());
        let metrics = Arc::new(GatewayMetrics::new());

        let response = router(&recorder, &metrics)
            .oneshot(request(Some("alice")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"handled");

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.as_slice(), &[Event::new("alice", "/Biz/Add", UNKNOWN_HOST)]);
        let points = recorder.points.lock().unwrap();
        assert_eq!(points.as_slice(), &[DataPoint::new("alice", "/Biz/Add")]);
    }

    #[tokio::test]
    async fn test_event_carries_peer_address() {
        let recorder = Arc::new(Recorder::default());
        let metrics = Arc::new(GatewayMetrics::new());
        let peer: SocketAddr = "10.1.2.3:45678".parse().unwrap();

        let mut req = request(Some("alice"));
        req.extensions_mut().insert(ConnectInfo(peer));
        router(&recorder, &metrics).oneshot(req).await.unwrap();

        let events = recorder.events.lock().unwrap();
        assert_eq!(events[0].host, "10.1.2.3:45678");
    }

    #[tokio::test]
    async fn test_calls_the_instance_polled_ready() {
        let recorder = Arc::new(Recorder::default());
        let metrics = Arc::new(GatewayMetrics::new());
        let service = layer(&recorder, &metrics).layer(ReadyTracking::default());

        let response = service.oneshot(request(Some("alice"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_consumer_uses_first_value() {
        let mut headers = HeaderMap::new();
        headers.append(CONSUMER_HEADER, "alice".parse().unwrap());
        headers.append(CONSUMER_HEADER, "bob".parse().unwrap());

        assert_eq!(consumer_of(&headers).as_deref(), Some("alice"));
        assert_eq!(consumer_of(&HeaderMap::new()), None);
    }
}
