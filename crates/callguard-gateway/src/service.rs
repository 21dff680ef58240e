//! Gateway service: wires the buses, the access policy and the middleware
//! into one router and serves it until shutdown.

use crate::acl::{AccessControl, AccessPolicy};
use crate::domain::methods::{BIZ_ADD, BIZ_CHECK, BIZ_TEST, STREAM_EVENTS, STREAM_STATS};
use crate::domain::{GatewayConfig, GatewayError};
use crate::middleware::{GatewayMetrics, InterceptLayer, TracingLayer};
use crate::rpc::{biz, AdminService};
use crate::ws;
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use shared_bus::{EventBus, EventPublisher, StatBus, StatPublisher};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

/// State shared by the route handlers.
#[derive(Clone)]
pub struct AppState {
    pub(crate) admin: Arc<AdminService>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) stats: Arc<StatBus>,
    pub(crate) metrics: Arc<GatewayMetrics>,
    pub(crate) shutdown: CancellationToken,
}

pub struct GatewayService {
    config: GatewayConfig,
    acl: Arc<AccessControl>,
    events: Arc<EventBus>,
    stats: Arc<StatBus>,
    metrics: Arc<GatewayMetrics>,
    admin: Arc<AdminService>,
    shutdown: CancellationToken,
}

impl GatewayService {
    /// Create a gateway enforcing `policy`.
    pub fn new(config: GatewayConfig, policy: AccessPolicy) -> Result<Self, GatewayError> {
        config.validate()?;

        let events = Arc::new(EventBus::with_capacity(config.streams.delivery_capacity));
        let stats = Arc::new(StatBus::with_capacity(config.streams.delivery_capacity));
        let metrics = Arc::new(GatewayMetrics::new());
        let admin = Arc::new(AdminService::new(
            Arc::clone(&events),
            Arc::clone(&stats),
            Arc::clone(&metrics),
            config.streams.max_stat_window_secs,
        ));

        if policy.is_empty() {
            warn!("Access policy is empty, every call will be refused");
        }

        Ok(Self {
            config,
            acl: Arc::new(AccessControl::new(policy)),
            events,
            stats,
            metrics,
            admin,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops the server and every live stream when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn stats(&self) -> Arc<StatBus> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the router.
    ///
    /// Operation routes go through tracing and interception; `/health` and
    /// `/metrics` do not. Unknown paths are answered 404 before interception.
    pub fn router(&self) -> Router {
        let state = AppState {
            admin: Arc::clone(&self.admin),
            events: Arc::clone(&self.events),
            stats: Arc::clone(&self.stats),
            metrics: Arc::clone(&self.metrics),
            shutdown: self.shutdown.clone(),
        };

        let intercept = InterceptLayer::new(
            Arc::clone(&self.acl),
            Arc::clone(&self.events) as Arc<dyn EventPublisher>,
            Arc::clone(&self.stats) as Arc<dyn StatPublisher>,
            Arc::clone(&self.metrics),
        );

        let operations = Router::new()
            .route(STREAM_EVENTS, get(ws::stream_events))
            .route(STREAM_STATS, get(ws::stream_stats))
            .route(BIZ_CHECK, post(biz::check))
            .route(BIZ_ADD, post(biz::add))
            .route(BIZ_TEST, post(biz::test))
            .route_layer(
                ServiceBuilder::new()
                    .layer(TracingLayer::new())
                    .layer(intercept),
            );

        let operational = Router::new()
            .route("/health", get(health_check))
            .route("/metrics", get(metrics_text));

        operations
            .merge(operational)
            .layer(RequestBodyLimitLayer::new(self.config.server.max_request_size))
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until the shutdown token fires.
    ///
    /// Shutdown stops accepting connections and cancels live streams, then
    /// waits at most the configured grace period for open calls to finish.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        let local = listener
            .local_addr()
            .map_err(|e| GatewayError::Bind(e.to_string()))?;
        info!(addr = %local, "Gateway listening");

        let server = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(self.shutdown.clone().cancelled_owned())
        .into_future();
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => {
                return result.map_err(|e| GatewayError::Serve(e.to_string()));
            }
            () = self.shutdown.cancelled() => {
                info!(grace = ?self.config.shutdown.grace_period, "Shutting down");
            }
        }

        match tokio::time::timeout(self.config.shutdown.grace_period, &mut server).await {
            Ok(result) => {
                info!("Gateway stopped");
                result.map_err(|e| GatewayError::Serve(e.to_string()))
            }
            Err(_) => {
                warn!("Grace period elapsed with connections still open");
                Ok(())
            }
        }
    }
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "callguard",
        "version": env!("CARGO_PKG_VERSION"),
        "event_subscribers": state.events.subscriber_count().await,
        "stat_subscribers": state.stats.subscriber_count().await,
        "stream_sessions": state.metrics.active_sessions(),
    }))
}

async fn metrics_text(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}
