//! WebSocket handlers for `StreamEvents` and `StreamStats`.
//!
//! A session lives as long as its relay loop. The client's stream context is
//! a child of the server shutdown token and is also cancelled when the
//! client sends a close frame or the connection drops.

use crate::domain::{SessionId, Status};
use crate::service::AppState;
use crate::ws::WsSink;
use axum::{
    extract::{
        rejection::QueryRejection,
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::stream::{SplitStream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Query string of `StreamStats`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamStatsParams {
    pub interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
enum Feed {
    Events,
    Stats(u64),
}

impl Feed {
    fn name(self) -> &'static str {
        match self {
            Feed::Events => "events",
            Feed::Stats(_) => "stats",
        }
    }
}

/// `GET /callguard.Admin/StreamEvents`
pub async fn stream_events(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, Status> {
    let upgrade = upgrade.map_err(|e| Status::invalid_argument(e.body_text()))?;
    Ok(upgrade.on_upgrade(move |socket| run_session(state, socket, Feed::Events)))
}

/// `GET /callguard.Admin/StreamStats?interval_seconds=N`
///
/// The interval is validated before the upgrade, so a bad request is
/// answered with a plain `INVALID_ARGUMENT` response and never subscribes.
pub async fn stream_stats(
    State(state): State<AppState>,
    params: Result<Query<StreamStatsParams>, QueryRejection>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, Status> {
    let Query(params) = params.map_err(|e| Status::invalid_argument(e.body_text()))?;
    let interval_seconds = params
        .interval_seconds
        .ok_or_else(|| Status::invalid_argument("interval_seconds is required"))?;
    state.admin.stat_window(interval_seconds)?;

    let upgrade = upgrade.map_err(|e| Status::invalid_argument(e.body_text()))?;
    Ok(upgrade.on_upgrade(move |socket| {
        run_session(state, socket, Feed::Stats(interval_seconds))
    }))
}

async fn run_session(state: AppState, socket: WebSocket, feed: Feed) {
    let session = SessionId::new();
    let ctx = state.shutdown.child_token();
    let (sink, stream) = socket.split();
    let mut sink = WsSink::new(sink);

    state.metrics.record_session_opened();
    info!(session = %session, feed = feed.name(), "Stream session opened");

    let watcher = tokio::spawn(watch_client(stream, ctx.clone(), session));

    let status = match feed {
        Feed::Events => state.admin.stream_events(ctx.clone(), &mut sink).await,
        Feed::Stats(secs) => state.admin.stream_stats(secs, ctx.clone(), &mut sink).await,
    };

    watcher.abort();
    sink.finish(&status).await;
    state.metrics.record_session_closed();

    info!(
        session = %session,
        feed = feed.name(),
        code = %status.code,
        message = %status.message,
        "Stream session closed"
    );
}

/// Cancel `ctx` once the client closes or drops the connection.
///
/// Streams are server to client only, so anything else the client sends is
/// dropped.
async fn watch_client(
    mut stream: SplitStream<WebSocket>,
    ctx: CancellationToken,
    session: SessionId,
) {
    loop {
        tokio::select! {
            () = ctx.cancelled() => return,
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(frame))) => {
                    debug!(session = %session, ?frame, "Client closed the stream");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session = %session, error = %e, "Client connection failed");
                    break;
                }
                None => {
                    debug!(session = %session, "Client connection ended");
                    break;
                }
            },
        }
    }
    ctx.cancel();
}
