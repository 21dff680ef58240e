use crate::domain::{Code, Status};
use crate::rpc::{SinkError, StreamSink};
use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use serde::Serialize;
use std::borrow::Cow;
use tracing::debug;

/// Close frame reasons are limited to 123 bytes on the wire.
const MAX_CLOSE_REASON: usize = 123;

/// Write half of a client connection; every item becomes one JSON text frame.
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

impl WsSink {
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self { inner }
    }

    /// End the session with a close frame carrying the terminal status.
    ///
    /// A cancelled stream closes normally; anything else is reported as a
    /// server error. Failures are ignored since the peer may already be gone.
    pub async fn finish(mut self, status: &Status) {
        let code = match status.code {
            Code::Cancelled => close_code::NORMAL,
            _ => close_code::ERROR,
        };
        let frame = CloseFrame {
            code,
            reason: Cow::Owned(close_reason(status)),
        };

        if let Err(e) = self.inner.send(Message::Close(Some(frame))).await {
            debug!(error = %e, "Close frame not delivered");
        }
        let _ = self.inner.close().await;
    }
}

#[async_trait]
impl<T> StreamSink<T> for WsSink
where
    T: Serialize + Send + 'static,
{
    async fn send(&mut self, item: T) -> Result<(), SinkError> {
        let text = serde_json::to_string(&item).map_err(|e| SinkError::Encode(e.to_string()))?;
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }
}

fn close_reason(status: &Status) -> String {
    let mut reason = status.to_string();
    if reason.len() > MAX_CLOSE_REASON {
        let mut end = MAX_CLOSE_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}
