//! Operation handlers.
//!
//! [`AdminService`] implements the two streaming operations independently of
//! the transport: it pushes items into a [`StreamSink`], which the WebSocket
//! binding in [`crate::ws`] implements for a live connection.

pub mod admin;
pub mod biz;

pub use admin::AdminService;
pub use biz::Nothing;

use crate::domain::Status;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from pushing an item to a streaming client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The client side of the stream is gone
    #[error("stream closed by peer")]
    Closed,

    #[error("failed to encode stream item: {0}")]
    Encode(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<SinkError> for Status {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Encode(_) => Status::internal(err.to_string()),
            SinkError::Closed | SinkError::Transport(_) => Status::unavailable(err.to_string()),
        }
    }
}

/// Destination of a server stream.
#[async_trait]
pub trait StreamSink<T>: Send
where
    T: Send + 'static,
{
    /// Push one item, waiting until the transport accepts it.
    async fn send(&mut self, item: T) -> Result<(), SinkError>;
}

#[async_trait]
impl<T> StreamSink<T> for mpsc::Sender<T>
where
    T: Send + 'static,
{
    async fn send(&mut self, item: T) -> Result<(), SinkError> {
        mpsc::Sender::send(self, item)
            .await
            .map_err(|_| SinkError::Closed)
    }
}
