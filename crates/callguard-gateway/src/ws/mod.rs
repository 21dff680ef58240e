//! WebSocket binding of the streaming operations.

pub mod handler;
mod sink;

pub use handler::{stream_events, stream_stats, StreamStatsParams};
pub use sink::WsSink;
