//! Middleware stack for the gateway.
//!
//! Layer order for operation routes: Request → Tracing → Intercept → Handler.
//! Operational routes (`/health`, `/metrics`) bypass both.

pub mod intercept;
pub mod metrics;
pub mod tracing;

pub use intercept::{consumer_of, peer_host, InterceptLayer, CONSUMER_HEADER};
pub use metrics::{GatewayMetrics, Rejection};
pub use tracing::TracingLayer;
