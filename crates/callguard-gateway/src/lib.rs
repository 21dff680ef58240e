//! # callguard gateway
//!
//! Access control and call telemetry in front of a small RPC service.
//!
//! ## Architecture
//!
//! ```text
//!   client ──▶ TracingLayer ──▶ InterceptLayer ──▶ Biz / Admin handler
//!                                   │    │
//!                      send_stats ◀─┘    └─▶ publish
//!                          │                    │
//!                      StatBus               EventBus
//!                   (one worker per       (direct fan-out)
//!                     subscriber)               │
//!                          │                    │
//!                StreamStats (ws) ◀─┐    ┌─▶ StreamEvents (ws)
//!                                   AdminService
//! ```
//!
//! Every routed call is authorized against an immutable [`AccessPolicy`]
//! keyed by the `consumer` metadata header. Permitted calls produce one
//! [`shared_types::Event`] and one [`shared_types::DataPoint`] before the
//! handler runs; refused calls answer `UNAUTHENTICATED` and record nothing.
//!
//! ## Usage
//!
//! ```ignore
//! use callguard_gateway::{AccessPolicy, GatewayConfig, GatewayService};
//!
//! let config = GatewayConfig::load()?;
//! let policy = AccessPolicy::from_json(r#"{"biz_admin": ["/callguard.Biz/*"]}"#)?;
//! let service = GatewayService::new(config, policy)?;
//! service.run().await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod acl;
pub mod domain;
pub mod middleware;
pub mod rpc;
pub mod service;
pub mod ws;

pub use acl::{AccessControl, AccessPolicy, MethodPattern, PolicyError};
pub use domain::{CallKind, Code, ConfigError, GatewayConfig, GatewayError, Status};
pub use middleware::{GatewayMetrics, CONSUMER_HEADER};
pub use rpc::{AdminService, StreamSink};
pub use service::GatewayService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
