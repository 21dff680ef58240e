//! # Shared Types Crate
//!
//! Entities that describe intercepted calls and the statistics derived from
//! them. Every intercepted call produces exactly one [`Event`] (fanned out to
//! log subscribers) and one [`DataPoint`] (fanned out to stat subscribers).
//!
//! ## Design Principles
//!
//! - **Immutable payloads**: events and data points are never mutated after
//!   construction; subscribers receive clones.
//! - **Wall-clock snapshots**: a [`StatSnapshot`] carries the UTC time at
//!   which its window was flushed.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod entities;
pub mod stats;

pub use entities::{DataPoint, Event, SubscriberId, UNKNOWN_HOST};
pub use stats::{AggregationWindow, StatSnapshot};
