//! Gateway counters, exported as JSON and Prometheus text.

use crate::domain::CallKind;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why the interceptor refused a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No usable `consumer` metadata
    MissingConsumer,
    /// Consumer unknown or not permitted for the operation
    Denied,
}

/// Gateway metrics
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    // Interceptor outcomes
    pub unary_allowed: AtomicU64,
    pub stream_allowed: AtomicU64,
    pub unary_unauthenticated: AtomicU64,
    pub stream_unauthenticated: AtomicU64,
    pub unary_denied: AtomicU64,
    pub stream_denied: AtomicU64,

    // Streaming sessions
    pub stream_sessions_opened: AtomicU64,
    pub stream_sessions_closed: AtomicU64,
    pub stream_frames_sent: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call that passed the interceptor
    pub fn record_allowed(&self, kind: CallKind) {
        let counter = match kind {
            CallKind::Unary => &self.unary_allowed,
            CallKind::Stream => &self.stream_allowed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a call the interceptor refused
    pub fn record_rejected(&self, kind: CallKind, rejection: Rejection) {
        let counter = match (kind, rejection) {
            (CallKind::Unary, Rejection::MissingConsumer) => &self.unary_unauthenticated,
            (CallKind::Stream, Rejection::MissingConsumer) => &self.stream_unauthenticated,
            (CallKind::Unary, Rejection::Denied) => &self.unary_denied,
            (CallKind::Stream, Rejection::Denied) => &self.stream_denied,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_opened(&self) {
        self.stream_sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_closed(&self) {
        self.stream_sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one item pushed to a streaming client
    pub fn record_frame(&self) {
        self.stream_frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Sessions opened and not yet closed
    pub fn active_sessions(&self) -> u64 {
        let opened = self.stream_sessions_opened.load(Ordering::Relaxed);
        let closed = self.stream_sessions_closed.load(Ordering::Relaxed);
        opened.saturating_sub(closed)
    }

    /// Export metrics in Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        let calls = [
            ("unary", "allowed", &self.unary_allowed),
            ("stream", "allowed", &self.stream_allowed),
            ("unary", "unauthenticated", &self.unary_unauthenticated),
            ("stream", "unauthenticated", &self.stream_unauthenticated),
            ("unary", "denied", &self.unary_denied),
            ("stream", "denied", &self.stream_denied),
        ];

        output.push_str(
            "# HELP callguard_calls_total Intercepted calls by kind and outcome\n\
             # TYPE callguard_calls_total counter\n",
        );
        for (kind, outcome, counter) in calls {
            let _ = writeln!(
                output,
                "callguard_calls_total{{kind=\"{kind}\",outcome=\"{outcome}\"}} {}",
                counter.load(Ordering::Relaxed)
            );
        }

        let _ = write!(
            output,
            "# HELP callguard_stream_sessions_total Streaming sessions opened\n\
             # TYPE callguard_stream_sessions_total counter\n\
             callguard_stream_sessions_total {}\n",
            self.stream_sessions_opened.load(Ordering::Relaxed)
        );

        let _ = write!(
            output,
            "# HELP callguard_stream_sessions_active Streaming sessions currently open\n\
             # TYPE callguard_stream_sessions_active gauge\n\
             callguard_stream_sessions_active {}\n",
            self.active_sessions()
        );

        let _ = write!(
            output,
            "# HELP callguard_stream_frames_sent_total Items pushed to streaming clients\n\
             # TYPE callguard_stream_frames_sent_total counter\n\
             callguard_stream_frames_sent_total {}\n",
            self.stream_frames_sent.load(Ordering::Relaxed)
        );

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "calls": {
                "unary": {
                    "allowed": self.unary_allowed.load(Ordering::Relaxed),
                    "unauthenticated": self.unary_unauthenticated.load(Ordering::Relaxed),
                    "denied": self.unary_denied.load(Ordering::Relaxed),
                },
                "stream": {
                    "allowed": self.stream_allowed.load(Ordering::Relaxed),
                    "unauthenticated": self.stream_unauthenticated.load(Ordering::Relaxed),
                    "denied": self.stream_denied.load(Ordering::Relaxed),
                },
            },
            "streams": {
                "opened": self.stream_sessions_opened.load(Ordering::Relaxed),
                "active": self.active_sessions(),
                "frames_sent": self.stream_frames_sent.load(Ordering::Relaxed),
            }
        })
    }
}
