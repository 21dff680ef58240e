//! Operation names and call classification.
//!
//! An operation is named by its request path, `/<package>.<Service>/<Method>`.
//! Access patterns are matched against these names.

use axum::http::{header, HeaderMap, Method};
use std::fmt;

/// Streams every intercepted call as an event.
pub const STREAM_EVENTS: &str = "/callguard.Admin/StreamEvents";
/// Streams windowed call statistics.
pub const STREAM_STATS: &str = "/callguard.Admin/StreamStats";

pub const BIZ_CHECK: &str = "/callguard.Biz/Check";
pub const BIZ_ADD: &str = "/callguard.Biz/Add";
pub const BIZ_TEST: &str = "/callguard.Biz/Test";

/// Shape of an intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// One request, one response
    Unary,
    /// A server-streaming session (WebSocket upgrade)
    Stream,
}

impl CallKind {
    /// Classify a request by its method and upgrade headers.
    pub fn classify(method: &Method, headers: &HeaderMap) -> Self {
        let upgrades_to_websocket = headers
            .get(header::UPGRADE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

        if method == Method::GET && upgrades_to_websocket {
            CallKind::Stream
        } else {
            CallKind::Unary
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Unary => "unary",
            CallKind::Stream => "stream",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
