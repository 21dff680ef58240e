//! The business service the interceptor chain sits in front of.
//!
//! Its three unary operations take no input and answer `{"dummy": true}`.

use axum::Json;
use serde::{Deserialize, Serialize};

/// Empty message of the business service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nothing {
    pub dummy: bool,
}

impl Default for Nothing {
    fn default() -> Self {
        Self { dummy: true }
    }
}

pub async fn check() -> Json<Nothing> {
    Json(Nothing::default())
}

pub async fn add() -> Json<Nothing> {
    Json(Nothing::default())
}

pub async fn test() -> Json<Nothing> {
    Json(Nothing::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handlers_answer_dummy() {
        for Json(reply) in [check().await, add().await, test().await] {
            assert_eq!(serde_json::to_string(&reply).unwrap(), r#"{"dummy":true}"#);
        }
    }
}
