//! Domain types for the gateway: configuration, status codes and
//! operation names.

pub mod config;
pub mod correlation;
pub mod error;
pub mod methods;

pub use config::{ConfigError, GatewayConfig};
pub use correlation::SessionId;
pub use error::{Code, GatewayError, Status};
pub use methods::CallKind;
