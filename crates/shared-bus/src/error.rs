//! Bus errors.

use thiserror::Error;

/// Errors from bus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// A stat window must last at least one second.
    #[error("stat window must be a positive number of seconds, got {0}")]
    InvalidWindow(u64),
}
