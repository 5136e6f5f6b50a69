//! Client error hierarchy.

use std::time::Duration;

use botwire_core::WireError;
use tracing::warn;

/// Errors surfaced to callers of the client API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No open socket and no HTTP endpoint to fall back to.
    #[error("no transport available: no open socket and no HTTP endpoint configured")]
    TransportUnavailable,

    /// A correlated call saw no matching reply within the window.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// Wire-level failure (bad target, failed action, malformed payload).
    #[error(transparent)]
    Wire(#[from] WireError),

    /// HTTP transport failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Socket-level failure while sending.
    #[error("socket send failed: {0}")]
    Socket(String),

    /// Rejected configuration, reported before any connection attempt.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenient result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Log and drop the outcome of a best-effort call.
///
/// Moderation and housekeeping actions are non-critical side effects.
/// Their failures are recorded but never propagated, and tests can
/// assert the policy instead of relying on the absence of a panic.
pub fn log_and_discard<T>(context: &'static str, result: Result<T>) {
    if let Err(error) = result {
        warn!(%error, context, "best-effort call failed");
    }
}
