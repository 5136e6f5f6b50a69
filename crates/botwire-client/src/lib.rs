//! # botwire-client
//!
//! Session manager for JSON-over-WebSocket bot gateways.
//!
//! - Forward client socket with unbounded exponential-backoff reconnect
//!   and dead-peer detection
//! - Optional reverse listener accepting a gateway-initiated socket
//! - HTTP-preferred action transport with socket fallback and echo-token
//!   request correlation
//! - Inbound event normalization (segments, inline tags, mentions,
//!   forward bundles, reply quotes) and deduplication
//! - Outbound dispatch with markdown stripping, link de-risking, and
//!   rate-limited chunked delivery

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod normalize;
pub mod reverse;
pub mod session;
pub mod socket;
pub mod transport;

pub use api::Api;
pub use config::ConnectOptions;
pub use dispatch::{Dispatcher, PROBE_DESTINATION};
pub use errors::{ClientError, Result};
pub use normalize::{NormalizedMessage, Normalizer};
pub use session::{Session, SessionEvent};
pub use transport::{ActionCaller, ActionTransport, ActiveTransport, Correlator};
