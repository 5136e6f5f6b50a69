//! Session configuration.
//!
//! Options are immutable per session instance. Environment variables
//! (prefix `BOTWIRE_`) override compiled defaults with strict parsing:
//! invalid values are logged and ignored rather than failing startup.

use botwire_core::cache::DedupConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{ClientError, Result};

/// Default heartbeat monitor interval (45s).
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 45_000;
/// Default correlated-request timeout (5s).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
/// Default outbound chunk size in characters.
pub const DEFAULT_CHUNK_LIMIT: usize = 4000;
/// Default delay between chunks of one dispatch.
pub const DEFAULT_CHUNK_DELAY_MS: u64 = 1000;

/// Connection and pipeline options for one session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectOptions {
    /// Forward WebSocket URL (required).
    pub ws_url: String,
    /// HTTP API base URL; when set, actions prefer HTTP over the socket.
    pub http_url: Option<String>,
    /// Bearer token sent on the forward handshake and HTTP calls.
    pub access_token: Option<String>,
    /// Port for the reverse listener; `None` disables it.
    pub reverse_port: Option<u16>,
    /// Token required from reverse peers; `None` accepts any peer.
    pub reverse_token: Option<String>,
    /// Dead-peer detector interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Correlated-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Maximum characters per outbound chunk.
    pub chunk_limit: usize,
    /// Delay between chunks of a multi-chunk send, in milliseconds.
    pub chunk_delay_ms: u64,
    /// Strip markdown from outbound text.
    pub strip_markdown: bool,
    /// Insert a space after link schemes in outbound text.
    pub anti_risk: bool,
    /// Dedup cache policy.
    pub dedup: DedupConfig,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            http_url: None,
            access_token: None,
            reverse_port: None,
            reverse_token: None,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            chunk_delay_ms: DEFAULT_CHUNK_DELAY_MS,
            strip_markdown: true,
            anti_risk: true,
            dedup: DedupConfig::default(),
        }
    }
}

impl ConnectOptions {
    /// Options with only the forward URL set.
    #[must_use]
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Self::default()
        }
    }

    /// Reject unusable configurations before any connection attempt.
    pub fn validate(&self) -> Result<()> {
        if self.ws_url.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "ws_url must not be empty".into(),
            ));
        }
        if self.chunk_limit == 0 {
            return Err(ClientError::InvalidConfig(
                "chunk_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Apply `BOTWIRE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = read_env_string("BOTWIRE_WS_URL") {
            self.ws_url = v;
        }
        if let Some(v) = read_env_string("BOTWIRE_HTTP_URL") {
            self.http_url = Some(v);
        }
        if let Some(v) = read_env_string("BOTWIRE_ACCESS_TOKEN") {
            self.access_token = Some(v);
        }
        if let Some(v) = read_env_u16("BOTWIRE_REVERSE_PORT", 1, 65535) {
            self.reverse_port = Some(v);
        }
        if let Some(v) = read_env_string("BOTWIRE_REVERSE_TOKEN") {
            self.reverse_token = Some(v);
        }
        if let Some(v) = read_env_u64("BOTWIRE_HEARTBEAT_INTERVAL", 1000, 600_000) {
            self.heartbeat_interval_ms = v;
        }
        if let Some(v) = read_env_u64("BOTWIRE_REQUEST_TIMEOUT", 100, 120_000) {
            self.request_timeout_ms = v;
        }
        if let Some(v) = read_env_usize("BOTWIRE_CHUNK_LIMIT", 1, 100_000) {
            self.chunk_limit = v;
        }
        if let Some(v) = read_env_u64("BOTWIRE_CHUNK_DELAY", 0, 60_000) {
            self.chunk_delay_ms = v;
        }
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    val.trim()
        .parse::<u16>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.trim()
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    val.trim()
        .parse::<usize>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
