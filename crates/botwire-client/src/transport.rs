//! Action transport: HTTP-preferred delivery with socket fallback, and
//! the echo-token request correlator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use botwire_core::action::{ActionRequest, ActionResponse};

use crate::errors::{ClientError, Result};
use crate::socket::{SocketHandle, SocketSlot};

/// Which link would carry a socket send right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTransport {
    /// Forward client socket is open.
    Forward,
    /// Only the reverse-accepted peer is open.
    Reverse,
    /// No socket is open.
    None,
}

/// Pairs outbound correlated actions with their eventual replies.
///
/// One entry per outstanding call, keyed by a generated token. Entries
/// are removed on reply, on timeout, and wholesale on disconnect.
#[derive(Debug, Default)]
pub struct Correlator {
    pending: DashMap<String, oneshot::Sender<ActionResponse>>,
}

impl Correlator {
    /// Register a fresh token and the channel its reply will arrive on.
    #[must_use]
    pub fn register(&self) -> (String, oneshot::Receiver<ActionResponse>) {
        let token = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        let _ = self.pending.insert(token.clone(), tx);
        (token, rx)
    }

    /// Resolve the pending call for `token` with a reply frame.
    ///
    /// Returns `false` when no call is waiting on the token; the frame
    /// is then simply dropped by the caller.
    pub fn complete(&self, token: &str, frame: &Value) -> bool {
        let Some((_, tx)) = self.pending.remove(token) else {
            return false;
        };
        match serde_json::from_value::<ActionResponse>(frame.clone()) {
            Ok(response) => {
                let _ = tx.send(response);
            }
            Err(error) => {
                debug!(%error, token, "unparseable reply frame");
            }
        }
        true
    }

    /// Deregister a token (timeout or abandoned call).
    pub fn forget(&self, token: &str) {
        let _ = self.pending.remove(token);
    }

    /// Number of outstanding calls.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Drop every pending entry; their callers observe a closed channel.
    pub fn clear(&self) {
        self.pending.clear();
    }
}

/// Seam for issuing gateway actions, mockable in tests.
#[async_trait]
pub trait ActionCaller: Send + Sync {
    /// Deliver an action without awaiting a reply.
    async fn send_action(&self, action: &str, params: Value) -> Result<()>;
    /// Deliver an action and await its correlated reply's data field.
    async fn send_with_response(&self, action: &str, params: Value) -> Result<Value>;
}

/// Concrete transport over HTTP and whichever socket is open.
pub struct ActionTransport {
    http: Option<HttpEndpoint>,
    forward: SocketSlot,
    reverse: SocketSlot,
    correlator: Arc<Correlator>,
    timeout: Duration,
}

struct HttpEndpoint {
    client: reqwest::Client,
    base: String,
    access_token: Option<String>,
}

impl ActionTransport {
    /// Build a transport over the shared socket slots.
    #[must_use]
    pub fn new(
        http_url: Option<String>,
        access_token: Option<String>,
        forward: SocketSlot,
        reverse: SocketSlot,
        correlator: Arc<Correlator>,
        timeout: Duration,
    ) -> Self {
        let http = http_url.map(|base| HttpEndpoint {
            client: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            access_token,
        });
        Self {
            http,
            forward,
            reverse,
            correlator,
            timeout,
        }
    }

    /// The link a socket send would use right now.
    ///
    /// The forward socket always wins over the reverse peer.
    #[must_use]
    pub fn active(&self) -> ActiveTransport {
        if self.forward.lock().is_some() {
            ActiveTransport::Forward
        } else if self.reverse.lock().is_some() {
            ActiveTransport::Reverse
        } else {
            ActiveTransport::None
        }
    }

    fn active_socket(&self) -> Option<Arc<SocketHandle>> {
        self.forward
            .lock()
            .clone()
            .or_else(|| self.reverse.lock().clone())
    }

    async fn http_call(&self, action: &str, params: &Value) -> Result<ActionResponse> {
        let Some(endpoint) = &self.http else {
            return Err(ClientError::TransportUnavailable);
        };
        let mut request = endpoint
            .client
            .post(format!("{}/{}", endpoint.base, action))
            .json(params);
        if let Some(token) = &endpoint.access_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<ActionResponse>().await?)
    }

    fn socket_send(&self, request: &ActionRequest) -> Result<()> {
        let Some(socket) = self.active_socket() else {
            return Err(ClientError::TransportUnavailable);
        };
        let frame = serde_json::to_value(request).map_err(botwire_core::WireError::from)?;
        if socket.send_json(&frame) {
            Ok(())
        } else {
            Err(ClientError::Socket("writer channel closed".into()))
        }
    }

    async fn socket_call(&self, action: &str, params: Value) -> Result<Value> {
        let (token, reply) = self.correlator.register();
        let request = ActionRequest::with_echo(action, params, token.clone());
        if let Err(error) = self.socket_send(&request) {
            self.correlator.forget(&token);
            return Err(error);
        }

        match tokio::time::timeout(self.timeout, reply).await {
            Ok(Ok(response)) => Ok(response.into_result()?),
            Ok(Err(_closed)) => Err(ClientError::Socket(
                "connection closed while awaiting reply".into(),
            )),
            Err(_elapsed) => {
                self.correlator.forget(&token);
                Err(ClientError::RequestTimeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl ActionCaller for ActionTransport {
    /// Fire-and-forget with at-least-attempted delivery: HTTP first when
    /// configured, and any HTTP failure (network, non-2xx, or a decoded
    /// failure status) falls back to the open socket. Never queues.
    async fn send_action(&self, action: &str, params: Value) -> Result<()> {
        if self.http.is_some() {
            match self.http_call(action, &params).await {
                Ok(response) if response.is_ok() => return Ok(()),
                Ok(response) => {
                    debug!(action, retcode = response.retcode, "http reported failure, trying socket");
                }
                Err(error) => {
                    debug!(action, %error, "http send failed, trying socket");
                }
            }
        }
        self.socket_send(&ActionRequest::new(action, params))
    }

    /// Correlated call: HTTP's synchronous reply when reachable, else a
    /// socket send tagged with a fresh token, awaited up to the timeout.
    ///
    /// A reachable server's failure reply is authoritative and is not
    /// retried over the socket.
    async fn send_with_response(&self, action: &str, params: Value) -> Result<Value> {
        if self.http.is_some() {
            match self.http_call(action, &params).await {
                Ok(response) => return Ok(response.into_result()?),
                Err(error) => {
                    warn!(action, %error, "http call failed, falling back to socket");
                }
            }
        }
        self.socket_call(action, params).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
