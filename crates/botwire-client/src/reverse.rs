//! Reverse WebSocket listener.
//!
//! Alternative topology where the gateway dials in. One logical peer is
//! active at a time: a newly accepted connection replaces the previous
//! bookkeeping reference without forcibly closing the old socket.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::{ClientError, Result};
use crate::socket::{SelfIdSlot, SocketEvent, SocketHandle, SocketSlot, route_frame};
use crate::transport::Correlator;

/// Reverse listener parameters.
#[derive(Clone, Debug)]
pub struct ReverseConfig {
    /// Port to listen on (all interfaces).
    pub port: u16,
    /// Required peer token; `None` accepts any peer.
    pub token: Option<String>,
}

/// Handle to a running (or never-started) reverse listener.
pub struct ReverseListener {
    cancel: CancellationToken,
    peer: SocketSlot,
}

impl ReverseListener {
    /// Create a stopped listener bound to the given peer slot.
    #[must_use]
    pub fn new(peer: SocketSlot) -> Self {
        Self {
            cancel: CancellationToken::new(),
            peer,
        }
    }

    /// Bind the port and start accepting peers in the background.
    pub async fn start(
        &self,
        config: ReverseConfig,
        correlator: Arc<Correlator>,
        self_id: SelfIdSlot,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .await
            .map_err(|e| ClientError::Socket(format!("reverse bind failed: {e}")))?;
        info!(port = config.port, "reverse listener bound");

        let peer = self.peer.clone();
        let cancel = self.cancel.clone();
        let _ = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, addr)) => {
                            let token = config.token.clone();
                            let peer = peer.clone();
                            let correlator = correlator.clone();
                            let self_id = self_id.clone();
                            let events = events.clone();
                            let cancel = cancel.clone();
                            let _ = tokio::spawn(async move {
                                serve_peer(stream, addr, token, peer, correlator, self_id, events, cancel).await;
                            });
                        }
                        Err(error) => {
                            warn!(%error, "reverse accept failed");
                        }
                    },
                    () = cancel.cancelled() => return,
                }
            }
        });
        Ok(())
    }

    /// Stop the listener and drop the active peer reference.
    ///
    /// Safe to call when the listener was never started, and idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
        *self.peer.lock() = None;
    }
}

/// Whether a handshake passes the token check.
///
/// With no configured token every peer is accepted. Otherwise either a
/// `Bearer` authorization header or an `access_token` query parameter
/// must carry the exact token.
fn authorized(required: Option<&str>, auth_header: Option<&str>, query: Option<&str>) -> bool {
    let Some(token) = required else {
        return true;
    };
    let header_ok = auth_header.is_some_and(|v| v == format!("Bearer {token}"));
    let query_ok = query.is_some_and(|q| {
        q.split('&')
            .any(|pair| pair == format!("access_token={token}"))
    });
    header_ok || query_ok
}

#[allow(clippy::too_many_arguments)]
async fn serve_peer(
    stream: tokio::net::TcpStream,
    addr: std::net::SocketAddr,
    token: Option<String>,
    peer: SocketSlot,
    correlator: Arc<Correlator>,
    self_id: SelfIdSlot,
    events: mpsc::UnboundedSender<SocketEvent>,
    cancel: CancellationToken,
) {
    let callback = |req: &Request, res: Response| -> std::result::Result<Response, ErrorResponse> {
        let auth = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if authorized(token.as_deref(), auth, req.uri().query()) {
            Ok(res)
        } else {
            let mut reject = ErrorResponse::new(Some("Unauthorized".to_string()));
            *reject.status_mut() = http::StatusCode::UNAUTHORIZED;
            Err(reject)
        }
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(error) => {
            warn!(%addr, %error, "reverse handshake failed");
            return;
        }
    };
    info!(%addr, "reverse peer accepted");

    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let _ = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let handle = Arc::new(SocketHandle::new(format!("rev_{addr}"), tx));
    // Replace the active-peer reference; the old socket is left to its
    // own read loop rather than being closed here.
    *peer.lock() = Some(handle.clone());

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    route_frame(text.as_str(), &handle, &correlator, &self_id, &events);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => handle.mark_alive(),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(%addr, %error, "reverse read failed");
                    break;
                }
            },
            () = cancel.cancelled() => break,
        }
    }

    // Only clear the slot if this peer is still the active one.
    let mut slot = peer.lock();
    if slot.as_ref().is_some_and(|active| Arc::ptr_eq(active, &handle)) {
        *slot = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    // ── authorization ───────────────────────────────────────────────

    #[test]
    fn no_token_accepts_everything() {
        assert!(authorized(None, None, None));
        assert!(authorized(None, Some("Bearer whatever"), None));
    }

    #[test]
    fn bearer_header_must_match() {
        assert!(authorized(Some("s3cret"), Some("Bearer s3cret"), None));
        assert!(!authorized(Some("s3cret"), Some("Bearer wrong"), None));
        assert!(!authorized(Some("s3cret"), Some("s3cret"), None));
        assert!(!authorized(Some("s3cret"), None, None));
    }

    #[test]
    fn query_token_accepted() {
        assert!(authorized(Some("s3cret"), None, Some("access_token=s3cret")));
        assert!(authorized(
            Some("s3cret"),
            None,
            Some("foo=1&access_token=s3cret")
        ));
        assert!(!authorized(Some("s3cret"), None, Some("access_token=nope")));
        // Prefix matches are not enough.
        assert!(!authorized(
            Some("s3c"),
            None,
            Some("access_token=s3cret")
        ));
    }

    // ── lifecycle ───────────────────────────────────────────────────

    #[test]
    fn stop_without_start_is_safe() {
        let listener = ReverseListener::new(Arc::new(Mutex::new(None)));
        listener.stop();
        listener.stop();
    }

    #[tokio::test]
    async fn start_and_stop() {
        let peer: SocketSlot = Arc::new(Mutex::new(None));
        let listener = ReverseListener::new(peer.clone());
        let (events, _rx) = mpsc::unbounded_channel();
        let result = listener
            .start(
                ReverseConfig {
                    port: 0,
                    token: None,
                },
                Arc::new(Correlator::default()),
                Arc::new(Mutex::new(None)),
                events,
            )
            .await;
        assert!(result.is_ok());
        listener.stop();
        assert!(peer.lock().is_none());
    }
}
