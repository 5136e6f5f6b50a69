//! Forward WebSocket connection, reconnect loop, and dead-peer detection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use botwire_core::backoff::reconnect_delay;

use crate::transport::Correlator;

/// Shared slot holding the currently open socket, if any.
pub type SocketSlot = Arc<Mutex<Option<Arc<SocketHandle>>>>;

/// Shared slot holding the bot's own account id once discovered.
pub type SelfIdSlot = Arc<Mutex<Option<i64>>>;

/// Events surfaced from a socket driver to the session.
#[derive(Debug)]
pub enum SocketEvent {
    /// A socket opened.
    Connected,
    /// The socket closed or went stale.
    Disconnected,
    /// A decoded non-heartbeat, non-reply frame.
    Frame(Value),
}

/// Why a driven connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveEnd {
    /// Remote closed or the stream errored.
    Closed,
    /// No inbound traffic across a full monitor interval.
    Stale,
    /// Shut down externally.
    Cancelled,
}

/// An open socket's write half plus liveness bookkeeping.
pub struct SocketHandle {
    /// Connection identifier for logs.
    pub id: String,
    tx: mpsc::UnboundedSender<String>,
    /// Whether any frame arrived since the last heartbeat check.
    pub is_alive: AtomicBool,
    connected_at: Instant,
}

impl SocketHandle {
    /// Wrap a writer channel in a handle.
    #[must_use]
    pub fn new(id: String, tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            tx,
            is_alive: AtomicBool::new(true),
            connected_at: Instant::now(),
        }
    }

    /// Queue a text frame. Returns `false` if the writer is gone.
    pub fn send(&self, text: String) -> bool {
        self.tx.send(text).is_ok()
    }

    /// Serialize and queue a JSON frame.
    pub fn send_json(&self, value: &Value) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(json),
            Err(_) => false,
        }
    }

    /// Record inbound traffic.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and re-arm the liveness flag.
    ///
    /// Returns `true` if any traffic arrived since the previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the socket opened.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}

/// Forward connection parameters.
#[derive(Clone, Debug)]
pub struct ForwardConfig {
    /// Gateway WebSocket URL.
    pub url: String,
    /// Bearer token for the handshake, if required.
    pub access_token: Option<String>,
    /// Dead-peer monitor interval.
    pub heartbeat_interval: std::time::Duration,
}

/// Route one inbound text frame.
///
/// Any frame counts as liveness. Malformed JSON is dropped. A frame
/// carrying a known correlation token resolves its pending call and goes
/// no further; a token matching nothing is dropped. Heartbeat meta-events
/// are swallowed; lifecycle meta-events record `self_id`. Everything else
/// is forwarded to the session.
pub(crate) fn route_frame(
    text: &str,
    handle: &SocketHandle,
    correlator: &Correlator,
    self_id: &Mutex<Option<i64>>,
    events: &mpsc::UnboundedSender<SocketEvent>,
) {
    handle.mark_alive();

    let Ok(value) = serde_json::from_str::<Value>(text) else {
        debug!(socket = %handle.id, "dropping malformed frame");
        return;
    };

    if let Some(echo) = value.get("echo").and_then(Value::as_str) {
        let echo = echo.to_string();
        if correlator.complete(&echo, &value) {
            return;
        }
        debug!(socket = %handle.id, echo, "reply for unknown token, dropping");
        return;
    }

    if let Some(sid) = value.get("self_id").and_then(Value::as_i64) {
        let mut slot = self_id.lock();
        if slot.is_none_or(|known| known != sid) {
            info!(socket = %handle.id, self_id = sid, "discovered account id");
            *slot = Some(sid);
        }
    }

    let meta = value.get("meta_event_type").and_then(Value::as_str);
    if value.get("post_type").and_then(Value::as_str) == Some("meta_event")
        && meta == Some("heartbeat")
    {
        return;
    }

    let _ = events.send(SocketEvent::Frame(value));
}

/// Drive an open socket: read frames and watch liveness until it ends.
pub(crate) async fn drive<S>(
    handle: Arc<SocketHandle>,
    mut read: S,
    config: &ForwardConfig,
    correlator: &Correlator,
    self_id: &Mutex<Option<i64>>,
    events: &mpsc::UnboundedSender<SocketEvent>,
    cancel: &CancellationToken,
) -> DriveEnd
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    // Delay the first liveness check a full interval; the flag starts
    // armed at connect time.
    let start = time::Instant::now() + config.heartbeat_interval;
    let mut ticker = time::interval_at(start, config.heartbeat_interval);

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    route_frame(text.as_str(), &handle, correlator, self_id, events);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => handle.mark_alive(),
                Some(Ok(Message::Close(_))) | None => return DriveEnd::Closed,
                // Binary and raw frames carry no payload we route, but
                // any traffic counts as liveness.
                Some(Ok(_)) => handle.mark_alive(),
                Some(Err(error)) => {
                    warn!(socket = %handle.id, %error, "socket read failed");
                    return DriveEnd::Closed;
                }
            },
            _ = ticker.tick() => {
                if !handle.check_alive() {
                    warn!(socket = %handle.id, "no traffic within monitor interval, treating peer as dead");
                    return DriveEnd::Stale;
                }
            }
            () = cancel.cancelled() => return DriveEnd::Cancelled,
        }
    }
}

/// Run the forward connection until cancelled, reconnecting forever.
///
/// Backoff doubles from one second and caps at one minute; the attempt
/// counter resets to zero on every successful open. The slot holds the
/// live handle only while the socket is open.
pub async fn run_forward(
    config: ForwardConfig,
    slot: SocketSlot,
    correlator: Arc<Correlator>,
    self_id: SelfIdSlot,
    events: mpsc::UnboundedSender<SocketEvent>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return;
        }

        match open_forward(&config).await {
            Ok((handle, read)) => {
                attempt = 0;
                info!(url = %config.url, socket = %handle.id, "forward socket open");
                *slot.lock() = Some(handle.clone());
                let _ = events.send(SocketEvent::Connected);

                let end = drive(
                    handle, read, &config, &correlator, &self_id, &events, &cancel,
                )
                .await;

                *slot.lock() = None;
                if end == DriveEnd::Cancelled {
                    return;
                }
                let _ = events.send(SocketEvent::Disconnected);
            }
            Err(error) => {
                warn!(url = %config.url, %error, "forward connect failed");
            }
        }

        let delay = reconnect_delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(attempt, ?delay, "scheduling reconnect");
        tokio::select! {
            () = cancel.cancelled() => return,
            () = time::sleep(delay) => {}
        }
    }
}

/// Open the forward socket and spawn its writer task.
async fn open_forward(
    config: &ForwardConfig,
) -> Result<
    (
        Arc<SocketHandle>,
        futures::stream::SplitStream<
            tokio_tungstenite::WebSocketStream<
                tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
            >,
        >,
    ),
    tokio_tungstenite::tungstenite::Error,
> {
    let mut request = config.url.as_str().into_client_request()?;
    if let Some(token) = &config.access_token {
        if let Ok(header) = http::HeaderValue::from_str(&format!("Bearer {token}")) {
            let _ = request.headers_mut().insert(http::header::AUTHORIZATION, header);
        }
    }

    let (stream, _) = connect_async(request).await?;
    let (mut write, read) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let _ = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let handle = Arc::new(SocketHandle::new(
        format!("fwd_{}", uuid::Uuid::new_v4().simple()),
        tx,
    ));
    Ok((handle, read))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_handle() -> (Arc<SocketHandle>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(SocketHandle::new("sock_1".into(), tx)), rx)
    }

    fn make_router() -> (
        Arc<SocketHandle>,
        Correlator,
        Mutex<Option<i64>>,
        mpsc::UnboundedSender<SocketEvent>,
        mpsc::UnboundedReceiver<SocketEvent>,
    ) {
        let (handle, writer_rx) = make_handle();
        drop(writer_rx);
        let (tx, rx) = mpsc::unbounded_channel();
        (handle, Correlator::default(), Mutex::new(None), tx, rx)
    }

    // ── SocketHandle ────────────────────────────────────────────────

    #[test]
    fn send_queues_text() {
        let (handle, mut rx) = make_handle();
        assert!(handle.send("hello".into()));
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn send_to_dropped_writer_returns_false() {
        let (handle, rx) = make_handle();
        drop(rx);
        assert!(!handle.send("hello".into()));
    }

    #[test]
    fn send_json_serializes() {
        let (handle, mut rx) = make_handle();
        assert!(handle.send_json(&json!({"action": "send_msg"})));
        let text = rx.try_recv().unwrap();
        assert!(text.contains("send_msg"));
    }

    #[test]
    fn check_alive_rearms_flag() {
        let (handle, _rx) = make_handle();
        assert!(handle.check_alive());
        assert!(!handle.check_alive());
        handle.mark_alive();
        assert!(handle.check_alive());
    }

    // ── route_frame ─────────────────────────────────────────────────

    #[test]
    fn malformed_frame_dropped_silently() {
        let (handle, correlator, self_id, tx, mut rx) = make_router();
        route_frame("{not json", &handle, &correlator, &self_id, &tx);
        assert!(rx.try_recv().is_err());
        // Still counts as liveness.
        assert!(handle.check_alive());
    }

    #[test]
    fn heartbeat_swallowed() {
        let (handle, correlator, self_id, tx, mut rx) = make_router();
        let frame = json!({
            "post_type": "meta_event",
            "meta_event_type": "heartbeat",
            "self_id": 99,
        });
        route_frame(&frame.to_string(), &handle, &correlator, &self_id, &tx);
        assert!(rx.try_recv().is_err());
        // But self_id was still recorded.
        assert_eq!(*self_id.lock(), Some(99));
    }

    #[test]
    fn lifecycle_records_self_id() {
        let (handle, correlator, self_id, tx, mut rx) = make_router();
        let frame = json!({
            "post_type": "meta_event",
            "meta_event_type": "lifecycle",
            "sub_type": "connect",
            "self_id": 12345,
        });
        route_frame(&frame.to_string(), &handle, &correlator, &self_id, &tx);
        assert_eq!(*self_id.lock(), Some(12345));
        // Lifecycle frames are forwarded.
        assert!(matches!(rx.try_recv(), Ok(SocketEvent::Frame(_))));
    }

    #[test]
    fn known_echo_resolves_pending_call() {
        let (handle, correlator, self_id, tx, mut rx) = make_router();
        let (token, pending) = correlator.register();
        let frame = json!({"status": "ok", "retcode": 0, "data": {"x": 1}, "echo": token});
        route_frame(&frame.to_string(), &handle, &correlator, &self_id, &tx);

        let response = pending.blocking_recv().unwrap();
        assert_eq!(response.retcode, Some(0));
        // Replies never reach the event stream.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_echo_dropped() {
        let (handle, correlator, self_id, tx, mut rx) = make_router();
        let frame = json!({"status": "ok", "retcode": 0, "echo": "nobody-waiting"});
        route_frame(&frame.to_string(), &handle, &correlator, &self_id, &tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn message_frame_forwarded() {
        let (handle, correlator, self_id, tx, mut rx) = make_router();
        let frame = json!({
            "post_type": "message",
            "message_type": "group",
            "message": [{"type": "text", "data": {"text": "hi"}}],
        });
        route_frame(&frame.to_string(), &handle, &correlator, &self_id, &tx);
        match rx.try_recv() {
            Ok(SocketEvent::Frame(value)) => {
                assert_eq!(value["post_type"], "message");
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    // ── drive ───────────────────────────────────────────────────────

    fn test_config() -> ForwardConfig {
        ForwardConfig {
            url: "ws://127.0.0.1:1".into(),
            access_token: None,
            heartbeat_interval: std::time::Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn drive_ends_closed_when_stream_ends() {
        let (handle, _writer) = make_handle();
        let (tx, _rx) = mpsc::unbounded_channel();
        let read = futures::stream::iter(vec![Ok(Message::Text("not json".into()))]);
        let end = drive(
            handle,
            read,
            &test_config(),
            &Correlator::default(),
            &Mutex::new(None),
            &tx,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(end, DriveEnd::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn drive_ends_stale_after_silent_interval() {
        let (handle, _writer) = make_handle();
        let (tx, _rx) = mpsc::unbounded_channel();
        // A stream that never yields: only the monitor can end the drive.
        let read = futures::stream::pending();
        let end = drive(
            handle,
            read,
            &test_config(),
            &Correlator::default(),
            &Mutex::new(None),
            &tx,
            &CancellationToken::new(),
        )
        .await;
        // First tick finds the connect-time flag set; second finds silence.
        assert_eq!(end, DriveEnd::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn binary_frame_counts_as_liveness() {
        let (handle, _writer) = make_handle();
        let (tx, _rx) = mpsc::unbounded_channel();
        // Drain the connect-time flag so only the binary frame can keep
        // the peer alive through the first tick.
        assert!(handle.check_alive());
        let read = futures::stream::iter(vec![Ok(Message::Binary(vec![1, 2].into()))])
            .chain(futures::stream::pending());
        let start = time::Instant::now();
        let end = drive(
            handle,
            read,
            &test_config(),
            &Correlator::default(),
            &Mutex::new(None),
            &tx,
            &CancellationToken::new(),
        )
        .await;
        // Binary traffic survives the first tick; silence ends the second.
        assert_eq!(end, DriveEnd::Stale);
        assert!(start.elapsed() >= std::time::Duration::from_millis(100));
    }

    #[tokio::test]
    async fn drive_ends_cancelled() {
        let (handle, _writer) = make_handle();
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let end = drive(
            handle,
            futures::stream::pending(),
            &test_config(),
            &Correlator::default(),
            &Mutex::new(None),
            &tx,
            &cancel,
        )
        .await;
        assert_eq!(end, DriveEnd::Cancelled);
    }
}
