//! Session facade: owns the sockets, timers, caches, and pipelines for
//! one account, and exposes the collaborator-facing surface.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use botwire_core::cache::{DedupCache, MemberNameCache};
use botwire_core::event::RawEvent;

use crate::api::Api;
use crate::config::ConnectOptions;
use crate::dispatch::{DispatchConfig, Dispatcher};
use crate::errors::Result;
use crate::normalize::{NormalizedMessage, Normalizer};
use crate::reverse::{ReverseConfig, ReverseListener};
use crate::socket::{ForwardConfig, SelfIdSlot, SocketEvent, SocketSlot, run_forward};
use crate::transport::{ActionTransport, ActiveTransport, Correlator};

/// Normalized events delivered to the session's subscriber.
#[derive(Debug)]
pub enum SessionEvent {
    /// The forward socket opened.
    Connected,
    /// The forward socket closed or went stale.
    Disconnected,
    /// A normalized inbound message.
    Message(NormalizedMessage),
    /// A notice event (recall, member change, poke, ...).
    Notice(RawEvent),
    /// A request event (friend or group join).
    Request(RawEvent),
}

/// One account's protocol session.
pub struct Session {
    options: ConnectOptions,
    forward_slot: SocketSlot,
    reverse_slot: SocketSlot,
    correlator: Arc<Correlator>,
    self_id: SelfIdSlot,
    api: Api,
    dispatcher: Dispatcher,
    normalizer: Arc<Normalizer>,
    dedup: Arc<DedupCache>,
    cancel: Mutex<Option<CancellationToken>>,
    reverse: Mutex<Option<ReverseListener>>,
}

impl Session {
    /// Build a session. Rejects unusable options before any connection
    /// attempt.
    pub fn new(options: ConnectOptions) -> Result<Self> {
        options.validate()?;

        let forward_slot: SocketSlot = Arc::new(Mutex::new(None));
        let reverse_slot: SocketSlot = Arc::new(Mutex::new(None));
        let correlator = Arc::new(Correlator::default());
        let transport = Arc::new(ActionTransport::new(
            options.http_url.clone(),
            options.access_token.clone(),
            forward_slot.clone(),
            reverse_slot.clone(),
            correlator.clone(),
            Duration::from_millis(options.request_timeout_ms),
        ));
        let api = Api::new(transport);

        let names = Arc::new(MemberNameCache::new());
        let dedup = Arc::new(DedupCache::new());
        let normalizer = Arc::new(Normalizer::new(api.clone(), names, dedup.clone()));
        let dispatcher = Dispatcher::new(
            api.clone(),
            DispatchConfig {
                chunk_limit: options.chunk_limit,
                chunk_delay: Duration::from_millis(options.chunk_delay_ms),
                strip_markdown: options.strip_markdown,
                anti_risk: options.anti_risk,
                platform_prefix: None,
            },
        );

        Ok(Self {
            options,
            forward_slot,
            reverse_slot,
            correlator,
            self_id: Arc::new(Mutex::new(None)),
            api,
            dispatcher,
            normalizer,
            dedup,
            cancel: Mutex::new(None),
            reverse: Mutex::new(None),
        })
    }

    /// Open the session: tears down any prior connection, starts the
    /// forward socket (and reverse listener when configured), and returns
    /// the event stream.
    pub async fn connect(&self) -> Result<mpsc::UnboundedReceiver<SessionEvent>> {
        self.disconnect();

        let cancel = CancellationToken::new();
        *self.cancel.lock() = Some(cancel.clone());

        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let _ = tokio::spawn(run_forward(
            ForwardConfig {
                url: self.options.ws_url.clone(),
                access_token: self.options.access_token.clone(),
                heartbeat_interval: Duration::from_millis(self.options.heartbeat_interval_ms),
            },
            self.forward_slot.clone(),
            self.correlator.clone(),
            self.self_id.clone(),
            socket_tx.clone(),
            cancel.clone(),
        ));

        if let Some(port) = self.options.reverse_port {
            let listener = ReverseListener::new(self.reverse_slot.clone());
            listener
                .start(
                    ReverseConfig {
                        port,
                        token: self.options.reverse_token.clone(),
                    },
                    self.correlator.clone(),
                    self.self_id.clone(),
                    socket_tx,
                )
                .await?;
            *self.reverse.lock() = Some(listener);
        }

        let _ = tokio::spawn(pump(
            socket_rx,
            self.normalizer.clone(),
            events_tx,
            cancel.clone(),
        ));

        // Hourly dedup sweep, owned by this connection's cancel token.
        let dedup = self.dedup.clone();
        let policy = self.options.dedup.clone();
        let _ = tokio::spawn(async move {
            let period = Duration::from_millis(policy.sweep_interval_ms);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(period) => {
                        if dedup.sweep(policy.threshold) {
                            debug!("dedup cache cleared");
                        }
                    }
                }
            }
        });

        info!(url = %self.options.ws_url, "session connecting");
        Ok(events_rx)
    }

    /// Close the session deterministically. Idempotent; cancels the
    /// reconnect and heartbeat timers, stops the reverse listener, and
    /// drops every pending correlation.
    pub fn disconnect(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        if let Some(listener) = self.reverse.lock().take() {
            listener.stop();
        }
        self.correlator.clear();
        *self.forward_slot.lock() = None;
        *self.reverse_slot.lock() = None;
    }

    /// The bot's own account id, once discovered.
    #[must_use]
    pub fn self_id(&self) -> Option<i64> {
        *self.self_id.lock()
    }

    /// Which link a socket send would use right now.
    #[must_use]
    pub fn active_transport(&self) -> ActiveTransport {
        if self.forward_slot.lock().is_some() {
            ActiveTransport::Forward
        } else if self.reverse_slot.lock().is_some() {
            ActiveTransport::Reverse
        } else {
            ActiveTransport::None
        }
    }

    // ── outbound ────────────────────────────────────────────────────

    /// Send text to a destination, optionally as a reply.
    pub async fn send_text(
        &self,
        destination: &str,
        content: &str,
        reply_to: Option<i64>,
    ) -> Result<()> {
        self.dispatcher.send_text(destination, content, reply_to).await
    }

    /// Send a media locator to a destination.
    pub async fn send_media(&self, destination: &str, url: &str) -> Result<()> {
        self.dispatcher.send_media(destination, url).await
    }

    // ── queries ─────────────────────────────────────────────────────

    /// Friend list.
    pub async fn friends(&self) -> Result<Value> {
        self.api.get_friend_list().await
    }

    /// Joined groups.
    pub async fn groups(&self) -> Result<Value> {
        self.api.get_group_list().await
    }

    /// Joined guilds.
    pub async fn guilds(&self) -> Result<Value> {
        self.api.get_guild_list().await
    }

    /// Member roster of a group.
    pub async fn members(&self, group_id: i64) -> Result<Value> {
        self.api.get_group_member_list(group_id).await
    }

    // ── moderation ──────────────────────────────────────────────────

    /// Mute a member (fire-and-forget).
    pub async fn ban(&self, group_id: i64, user_id: i64, duration_secs: u64) {
        self.api.ban(group_id, user_id, duration_secs).await;
    }

    /// Remove a member (fire-and-forget).
    pub async fn kick(&self, group_id: i64, user_id: i64) {
        self.api.kick(group_id, user_id).await;
    }

    /// Approve or reject a friend request (fire-and-forget).
    pub async fn approve_friend(&self, flag: &str, approve: bool) {
        self.api.set_friend_add_request(flag, approve).await;
    }

    /// Approve or reject a group request (fire-and-forget).
    pub async fn approve_group(&self, flag: &str, sub_type: &str, approve: bool) {
        self.api.set_group_add_request(flag, sub_type, approve).await;
    }

    /// Recall a message (fire-and-forget).
    pub async fn recall(&self, message_id: i64) {
        self.api.delete_msg(message_id).await;
    }

    /// React to a message with an emoji (fire-and-forget).
    pub async fn react(&self, message_id: i64, emoji_id: i64) {
        self.api.set_msg_emoji_like(message_id, emoji_id).await;
    }

    /// Poke a group member (fire-and-forget).
    pub async fn poke(&self, group_id: i64, user_id: i64) {
        self.api.group_poke(group_id, user_id).await;
    }

    /// Probe gateway connectivity within a bounded window.
    pub async fn probe(&self, window: Duration) -> bool {
        matches!(
            tokio::time::timeout(window, self.api.get_status()).await,
            Ok(Ok(_))
        )
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Route socket events into the session event stream.
async fn pump(
    mut socket_rx: mpsc::UnboundedReceiver<SocketEvent>,
    normalizer: Arc<Normalizer>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            event = socket_rx.recv() => match event {
                Some(event) => event,
                None => return,
            },
            () = cancel.cancelled() => return,
        };

        match event {
            SocketEvent::Connected => {
                let _ = events.send(SessionEvent::Connected);
            }
            SocketEvent::Disconnected => {
                let _ = events.send(SessionEvent::Disconnected);
            }
            SocketEvent::Frame(value) => {
                let Ok(raw) = serde_json::from_value::<RawEvent>(value) else {
                    continue;
                };
                match raw.post_type.as_deref() {
                    Some("message" | "message_sent") => {
                        if let Some(normalized) = normalizer.normalize(&raw).await {
                            let _ = events.send(SessionEvent::Message(normalized));
                        }
                    }
                    Some("notice") => {
                        let _ = events.send(SessionEvent::Notice(raw));
                    }
                    Some("request") => {
                        let _ = events.send(SessionEvent::Request(raw));
                    }
                    _ => {}
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
