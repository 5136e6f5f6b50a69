//! Inbound event wire model.
//!
//! Every frame the gateway pushes is a JSON object tagged by `post_type`:
//! `message` (and `message_sent` for self-echoes), `notice`, `request`, or
//! `meta_event` (lifecycle and heartbeat). Fields vary per category;
//! [`RawEvent`] keeps them all optional and lets the normalizer decide.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::segment::{Segment, id_to_i64};

/// The message payload: either ordered segments or a CQ-encoded string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessagePayload {
    /// Ordered typed segments.
    Segments(Vec<Segment>),
    /// Single inline-encoded string using `[CQ:...]` tags.
    Raw(String),
}

impl MessagePayload {
    /// Whether the payload carries no content at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Segments(segs) => segs.is_empty(),
            Self::Raw(s) => s.is_empty(),
        }
    }
}

/// Sender details attached to message events.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    /// Sender account id.
    #[serde(default, deserialize_with = "de_opt_id")]
    pub user_id: Option<i64>,
    /// Account nickname.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Group display name (card), preferred over nickname when present.
    #[serde(default)]
    pub card: Option<String>,
    /// Group role (`owner`, `admin`, `member`).
    #[serde(default)]
    pub role: Option<String>,
}

impl Sender {
    /// Best display name: non-empty card, else nickname.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.card
            .as_deref()
            .filter(|c| !c.is_empty())
            .or(self.nickname.as_deref())
    }
}

/// A raw inbound event as decoded from a socket frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event category: `message`, `message_sent`, `notice`, `request`, `meta_event`.
    #[serde(default)]
    pub post_type: Option<String>,
    /// Meta sub-category: `lifecycle` or `heartbeat`.
    #[serde(default)]
    pub meta_event_type: Option<String>,
    /// Message sub-category: `private`, `group`, `guild`.
    #[serde(default)]
    pub message_type: Option<String>,
    /// Category-specific sub type.
    #[serde(default)]
    pub sub_type: Option<String>,
    /// Message identifier (may be negative on some gateways).
    #[serde(default, deserialize_with = "de_opt_id")]
    pub message_id: Option<i64>,
    /// Sender account id.
    #[serde(default, deserialize_with = "de_opt_id")]
    pub user_id: Option<i64>,
    /// Group id for group messages and notices.
    #[serde(default, deserialize_with = "de_opt_id")]
    pub group_id: Option<i64>,
    /// Guild id (string-formed on the wire).
    #[serde(default, deserialize_with = "de_opt_string_id")]
    pub guild_id: Option<String>,
    /// Channel id within a guild.
    #[serde(default, deserialize_with = "de_opt_string_id")]
    pub channel_id: Option<String>,
    /// Target account of a notice (e.g. who was poked).
    #[serde(default, deserialize_with = "de_opt_id")]
    pub target_id: Option<i64>,
    /// Notice sub-category (`group_recall`, `group_increase`, ...).
    #[serde(default)]
    pub notice_type: Option<String>,
    /// Request sub-category (`friend`, `group`).
    #[serde(default)]
    pub request_type: Option<String>,
    /// Opaque flag used to approve or reject a request.
    #[serde(default)]
    pub flag: Option<String>,
    /// Message payload.
    #[serde(default)]
    pub message: Option<MessagePayload>,
    /// CQ-encoded fallback rendering, when the gateway provides one.
    #[serde(default)]
    pub raw_message: Option<String>,
    /// Sender details.
    #[serde(default)]
    pub sender: Option<Sender>,
    /// Request comment (verification message).
    #[serde(default)]
    pub comment: Option<String>,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub time: Option<i64>,
    /// The bot account this event belongs to.
    #[serde(default, deserialize_with = "de_opt_id")]
    pub self_id: Option<i64>,
}

impl RawEvent {
    /// Whether this is a heartbeat meta-event (swallowed, never forwarded).
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.post_type.as_deref() == Some("meta_event")
            && self.meta_event_type.as_deref() == Some("heartbeat")
    }

    /// Whether this is a lifecycle meta-event.
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        self.post_type.as_deref() == Some("meta_event")
            && self.meta_event_type.as_deref() == Some("lifecycle")
    }

    /// Whether this is a message-category event (including self-echoes).
    #[must_use]
    pub fn is_message(&self) -> bool {
        matches!(self.post_type.as_deref(), Some("message" | "message_sent"))
    }

    /// Whether this event is an echo of a message this bot sent.
    #[must_use]
    pub fn is_from_self(&self) -> bool {
        self.post_type.as_deref() == Some("message_sent")
            || (self.user_id.is_some() && self.user_id == self.self_id)
    }
}

/// Accept ids as JSON numbers or numeric strings.
fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_to_i64))
}

/// Accept ids as JSON strings or numbers, keeping the string form.
fn de_opt_string_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(crate::segment::id_to_string)
        .filter(|s| !s.is_empty()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
