//! Inbound event normalization.
//!
//! Turns a raw message event, in either segmented or inline-encoded
//! form, into canonical plain text plus structured extras. Auxiliary
//! lookups (roster, reply quote, forward bundles) are best-effort: a
//! failure degrades the rendered output, never the whole event.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use botwire_core::cache::{DedupCache, MemberNameCache};
use botwire_core::cq::{self, FACE_LABEL, IMAGE_LABEL};
use botwire_core::event::{MessagePayload, RawEvent};
use botwire_core::segment::{Segment, id_to_i64};

use crate::api::Api;

/// Placeholder for voice segments.
pub const VOICE_LABEL: &str = "[voice]";
/// Placeholder for video segments.
pub const VIDEO_LABEL: &str = "[video]";
/// Placeholder for json-card segments.
pub const CARD_LABEL: &str = "[card]";
/// Placeholder for file segments.
pub const FILE_LABEL: &str = "[file]";

/// Inner messages rendered from one forward bundle.
const FORWARD_CAP: usize = 10;

/// Quote context resolved for a reply reference.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Quote {
    /// Cleaned text of the quoted message.
    pub text: String,
    /// Display name of the quoted sender.
    pub sender: String,
}

/// A message event reduced to canonical text plus extras.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedMessage {
    /// Canonical plain text.
    pub text: String,
    /// Extracted media locators.
    pub image_urls: Vec<String>,
    /// Resolved file locations; raw locators when lookup fails.
    pub file_urls: Vec<String>,
    /// Id of the message this one replies to, if any.
    pub reply_to: Option<i64>,
    /// Resolved quote context for `reply_to`; empty on lookup failure.
    pub quote: Option<Quote>,
    /// Resolved sender display name (raw id when unknown).
    pub sender_name: String,
    /// Sender account id.
    pub user_id: Option<i64>,
    /// Group context.
    pub group_id: Option<i64>,
    /// Guild context.
    pub guild: Option<(String, String)>,
    /// Wire message id.
    pub message_id: Option<i64>,
    /// Whether the bot's own account produced this message.
    pub from_self: bool,
}

/// Stateful normalizer for one session's inbound stream.
pub struct Normalizer {
    api: Api,
    names: Arc<MemberNameCache>,
    dedup: Arc<DedupCache>,
}

impl Normalizer {
    /// Build a normalizer over session-scoped caches.
    #[must_use]
    pub fn new(api: Api, names: Arc<MemberNameCache>, dedup: Arc<DedupCache>) -> Self {
        Self { api, names, dedup }
    }

    /// Normalize a message event.
    ///
    /// Returns `None` for non-message events, redelivered message ids,
    /// and payload-less frames.
    pub async fn normalize(&self, event: &RawEvent) -> Option<NormalizedMessage> {
        if !event.is_message() {
            return None;
        }
        if let Some(id) = event.message_id {
            if !self.dedup.insert(id) {
                debug!(message_id = id, "duplicate message dropped");
                return None;
            }
        }
        let payload = event.message.as_ref()?;

        if let Some(group_id) = event.group_id {
            self.ensure_roster(group_id).await;
        }

        let (text, image_urls, files, mut reply_to) = match payload {
            MessagePayload::Segments(segments) => {
                self.render_segments(segments, event.group_id).await
            }
            MessagePayload::Raw(raw) => {
                let cleaned = cq::clean_inline(raw);
                (
                    cleaned.with_summary(),
                    cleaned.image_urls,
                    Vec::new(),
                    cq::extract_reply_id(raw),
                )
            }
        };
        if reply_to.is_none() {
            if let Some(raw) = &event.raw_message {
                reply_to = cq::extract_reply_id(raw);
            }
        }

        let mut file_urls = Vec::with_capacity(files.len());
        for locator in &files {
            file_urls.push(self.resolve_file_url(locator).await);
        }

        let quote = match reply_to {
            Some(id) => self.fetch_quote(id).await,
            None => None,
        };

        let sender_name = event
            .sender
            .as_ref()
            .and_then(|s| s.display_name())
            .map_or_else(
                || event.user_id.map_or_else(String::new, |id| id.to_string()),
                ToString::to_string,
            );

        Some(NormalizedMessage {
            text,
            image_urls,
            file_urls,
            reply_to,
            quote,
            sender_name,
            user_id: event.user_id,
            group_id: event.group_id,
            guild: event
                .guild_id
                .clone()
                .zip(event.channel_id.clone()),
            message_id: event.message_id,
            from_self: event.is_from_self(),
        })
    }

    /// Render ordered segments to text, collecting media and reply info.
    async fn render_segments(
        &self,
        segments: &[Segment],
        group_id: Option<i64>,
    ) -> (String, Vec<String>, Vec<String>, Option<i64>) {
        let mut text = String::new();
        let mut image_urls = Vec::new();
        let mut files = Vec::new();
        let mut reply_to = None;

        for segment in segments {
            match segment.kind.as_str() {
                "text" => {
                    if let Some(t) = segment.data_str("text") {
                        text.push_str(t);
                    }
                }
                "at" => {
                    let target = segment.data_id("qq").unwrap_or_default();
                    let name = if target == "all" {
                        "all".to_string()
                    } else {
                        self.mention_name(group_id, &target)
                    };
                    text.push_str(&format!(" @{name} "));
                }
                "image" => {
                    text.push_str(IMAGE_LABEL);
                    if let Some(url) = segment.locator() {
                        image_urls.push(cq::unescape(url));
                    }
                }
                "record" => text.push_str(VOICE_LABEL),
                "video" => text.push_str(VIDEO_LABEL),
                "json" => text.push_str(CARD_LABEL),
                "file" => {
                    text.push_str(FILE_LABEL);
                    // Direct URL preferred, then a resolvable file id,
                    // then the bare file name.
                    let locator = segment
                        .data_str("url")
                        .map(ToString::to_string)
                        .or_else(|| segment.data_id("file_id"))
                        .or_else(|| segment.data_str("file").map(ToString::to_string));
                    if let Some(locator) = locator {
                        files.push(cq::unescape(&locator));
                    }
                }
                "face" => text.push_str(FACE_LABEL),
                "reply" => {
                    reply_to = segment
                        .data
                        .get("id")
                        .and_then(id_to_i64)
                        .or(reply_to);
                }
                "forward" => {
                    if let Some(id) = segment.data_id("id") {
                        text.push_str(&self.expand_forward(&id).await);
                    }
                }
                other => {
                    debug!(kind = other, "unhandled segment kind");
                }
            }
        }

        (text, image_urls, files, reply_to)
    }

    /// Resolve a file locator to a downloadable URL, best-effort.
    ///
    /// Direct URLs pass through; anything else is looked up through the
    /// gateway, and a failed lookup degrades to the raw locator.
    async fn resolve_file_url(&self, locator: &str) -> String {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            return locator.to_string();
        }
        match self.api.get_file(locator).await {
            Ok(data) => data
                .get("url")
                .or_else(|| data.get("file"))
                .and_then(Value::as_str)
                .map_or_else(|| locator.to_string(), ToString::to_string),
            Err(error) => {
                debug!(file = locator, %error, "file url lookup failed");
                locator.to_string()
            }
        }
    }

    /// Resolve an at-mention to a display name, falling back to the raw id.
    fn mention_name(&self, group_id: Option<i64>, target: &str) -> String {
        let Some(group_id) = group_id else {
            return target.to_string();
        };
        let Ok(user_id) = target.parse::<i64>() else {
            return target.to_string();
        };
        self.names
            .get(group_id, user_id)
            .unwrap_or_else(|| target.to_string())
    }

    /// Bulk-fetch a group roster once per group, populating the name cache.
    async fn ensure_roster(&self, group_id: i64) {
        if self.names.is_bulk_fetched(group_id) {
            return;
        }
        // Marked before fetching: a failed fetch is not retried per
        // message, it degrades to per-mention cache misses.
        self.names.mark_bulk_fetched(group_id);
        match self.api.get_group_member_list(group_id).await {
            Ok(Value::Array(members)) => {
                for member in &members {
                    let Some(user_id) = member.get("user_id").and_then(id_to_i64) else {
                        continue;
                    };
                    let card = member.get("card").and_then(Value::as_str).filter(|c| !c.is_empty());
                    let nickname = member.get("nickname").and_then(Value::as_str);
                    if let Some(name) = card.or(nickname) {
                        self.names.insert(group_id, user_id, name);
                    }
                }
                debug!(group_id, count = members.len(), "roster cached");
            }
            Ok(_) => {}
            Err(error) => {
                debug!(group_id, %error, "roster fetch failed, mentions degrade to raw ids");
            }
        }
    }

    /// Resolve reply-quote context; failures yield no quote.
    async fn fetch_quote(&self, message_id: i64) -> Option<Quote> {
        match self.api.get_msg(message_id).await {
            Ok(data) => {
                let sender = data
                    .get("sender")
                    .and_then(|s| {
                        s.get("card")
                            .and_then(Value::as_str)
                            .filter(|c| !c.is_empty())
                            .or_else(|| s.get("nickname").and_then(Value::as_str))
                    })
                    .unwrap_or_default()
                    .to_string();
                let text = quoted_text(&data);
                Some(Quote { text, sender })
            }
            Err(error) => {
                debug!(message_id, %error, "reply quote lookup failed");
                None
            }
        }
    }

    /// Expand a forward bundle into "`sender: text`" lines.
    ///
    /// Capped at ten inner messages and one level deep: inner texts are
    /// cleaned of inline tags, but their own forwards are not expanded.
    async fn expand_forward(&self, id: &str) -> String {
        let data = match self.api.get_forward_msg(id).await {
            Ok(data) => data,
            Err(error) => {
                debug!(forward_id = id, %error, "forward bundle lookup failed");
                return String::from("[forwarded messages]");
            }
        };
        let Some(messages) = data.get("messages").and_then(Value::as_array) else {
            return String::from("[forwarded messages]");
        };

        let mut lines = vec![String::from("[forwarded messages]")];
        for inner in messages.iter().take(FORWARD_CAP) {
            let sender = inner
                .get("sender")
                .and_then(|s| s.get("nickname"))
                .and_then(Value::as_str)
                .unwrap_or("?");
            let text = quoted_text(inner);
            lines.push(format!("{sender}: {text}"));
        }
        lines.join("\n")
    }
}

/// Flatten a stored message's content to cleaned plain text.
fn quoted_text(message: &Value) -> String {
    if let Some(raw) = message.get("raw_message").and_then(Value::as_str) {
        return cq::clean_inline(raw).text;
    }
    match message.get("message").or_else(|| message.get("content")) {
        Some(Value::String(raw)) => cq::clean_inline(raw).text,
        Some(Value::Array(segments)) => {
            let mut out = String::new();
            for segment in segments {
                if segment.get("type").and_then(Value::as_str) == Some("text") {
                    if let Some(t) = segment
                        .get("data")
                        .and_then(|d| d.get("text"))
                        .and_then(Value::as_str)
                    {
                        out.push_str(t);
                    }
                }
            }
            cq::clean_inline(&out).text
        }
        _ => String::new(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
