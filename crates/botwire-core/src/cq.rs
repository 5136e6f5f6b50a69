//! Inline `[CQ:...]` tag handling.
//!
//! Some gateways deliver messages as a single string with bracketed inline
//! tags instead of segment arrays. Cleaning is tag-type aware: a face tag
//! becomes a fixed label, an image tag becomes a fixed label while its
//! locator is captured, and every other tag is deleted.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Placeholder for face tags.
pub const FACE_LABEL: &str = "[face]";
/// Placeholder for image tags.
pub const IMAGE_LABEL: &str = "[image]";

static CQ_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[CQ:([a-zA-Z_]+)((?:,[^\[\]]*)?)\]").expect("valid regex")
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Result of cleaning an inline-encoded message string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cleaned {
    /// Canonical plain text (placeholders substituted, other tags removed).
    pub text: String,
    /// Image URLs extracted from image tags, in order of appearance.
    pub image_urls: Vec<String>,
}

impl Cleaned {
    /// The cleaned text with an appended summary of extracted image URLs,
    /// when any were found.
    #[must_use]
    pub fn with_summary(&self) -> String {
        if self.image_urls.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n[images: {}]", self.text, self.image_urls.join(", "))
        }
    }
}

/// Clean an inline-encoded string: substitute placeholders, capture image
/// URLs, delete other tags, and collapse whitespace.
#[must_use]
pub fn clean_inline(raw: &str) -> Cleaned {
    let mut image_urls = Vec::new();

    let replaced = CQ_TAG.replace_all(raw, |caps: &regex::Captures<'_>| {
        let tag = &caps[1];
        match tag {
            "face" => FACE_LABEL.to_string(),
            "image" => {
                let attrs = parse_attrs(caps.get(2).map_or("", |m| m.as_str()));
                if let Some(url) = image_url_from_attrs(&attrs) {
                    image_urls.push(url);
                }
                IMAGE_LABEL.to_string()
            }
            _ => String::new(),
        }
    });

    let text = WHITESPACE.replace_all(replaced.trim(), " ").into_owned();
    Cleaned { text, image_urls }
}

/// Extract a reply-reference id encoded inline, validated as an integer
/// (positive or negative).
#[must_use]
pub fn extract_reply_id(raw: &str) -> Option<i64> {
    for caps in CQ_TAG.captures_iter(raw) {
        if &caps[1] == "reply" {
            let attrs = parse_attrs(caps.get(2).map_or("", |m| m.as_str()));
            if let Some(id) = attrs.get("id") {
                return id.trim().parse().ok();
            }
        }
    }
    None
}

/// Unescape the CQ character entities used inside attribute values.
#[must_use]
pub fn unescape(s: &str) -> String {
    s.replace("&#91;", "[")
        .replace("&#93;", "]")
        .replace("&#44;", ",")
        .replace("&amp;", "&")
}

/// Parse `,k=v,k=v` attribute lists. Values keep embedded `=` characters.
fn parse_attrs(raw: &str) -> HashMap<String, String> {
    raw.trim_start_matches(',')
        .split(',')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((k.trim().to_string(), unescape(v)))
        })
        .collect()
}

/// Resolve an image tag's locator. `url=` always counts; `file=` only
/// counts when it looks like an http(s) link or a base64 payload.
fn image_url_from_attrs(attrs: &HashMap<String, String>) -> Option<String> {
    if let Some(url) = attrs.get("url").filter(|u| !u.is_empty()) {
        return Some(url.clone());
    }
    attrs
        .get("file")
        .filter(|f| {
            f.starts_with("http://") || f.starts_with("https://") || f.starts_with("base64://")
        })
        .cloned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
