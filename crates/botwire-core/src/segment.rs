//! Typed message segments.
//!
//! OneBot v11 messages arrive as ordered `{type, data}` pairs. The set of
//! segment types is open-ended (gateways add their own), so [`Segment`]
//! keeps `data` as raw JSON and exposes typed accessors and constructors
//! for the kinds this crate processes.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A single message segment on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment type tag (`text`, `image`, `at`, `reply`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl Segment {
    /// Plain text segment.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            data: json!({ "text": text.into() }),
        }
    }

    /// At-mention segment. `qq` is a user id or `"all"`.
    #[must_use]
    pub fn at(qq: impl Into<String>) -> Self {
        Self {
            kind: "at".into(),
            data: json!({ "qq": qq.into() }),
        }
    }

    /// Reply-reference segment pointing at an earlier message.
    #[must_use]
    pub fn reply(id: i64) -> Self {
        Self {
            kind: "reply".into(),
            data: json!({ "id": id.to_string() }),
        }
    }

    /// Image segment from a locator (`http(s)://`, `base64://`, or a
    /// gateway-local `file` value).
    #[must_use]
    pub fn image(file: impl Into<String>) -> Self {
        Self {
            kind: "image".into(),
            data: json!({ "file": file.into() }),
        }
    }

    /// String field accessor on `data`.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Id field accessor tolerating both JSON strings and numbers.
    #[must_use]
    pub fn data_id(&self, key: &str) -> Option<String> {
        id_to_string(self.data.get(key)?)
    }

    /// The image/record/video/file locator: `url` preferred, `file` fallback.
    #[must_use]
    pub fn locator(&self) -> Option<&str> {
        self.data_str("url").or_else(|| self.data_str("file"))
    }
}

/// Convert a JSON id value (string or integer) to its string form.
#[must_use]
pub fn id_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Convert a JSON id value (string or integer) to `i64`.
#[must_use]
pub fn id_to_i64(v: &Value) -> Option<i64> {
    match v {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_segment_roundtrip() {
        let seg = Segment::text("hello");
        let json = serde_json::to_value(&seg).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["data"]["text"], "hello");
        let back: Segment = serde_json::from_value(json).unwrap();
        assert_eq!(back, seg);
    }

    #[test]
    fn deserialize_unknown_kind() {
        let seg: Segment =
            serde_json::from_str(r#"{"type":"dice","data":{"result":"3"}}"#).unwrap();
        assert_eq!(seg.kind, "dice");
        assert_eq!(seg.data_str("result"), Some("3"));
    }

    #[test]
    fn deserialize_missing_data() {
        let seg: Segment = serde_json::from_str(r#"{"type":"rps"}"#).unwrap();
        assert_eq!(seg.kind, "rps");
        assert!(seg.data.is_null());
        assert_eq!(seg.data_str("x"), None);
    }

    #[test]
    fn data_id_accepts_number_and_string() {
        let a: Segment = serde_json::from_str(r#"{"type":"at","data":{"qq":42}}"#).unwrap();
        let b: Segment = serde_json::from_str(r#"{"type":"at","data":{"qq":"42"}}"#).unwrap();
        assert_eq!(a.data_id("qq").as_deref(), Some("42"));
        assert_eq!(b.data_id("qq").as_deref(), Some("42"));
    }

    #[test]
    fn locator_prefers_url() {
        let seg: Segment = serde_json::from_str(
            r#"{"type":"image","data":{"file":"abc.png","url":"http://x/y.png"}}"#,
        )
        .unwrap();
        assert_eq!(seg.locator(), Some("http://x/y.png"));
    }

    #[test]
    fn locator_falls_back_to_file() {
        let seg: Segment =
            serde_json::from_str(r#"{"type":"image","data":{"file":"abc.png"}}"#).unwrap();
        assert_eq!(seg.locator(), Some("abc.png"));
    }

    #[test]
    fn reply_builder_stringifies_id() {
        let seg = Segment::reply(-123);
        assert_eq!(seg.data_str("id"), Some("-123"));
    }

    #[test]
    fn id_to_i64_handles_signs() {
        assert_eq!(id_to_i64(&json!("-5")), Some(-5));
        assert_eq!(id_to_i64(&json!(7)), Some(7));
        assert_eq!(id_to_i64(&json!("abc")), None);
        assert_eq!(id_to_i64(&json!(null)), None);
    }
}
