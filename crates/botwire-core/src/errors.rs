//! Core error types.

use thiserror::Error;

/// Errors arising from wire-format parsing and validation.
#[derive(Debug, Error)]
pub enum WireError {
    /// A destination string did not match the target grammar.
    #[error(
        "invalid target `{input}`: expected `private:<id>`, `group:<id>`, \
         `guild:<id>:<id>`, or a bare numeric id"
    )]
    TargetParse {
        /// The offending destination string.
        input: String,
    },
    /// A message segment was structurally invalid.
    #[error("malformed segment: {0}")]
    MalformedSegment(String),
    /// The gateway reported a failed action.
    #[error("action failed (retcode {retcode}): {message}")]
    ActionFailed {
        /// Gateway return code.
        retcode: i64,
        /// Server-reported error message.
        message: String,
    },
    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, WireError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parse_names_input() {
        let err = WireError::TargetParse {
            input: "group:abc".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("group:abc"));
        assert!(msg.contains("guild:<id>:<id>"));
    }

    #[test]
    fn action_failed_display() {
        let err = WireError::ActionFailed {
            retcode: 100,
            message: "no such group".into(),
        };
        assert!(err.to_string().contains("retcode 100"));
        assert!(err.to_string().contains("no such group"));
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: WireError = json_err.into();
        assert!(matches!(err, WireError::Json(_)));
    }
}
