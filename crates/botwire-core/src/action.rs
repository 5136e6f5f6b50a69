//! Outbound action call frames and their responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::WireError;

/// An action call sent to the gateway, as a socket frame or HTTP body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Action name (`send_group_msg`, `get_msg`, ...).
    pub action: String,
    /// Action parameters.
    pub params: Value,
    /// Correlation token echoed back in the response frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

impl ActionRequest {
    /// Fire-and-forget frame (no correlation token).
    #[must_use]
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params,
            echo: None,
        }
    }

    /// Frame expecting a correlated reply.
    #[must_use]
    pub fn with_echo(action: impl Into<String>, params: Value, echo: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params,
            echo: Some(echo.into()),
        }
    }
}

/// A gateway response to an action call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// `ok`, `async`, or `failed`.
    #[serde(default)]
    pub status: Option<String>,
    /// Gateway return code (0 on success).
    #[serde(default)]
    pub retcode: Option<i64>,
    /// Result payload.
    #[serde(default)]
    pub data: Value,
    /// Short error message on failure.
    #[serde(default)]
    pub msg: Option<String>,
    /// Human-oriented error description on failure.
    #[serde(default)]
    pub wording: Option<String>,
    /// Echoed correlation token.
    #[serde(default)]
    pub echo: Option<String>,
}

impl ActionResponse {
    /// Whether the status field indicates success (`ok`/`async`/absent).
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self.status.as_deref(), Some("ok" | "async") | None)
    }

    /// Map the response to a result per the gateway status convention:
    /// `ok` and `async` succeed with `data`, anything else fails with the
    /// server-reported message.
    pub fn into_result(self) -> Result<Value, WireError> {
        match self.status.as_deref() {
            Some("ok" | "async") | None => Ok(self.data),
            _ => Err(WireError::ActionFailed {
                retcode: self.retcode.unwrap_or(-1),
                message: self
                    .wording
                    .or(self.msg)
                    .unwrap_or_else(|| "unknown error".into()),
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
