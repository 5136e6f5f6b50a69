//! Typed wrappers for the gateway's action set.
//!
//! Query calls surface their result; moderation and housekeeping calls
//! are fire-and-forget, with failures logged and discarded.

use std::sync::Arc;

use serde_json::{Value, json};

use botwire_core::segment::Segment;

use crate::errors::{Result, log_and_discard};
use crate::transport::ActionCaller;

/// Gateway API surface over any [`ActionCaller`].
#[derive(Clone)]
pub struct Api {
    caller: Arc<dyn ActionCaller>,
}

impl Api {
    /// Wrap a caller.
    #[must_use]
    pub fn new(caller: Arc<dyn ActionCaller>) -> Self {
        Self { caller }
    }

    // ── message delivery ────────────────────────────────────────────

    /// Send segments to a user. Returns the gateway payload (message id).
    pub async fn send_private_msg(&self, user_id: i64, message: &[Segment]) -> Result<Value> {
        self.caller
            .send_with_response(
                "send_private_msg",
                json!({"user_id": user_id, "message": message}),
            )
            .await
    }

    /// Send segments to a group.
    pub async fn send_group_msg(&self, group_id: i64, message: &[Segment]) -> Result<Value> {
        self.caller
            .send_with_response(
                "send_group_msg",
                json!({"group_id": group_id, "message": message}),
            )
            .await
    }

    /// Send segments to a guild channel.
    pub async fn send_guild_channel_msg(
        &self,
        guild_id: &str,
        channel_id: &str,
        message: &[Segment],
    ) -> Result<Value> {
        self.caller
            .send_with_response(
                "send_guild_channel_msg",
                json!({
                    "guild_id": guild_id,
                    "channel_id": channel_id,
                    "message": message,
                }),
            )
            .await
    }

    // ── lookups ─────────────────────────────────────────────────────

    /// Fetch a stored message by id (reply-quote resolution).
    pub async fn get_msg(&self, message_id: i64) -> Result<Value> {
        self.caller
            .send_with_response("get_msg", json!({"message_id": message_id}))
            .await
    }

    /// Fetch a forwarded-message bundle by its resource id.
    pub async fn get_forward_msg(&self, id: &str) -> Result<Value> {
        self.caller
            .send_with_response("get_forward_msg", json!({"id": id}))
            .await
    }

    /// Fetch the full member roster of a group.
    pub async fn get_group_member_list(&self, group_id: i64) -> Result<Value> {
        self.caller
            .send_with_response("get_group_member_list", json!({"group_id": group_id}))
            .await
    }

    /// Fetch a single group member's info.
    pub async fn get_group_member_info(&self, group_id: i64, user_id: i64) -> Result<Value> {
        self.caller
            .send_with_response(
                "get_group_member_info",
                json!({"group_id": group_id, "user_id": user_id}),
            )
            .await
    }

    /// Resolve a received file id to a downloadable location.
    pub async fn get_file(&self, file_id: &str) -> Result<Value> {
        self.caller
            .send_with_response("get_file", json!({"file_id": file_id}))
            .await
    }

    /// Fetch the friend list.
    pub async fn get_friend_list(&self) -> Result<Value> {
        self.caller.send_with_response("get_friend_list", json!({})).await
    }

    /// Fetch the joined-group list.
    pub async fn get_group_list(&self) -> Result<Value> {
        self.caller.send_with_response("get_group_list", json!({})).await
    }

    /// Fetch the joined-guild list.
    pub async fn get_guild_list(&self) -> Result<Value> {
        self.caller.send_with_response("get_guild_list", json!({})).await
    }

    /// Fetch the bot's own account info.
    pub async fn get_login_info(&self) -> Result<Value> {
        self.caller.send_with_response("get_login_info", json!({})).await
    }

    /// Fetch gateway status (connectivity probe).
    pub async fn get_status(&self) -> Result<Value> {
        self.caller.send_with_response("get_status", json!({})).await
    }

    // ── file upload ─────────────────────────────────────────────────

    /// Upload a file to a group via the native upload action.
    pub async fn upload_group_file(&self, group_id: i64, file: &str, name: &str) -> Result<Value> {
        self.caller
            .send_with_response(
                "upload_group_file",
                json!({"group_id": group_id, "file": file, "name": name}),
            )
            .await
    }

    /// Upload a file to a user via the native upload action.
    pub async fn upload_private_file(&self, user_id: i64, file: &str, name: &str) -> Result<Value> {
        self.caller
            .send_with_response(
                "upload_private_file",
                json!({"user_id": user_id, "file": file, "name": name}),
            )
            .await
    }

    // ── fire-and-forget moderation ──────────────────────────────────

    /// Mute a member for `duration_secs` (0 lifts the mute).
    pub async fn ban(&self, group_id: i64, user_id: i64, duration_secs: u64) {
        log_and_discard(
            "set_group_ban",
            self.caller
                .send_action(
                    "set_group_ban",
                    json!({
                        "group_id": group_id,
                        "user_id": user_id,
                        "duration": duration_secs,
                    }),
                )
                .await,
        );
    }

    /// Remove a member from a group.
    pub async fn kick(&self, group_id: i64, user_id: i64) {
        log_and_discard(
            "set_group_kick",
            self.caller
                .send_action(
                    "set_group_kick",
                    json!({"group_id": group_id, "user_id": user_id}),
                )
                .await,
        );
    }

    /// Approve or reject a friend request.
    pub async fn set_friend_add_request(&self, flag: &str, approve: bool) {
        log_and_discard(
            "set_friend_add_request",
            self.caller
                .send_action(
                    "set_friend_add_request",
                    json!({"flag": flag, "approve": approve}),
                )
                .await,
        );
    }

    /// Approve or reject a group join/invite request.
    pub async fn set_group_add_request(&self, flag: &str, sub_type: &str, approve: bool) {
        log_and_discard(
            "set_group_add_request",
            self.caller
                .send_action(
                    "set_group_add_request",
                    json!({"flag": flag, "sub_type": sub_type, "approve": approve}),
                )
                .await,
        );
    }

    /// Recall a previously sent message.
    pub async fn delete_msg(&self, message_id: i64) {
        log_and_discard(
            "delete_msg",
            self.caller
                .send_action("delete_msg", json!({"message_id": message_id}))
                .await,
        );
    }

    /// Mark a message as read.
    pub async fn mark_msg_as_read(&self, message_id: i64) {
        log_and_discard(
            "mark_msg_as_read",
            self.caller
                .send_action("mark_msg_as_read", json!({"message_id": message_id}))
                .await,
        );
    }

    /// Attach an emoji reaction to a message.
    pub async fn set_msg_emoji_like(&self, message_id: i64, emoji_id: i64) {
        log_and_discard(
            "set_msg_emoji_like",
            self.caller
                .send_action(
                    "set_msg_emoji_like",
                    json!({"message_id": message_id, "emoji_id": emoji_id}),
                )
                .await,
        );
    }

    /// Poke a group member.
    pub async fn group_poke(&self, group_id: i64, user_id: i64) {
        log_and_discard(
            "group_poke",
            self.caller
                .send_action(
                    "group_poke",
                    json!({"group_id": group_id, "user_id": user_id}),
                )
                .await,
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
