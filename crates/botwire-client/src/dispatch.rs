//! Outbound dispatch: target resolution, text shaping, chunked delivery,
//! and media resolution.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, warn};

use botwire_core::segment::Segment;
use botwire_core::target::Target;
use botwire_core::text;

use crate::api::Api;
use crate::errors::Result;

/// Reserved destination for periodic liveness probes; dispatching to it
/// reports success without any network action.
pub const PROBE_DESTINATION: &str = "probe";

/// Extensions delivered as image segments; anything else is a file.
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Text-shaping and delivery policy.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Maximum characters per chunk.
    pub chunk_limit: usize,
    /// Delay between chunks of one multi-chunk send.
    pub chunk_delay: Duration,
    /// Strip markdown before sending.
    pub strip_markdown: bool,
    /// De-risk links before sending.
    pub anti_risk: bool,
    /// External prefix stripped from destinations before parsing.
    pub platform_prefix: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chunk_limit: 4000,
            chunk_delay: Duration::from_millis(1000),
            strip_markdown: true,
            anti_risk: true,
            platform_prefix: None,
        }
    }
}

/// Sends shaped text and media to resolved targets.
pub struct Dispatcher {
    api: Api,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Build a dispatcher over the gateway API.
    #[must_use]
    pub fn new(api: Api, config: DispatchConfig) -> Self {
        Self { api, config }
    }

    /// Parse a destination string, stripping the configured prefix first.
    pub fn resolve(&self, destination: &str) -> Result<Target> {
        let target = match &self.config.platform_prefix {
            Some(prefix) => Target::parse_prefixed(destination, prefix)?,
            None => Target::parse(destination)?,
        };
        Ok(target)
    }

    /// Shape and deliver text, chunking when oversized.
    ///
    /// A reply reference is attached to the first chunk only. Chunks are
    /// sent strictly in order with the configured delay between them;
    /// single-chunk sends skip the delay entirely.
    pub async fn send_text(
        &self,
        destination: &str,
        content: &str,
        reply_to: Option<i64>,
    ) -> Result<()> {
        if destination == PROBE_DESTINATION {
            debug!("probe destination, reporting success without sending");
            return Ok(());
        }
        let target = self.resolve(destination)?;

        let mut shaped = if self.config.strip_markdown {
            text::strip_markdown(content)
        } else {
            content.to_string()
        };
        if self.config.anti_risk {
            shaped = text::anti_risk(&shaped);
        }

        let chunks = text::chunk(&shaped, self.config.chunk_limit);
        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.chunk_delay).await;
            }
            let mut segments = Vec::with_capacity(2);
            if index == 0 {
                if let Some(id) = reply_to {
                    segments.push(Segment::reply(id));
                }
            }
            segments.push(Segment::text(chunk.clone()));
            let _ = self.deliver(&target, &segments).await?;
        }
        Ok(())
    }

    /// Resolve and deliver a media locator.
    ///
    /// `file:` URLs are re-encoded as inline base64; read failures fall
    /// back to passing the original locator through. Image extensions go
    /// out as image segments; other media attempts a native upload first
    /// and degrades to an inline file placeholder.
    pub async fn send_media(&self, destination: &str, url: &str) -> Result<()> {
        if destination == PROBE_DESTINATION {
            return Ok(());
        }
        let target = self.resolve(destination)?;
        let locator = resolve_locator(url).await;

        if is_image(url) {
            let _ = self
                .deliver(&target, &[Segment::image(locator)])
                .await?;
            return Ok(());
        }

        let name = file_name(url);
        let uploaded = match &target {
            Target::Group(group_id) => self
                .api
                .upload_group_file(*group_id, &locator, &name)
                .await
                .map(|_| ()),
            Target::Private(user_id) => self
                .api
                .upload_private_file(*user_id, &locator, &name)
                .await
                .map(|_| ()),
            Target::Guild { .. } => Err(crate::errors::ClientError::TransportUnavailable),
        };

        if let Err(error) = uploaded {
            warn!(%error, url, "native upload failed, sending file placeholder");
            let _ = self
                .deliver(&target, &[Segment::text(format!("[file] {url}"))])
                .await?;
        }
        Ok(())
    }

    async fn deliver(&self, target: &Target, segments: &[Segment]) -> Result<serde_json::Value> {
        match target {
            Target::Private(user_id) => self.api.send_private_msg(*user_id, segments).await,
            Target::Group(group_id) => self.api.send_group_msg(*group_id, segments).await,
            Target::Guild {
                guild_id,
                channel_id,
            } => {
                self.api
                    .send_guild_channel_msg(guild_id, channel_id, segments)
                    .await
            }
        }
    }
}

/// Re-encode `file:` URLs as base64 payloads; pass others through.
async fn resolve_locator(url: &str) -> String {
    let Some(path) = url.strip_prefix("file://").or_else(|| url.strip_prefix("file:")) else {
        return url.to_string();
    };
    match tokio::fs::read(path).await {
        Ok(bytes) => format!("base64://{}", BASE64.encode(bytes)),
        Err(error) => {
            warn!(%error, path, "local file read failed, passing url through");
            url.to_string()
        }
    }
}

fn is_image(url: &str) -> bool {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    trimmed
        .rsplit('.')
        .next()
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn file_name(url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    trimmed
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("file")
        .to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::sync::Arc;

    use serde_json::{Value, json};

    use crate::api::tests::RecordingCaller;
    use crate::errors::ClientError;
    use botwire_core::WireError;

    fn dispatcher(caller: Arc<RecordingCaller>, config: DispatchConfig) -> Dispatcher {
        Dispatcher::new(Api::new(caller), config)
    }

    fn fast_config() -> DispatchConfig {
        DispatchConfig {
            chunk_delay: Duration::from_millis(1),
            ..DispatchConfig::default()
        }
    }

    fn sent_messages(caller: &RecordingCaller) -> Vec<(String, Value)> {
        caller.calls.lock().clone()
    }

    #[tokio::test]
    async fn probe_destination_sends_nothing() {
        let caller = Arc::new(RecordingCaller::replying(json!({})));
        let d = dispatcher(caller.clone(), fast_config());
        d.send_text(PROBE_DESTINATION, "ping", None).await.unwrap();
        assert!(sent_messages(&caller).is_empty());
    }

    #[tokio::test]
    async fn bad_target_fails_before_any_call() {
        let caller = Arc::new(RecordingCaller::replying(json!({})));
        let d = dispatcher(caller.clone(), fast_config());
        let result = d.send_text("group:abc", "hi", None).await;
        assert!(matches!(
            result,
            Err(ClientError::Wire(WireError::TargetParse { .. }))
        ));
        assert!(sent_messages(&caller).is_empty());
    }

    #[tokio::test]
    async fn oversized_text_chunks_in_order() {
        let caller = Arc::new(RecordingCaller::replying(json!({})));
        let mut config = fast_config();
        config.strip_markdown = false;
        config.anti_risk = false;
        let d = dispatcher(caller.clone(), config);

        let long = "x".repeat(9000);
        d.send_text("group:123", &long, None).await.unwrap();

        let calls = sent_messages(&caller);
        assert_eq!(calls.len(), 3);
        let lens: Vec<usize> = calls
            .iter()
            .map(|(_, p)| p["message"][0]["data"]["text"].as_str().unwrap().len())
            .collect();
        assert_eq!(lens, vec![4000, 4000, 1000]);
        // Concatenation reconstructs the original exactly.
        let joined: String = calls
            .iter()
            .map(|(_, p)| p["message"][0]["data"]["text"].as_str().unwrap())
            .collect();
        assert_eq!(joined, long);
    }

    #[tokio::test]
    async fn reply_attached_to_first_chunk_only() {
        let caller = Arc::new(RecordingCaller::replying(json!({})));
        let mut config = fast_config();
        config.chunk_limit = 5;
        config.strip_markdown = false;
        config.anti_risk = false;
        let d = dispatcher(caller.clone(), config);

        d.send_text("private:55", "0123456789", Some(777)).await.unwrap();

        let calls = sent_messages(&caller);
        assert_eq!(calls.len(), 2);
        let first = &calls[0].1["message"];
        assert_eq!(first[0]["type"], "reply");
        assert_eq!(first[0]["data"]["id"], "777");
        assert_eq!(first[1]["data"]["text"], "01234");
        let second = &calls[1].1["message"];
        assert_eq!(second[0]["type"], "text");
        assert_eq!(second[0]["data"]["text"], "56789");
    }

    #[tokio::test]
    async fn markdown_and_links_shaped() {
        let caller = Arc::new(RecordingCaller::replying(json!({})));
        let d = dispatcher(caller.clone(), fast_config());
        d.send_text("private:1", "**bold** https://example.com", None)
            .await
            .unwrap();
        let calls = sent_messages(&caller);
        let sent = calls[0].1["message"][0]["data"]["text"].as_str().unwrap();
        assert_eq!(sent, "bold https:// example.com");
    }

    #[tokio::test]
    async fn prefixed_destination_resolves() {
        let caller = Arc::new(RecordingCaller::replying(json!({})));
        let mut config = fast_config();
        config.platform_prefix = Some("qq".into());
        let d = dispatcher(caller.clone(), config);
        d.send_text("qq:group:123", "hi", None).await.unwrap();
        assert_eq!(sent_messages(&caller)[0].0, "send_group_msg");
    }

    #[tokio::test]
    async fn guild_target_routes_to_channel_send() {
        let caller = Arc::new(RecordingCaller::replying(json!({})));
        let d = dispatcher(caller.clone(), fast_config());
        d.send_text("guild:9:4", "hello", None).await.unwrap();
        let calls = sent_messages(&caller);
        assert_eq!(calls[0].0, "send_guild_channel_msg");
        assert_eq!(calls[0].1["guild_id"], "9");
        assert_eq!(calls[0].1["channel_id"], "4");
    }

    // ── media ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn image_url_sent_as_image_segment() {
        let caller = Arc::new(RecordingCaller::replying(json!({})));
        let d = dispatcher(caller.clone(), fast_config());
        d.send_media("group:1", "https://cdn/pic.PNG?size=big")
            .await
            .unwrap();
        let calls = sent_messages(&caller);
        assert_eq!(calls[0].0, "send_group_msg");
        assert_eq!(calls[0].1["message"][0]["type"], "image");
    }

    #[tokio::test]
    async fn local_file_re_encoded_as_base64() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"png-bytes").unwrap();
        // Image handling keys off the extension, so give the file one.
        let path = tmp.path().with_extension("png");
        std::fs::copy(tmp.path(), &path).unwrap();

        let caller = Arc::new(RecordingCaller::replying(json!({})));
        let d = dispatcher(caller.clone(), fast_config());
        d.send_media("private:1", &format!("file://{}", path.display()))
            .await
            .unwrap();

        let calls = sent_messages(&caller);
        let file = calls[0].1["message"][0]["data"]["file"].as_str().unwrap();
        assert!(file.starts_with("base64://"));
        assert_eq!(
            file.trim_start_matches("base64://"),
            BASE64.encode(b"png-bytes")
        );
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn unreadable_file_passes_url_through() {
        let caller = Arc::new(RecordingCaller::replying(json!({})));
        let d = dispatcher(caller.clone(), fast_config());
        d.send_media("private:1", "file:///no/such/file.png")
            .await
            .unwrap();
        let calls = sent_messages(&caller);
        assert_eq!(
            calls[0].1["message"][0]["data"]["file"],
            "file:///no/such/file.png"
        );
    }

    #[tokio::test]
    async fn non_image_attempts_upload() {
        let caller = Arc::new(RecordingCaller::replying(json!({})));
        let d = dispatcher(caller.clone(), fast_config());
        d.send_media("group:5", "https://cdn/report.pdf").await.unwrap();
        let calls = sent_messages(&caller);
        assert_eq!(calls[0].0, "upload_group_file");
        assert_eq!(calls[0].1["name"], "report.pdf");
    }

    #[tokio::test]
    async fn failed_upload_falls_back_to_placeholder() {
        let caller = Arc::new(RecordingCaller::failing());
        let d = dispatcher(caller.clone(), fast_config());
        // Both the upload and the fallback fail here; the fallback error
        // is the one surfaced.
        let result = d.send_media("group:5", "https://cdn/report.pdf").await;
        assert!(result.is_err());
        let calls = sent_messages(&caller);
        assert_eq!(calls[0].0, "upload_group_file");
        assert_eq!(calls[1].0, "send_group_msg");
        assert!(
            calls[1].1["message"][0]["data"]["text"]
                .as_str()
                .unwrap()
                .starts_with("[file]")
        );
    }

    #[test]
    fn image_extension_matching() {
        assert!(is_image("a/b.jpg"));
        assert!(is_image("a/b.JPEG"));
        assert!(is_image("a/b.webp?x=1"));
        assert!(!is_image("a/b.pdf"));
        assert!(!is_image("a/b"));
    }
}
