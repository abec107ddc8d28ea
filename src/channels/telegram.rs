//! Telegram channel: long-polls the Bot API for messages and button presses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::keyboard::{Keyboard, decode_callback, decode_text};
use crate::channels::types::{
    Channel, DownloadedFile, EventStream, Inbound, InboundEvent, MessageBody, OutgoingMessage,
    PhotoUpload,
};
use crate::error::ChannelError;
use crate::media::BlobStore;
use crate::profile::{MediaId, UserId};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Maximum caption length for sendPhoto.
const TELEGRAM_MAX_CAPTION_LENGTH: usize = 1024;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram channel backed by Bot API long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    client: reqwest::Client,
    blobs: Arc<dyn BlobStore>,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
            blobs,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{method}", self.bot_token.expose_secret())
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{API_BASE}/file/bot{}/{file_path}",
            self.bot_token.expose_secret()
        )
    }

    fn send_failed(reason: impl Into<String>) -> ChannelError {
        ChannelError::SendFailed {
            name: "telegram".into(),
            reason: reason.into(),
        }
    }

    fn download_failed(reason: impl Into<String>) -> ChannelError {
        ChannelError::DownloadFailed {
            name: "telegram".into(),
            reason: reason.into(),
        }
    }

    /// Send plain text, split into chunks under Telegram's 4096 char limit.
    /// The keyboard rides on the last chunk.
    async fn send_text(
        &self,
        chat_id: UserId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if i == last {
                if let Some(keyboard) = keyboard {
                    body["reply_markup"] = keyboard.reply_markup();
                }
            }

            let resp = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&body)
                .send()
                .await
                .map_err(|e| Self::send_failed(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let err = resp.text().await.unwrap_or_default();
                return Err(Self::send_failed(format!(
                    "sendMessage returned {status}: {err}"
                )));
            }
        }
        Ok(())
    }

    /// Upload a stored photo with a caption.
    async fn send_photo(
        &self,
        chat_id: UserId,
        media: MediaId,
        caption: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), ChannelError> {
        let blob = self
            .blobs
            .fetch(media)
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        let part = Part::bytes(blob.bytes).file_name(blob.file_name);
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", part);

        // Long captions go out as a follow-up text instead.
        let caption_fits = caption.chars().count() <= TELEGRAM_MAX_CAPTION_LENGTH;
        if caption_fits {
            form = form.text("caption", caption.to_string());
            if let Some(keyboard) = keyboard {
                form = form.text("reply_markup", keyboard.reply_markup().to_string());
            }
        }

        let resp = self
            .client
            .post(self.api_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::send_failed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(Self::send_failed(format!(
                "sendPhoto returned {status}: {err}"
            )));
        }

        if !caption_fits {
            self.send_text(chat_id, caption, keyboard).await?;
        }
        tracing::debug!(chat_id, media_id = %media, "Telegram photo sent");
        Ok(())
    }

    /// Stop the client-side spinner on an inline button. Best-effort.
    async fn answer_callback_query(&self, callback_id: &str) {
        let result = self
            .client
            .post(self.api_url("answerCallbackQuery"))
            .json(&serde_json::json!({ "callback_query_id": callback_id }))
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!("Telegram answerCallbackQuery failed: {e}");
        }
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let poller = TelegramChannel {
            bot_token: self.bot_token.clone(),
            client: self.client.clone(),
            blobs: Arc::clone(&self.blobs),
        };

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match poller
                    .client
                    .post(poller.api_url("getUpdates"))
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!("Telegram getUpdates returned no result: {data}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let parsed = parse_update(update);
                    if let Some(callback_id) = parsed.callback_id.as_deref() {
                        poller.answer_callback_query(callback_id).await;
                    }
                    let Some(event) = parsed.event else {
                        continue;
                    };

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), ChannelError> {
        match &message.body {
            MessageBody::Text(text) => {
                self.send_text(message.recipient, text, message.keyboard)
                    .await
            }
            MessageBody::Photo { media, caption } => {
                match self
                    .send_photo(message.recipient, *media, caption, message.keyboard)
                    .await
                {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        tracing::warn!(
                            chat_id = message.recipient,
                            media_id = %media,
                            "Photo send failed, falling back to text: {e}"
                        );
                        self.send_text(message.recipient, caption, message.keyboard)
                            .await
                    }
                }
            }
        }
    }

    async fn download_photo(&self, file_id: &str) -> Result<DownloadedFile, ChannelError> {
        let resp = self
            .client
            .post(self.api_url("getFile"))
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await
            .map_err(|e| Self::download_failed(e.to_string()))?;

        let data: Value = resp
            .json()
            .await
            .map_err(|e| Self::download_failed(e.to_string()))?;
        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .ok_or_else(|| Self::download_failed(format!("getFile returned no file_path: {data}")))?;

        let resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| Self::download_failed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::download_failed(format!(
                "file download returned {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Self::download_failed(e.to_string()))?;

        Ok(DownloadedFile {
            bytes: bytes.to_vec(),
            extension: file_extension(file_path),
        })
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// One decoded update. Callback queries carry an id to acknowledge even
/// when their data is not understood.
#[derive(Debug, Default)]
struct ParsedUpdate {
    event: Option<InboundEvent>,
    callback_id: Option<String>,
}

fn parse_update(update: &Value) -> ParsedUpdate {
    if let Some(callback) = update.get("callback_query") {
        let callback_id = callback
            .get("id")
            .and_then(Value::as_str)
            .map(String::from);
        let event = callback.get("from").and_then(|from| {
            let sender = from.get("id").and_then(Value::as_i64)?;
            let data = callback.get("data").and_then(Value::as_str)?;
            let Some(payload) = decode_callback(data) else {
                tracing::debug!(sender, data, "Telegram: ignoring unknown callback data");
                return None;
            };
            Some(with_username(InboundEvent::new(sender, payload), from))
        });
        return ParsedUpdate { event, callback_id };
    }

    let Some(message) = update.get("message") else {
        return ParsedUpdate::default();
    };
    let Some(from) = message.get("from") else {
        return ParsedUpdate::default();
    };
    let Some(sender) = from.get("id").and_then(Value::as_i64) else {
        return ParsedUpdate::default();
    };

    let payload = if let Some(photo) = largest_photo(message) {
        Inbound::Photo(photo)
    } else if let Some(text) = message.get("text").and_then(Value::as_str) {
        decode_text(text)
    } else {
        // Stickers, documents and the like are answered as empty text.
        Inbound::Text(String::new())
    };

    ParsedUpdate {
        event: Some(with_username(InboundEvent::new(sender, payload), from)),
        callback_id: None,
    }
}

fn with_username(event: InboundEvent, from: &Value) -> InboundEvent {
    match from.get("username").and_then(Value::as_str) {
        Some(username) if !username.is_empty() => event.with_username(username),
        _ => event,
    }
}

/// Telegram sends several sizes of one photo; keep the largest.
fn largest_photo(message: &Value) -> Option<PhotoUpload> {
    message
        .get("photo")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|size| {
            let file_id = size.get("file_id").and_then(Value::as_str)?;
            Some(PhotoUpload {
                file_id: file_id.to_string(),
                file_size: size.get("file_size").and_then(Value::as_u64),
            })
        })
        .max_by_key(|p| p.file_size.unwrap_or(0))
}

fn file_extension(file_path: &str) -> Option<String> {
    std::path::Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(String::from)
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        let Some((boundary, _)) = remaining.char_indices().nth(max_len) else {
            chunks.push(remaining.to_string());
            break;
        };

        // Find a good split point
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(boundary);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
        if remaining.is_empty() {
            break;
        }
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::types::{FollowDecision, MenuCommand};
    use crate::error::MediaError;
    use crate::media::StoredBlob;

    struct NoBlobs;

    #[async_trait]
    impl BlobStore for NoBlobs {
        async fn store(&self, _: UserId, _: &[u8], _: Option<&str>) -> Result<MediaId, MediaError> {
            Ok(MediaId(1))
        }
        async fn fetch(&self, id: MediaId) -> Result<StoredBlob, MediaError> {
            Err(MediaError::NotFound(id.0))
        }
        async fn delete(&self, _: MediaId) -> Result<(), MediaError> {
            Ok(())
        }
    }

    fn channel(token: &str) -> TelegramChannel {
        TelegramChannel::new(SecretString::from(token.to_string()), Arc::new(NoBlobs))
    }

    // ── Basic channel tests ─────────────────────────────────────────

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel("fake-token").name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch = channel("123:ABC");
        assert_eq!(
            ch.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
        assert_eq!(
            ch.file_url("photos/file_1.jpg"),
            "https://api.telegram.org/file/bot123:ABC/photos/file_1.jpg"
        );
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parses_text_with_username() {
        let update = serde_json::json!({
            "update_id": 1,
            "message": {
                "from": { "id": 42, "username": "alice" },
                "chat": { "id": 42 },
                "text": "🤜🤛👥 Find Partner"
            }
        });
        let event = parse_update(&update).event.unwrap();
        assert_eq!(event.sender, 42);
        assert_eq!(event.username.as_deref(), Some("alice"));
        assert_eq!(event.payload, Inbound::Command(MenuCommand::FindPartner));
    }

    #[test]
    fn parses_largest_photo() {
        let update = serde_json::json!({
            "message": {
                "from": { "id": 7 },
                "photo": [
                    { "file_id": "small", "file_size": 100 },
                    { "file_id": "large", "file_size": 9000 },
                    { "file_id": "medium", "file_size": 2000 }
                ]
            }
        });
        let event = parse_update(&update).event.unwrap();
        assert!(event.username.is_none());
        assert_eq!(
            event.payload,
            Inbound::Photo(PhotoUpload {
                file_id: "large".into(),
                file_size: Some(9000)
            })
        );
    }

    #[test]
    fn unsupported_content_is_empty_text() {
        let update = serde_json::json!({
            "message": { "from": { "id": 7 }, "sticker": { "file_id": "s" } }
        });
        let event = parse_update(&update).event.unwrap();
        assert_eq!(event.payload, Inbound::Text(String::new()));
    }

    #[test]
    fn parses_callback_query() {
        let update = serde_json::json!({
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 99, "username": "carol" },
                "data": "decline_follow:42"
            }
        });
        let parsed = parse_update(&update);
        assert_eq!(parsed.callback_id.as_deref(), Some("cb-1"));
        let event = parsed.event.unwrap();
        assert_eq!(event.sender, 99);
        assert_eq!(
            event.payload,
            Inbound::FollowDecision {
                decision: FollowDecision::Decline,
                requester_id: 42
            }
        );
    }

    #[test]
    fn unknown_callback_is_still_acknowledged() {
        let update = serde_json::json!({
            "callback_query": { "id": "cb-2", "from": { "id": 1 }, "data": "noise" }
        });
        let parsed = parse_update(&update);
        assert_eq!(parsed.callback_id.as_deref(), Some("cb-2"));
        assert!(parsed.event.is_none());
    }

    #[test]
    fn other_updates_are_ignored() {
        let update = serde_json::json!({ "update_id": 3, "edited_message": {} });
        let parsed = parse_update(&update);
        assert!(parsed.event.is_none());
        assert!(parsed.callback_id.is_none());
    }

    #[test]
    fn extension_from_file_path() {
        assert_eq!(file_extension("photos/file_3.jpg").as_deref(), Some("jpg"));
        assert_eq!(file_extension("photos/file_3"), None);
    }

    // ── Network error tests (expected to fail with no server) ───────

    #[tokio::test]
    async fn photo_send_without_blob_falls_back_to_text() {
        let ch = channel("fake-token");
        // The blob is missing, so the text fallback is attempted and fails
        // on the network instead.
        let result = ch
            .send(OutgoingMessage::photo(123456, MediaId(5), "caption"))
            .await;
        assert!(matches!(result, Err(ChannelError::SendFailed { .. })));
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_over_limit_on_space() {
        let msg = format!("{} {}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_multibyte_hard_cut() {
        let msg = "é".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 4096);
        assert_eq!(chunks[1].chars().count(), 904);
    }

    #[test]
    fn split_message_empty() {
        assert_eq!(split_message("", 4096), vec![String::new()]);
    }
}
