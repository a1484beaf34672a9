//! Telegram Bot API adapter.
//!
//! Outbound calls go through [`TelegramMessenger`], which implements
//! [`Messenger`]. Inbound updates arrive either from the webhook route or
//! from [`TelegramMessenger::poll`], and are decoded by [`parse_update`].

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::error::ChannelError;

use super::messenger::{
    ChatId, InboundEvent, Keyboard, MessageId, MessageStream, Messenger, RepliedMessage,
    SendOptions,
};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

fn send_failed(reason: impl std::fmt::Display) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason: reason.to_string(),
    }
}

/// Transport failure with the request URL removed; the URL carries the token.
fn transport_failed(e: reqwest::Error) -> ChannelError {
    send_failed(e.without_url())
}

/// Telegram Bot API client.
pub struct TelegramMessenger {
    bot_token: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramMessenger {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at another Bot API server (local server, tests).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// POST a JSON body and return the `result` field of a successful reply.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(transport_failed)?;
        Self::read_result(method, resp).await
    }

    async fn read_result(method: &str, resp: reqwest::Response) -> Result<Value, ChannelError> {
        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| {
                ChannelError::InvalidMessage(format!("{method}: {}", e.without_url()))
            })?;
        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(send_failed(format!("{method} failed ({status}): {description}")));
        }
        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Send one chunk (≤4096 chars), HTML first with a plain-text retry when
    /// Telegram rejects the markup.
    async fn send_message_chunk(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, ChannelError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(kb) = keyboard {
            body["reply_markup"] = keyboard_markup(kb);
        }
        if let Some(id) = reply_to {
            body["reply_to_message_id"] = json!(id);
        }

        let result = match self.call("sendMessage", &body).await {
            Ok(result) => result,
            Err(ChannelError::SendFailed { reason, .. }) if reason.contains("parse entities") => {
                tracing::warn!(chat_id, "Telegram rejected HTML; retrying without parse_mode");
                if let Some(obj) = body.as_object_mut() {
                    obj.remove("parse_mode");
                }
                self.call("sendMessage", &body).await?
            }
            Err(e) => return Err(e),
        };
        Ok(result
            .get("message_id")
            .and_then(Value::as_i64)
            .unwrap_or_default())
    }

    /// Register `url` as the webhook, dropping updates queued meanwhile.
    pub async fn set_webhook(&self, url: &str) -> Result<(), ChannelError> {
        self.call(
            "setWebhook",
            &json!({ "url": url, "drop_pending_updates": true }),
        )
        .await
        .map_err(|e| ChannelError::StartupFailed {
            name: "telegram".into(),
            reason: e.to_string(),
        })?;
        tracing::info!("Telegram webhook registered");
        Ok(())
    }

    /// Remove any webhook so getUpdates works.
    pub async fn delete_webhook(&self) -> Result<(), ChannelError> {
        self.call("deleteWebhook", &json!({ "drop_pending_updates": false }))
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Long-poll getUpdates in a background task and stream decoded events.
    pub fn poll(&self) -> MessageStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram long polling started");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {}", e.without_url());
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {}", e.without_url());
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!("Telegram getUpdates refused: {data}");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                };
                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }
                    let Some(event) = parse_update(update) else {
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

        Box::pin(stream)
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        options: SendOptions,
    ) -> Result<MessageId, ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);
        let mut first_id = None;

        // Reply on the first chunk, keyboard on the last.
        for (i, chunk) in chunks.iter().enumerate() {
            let keyboard = if i == last {
                options.keyboard.as_ref()
            } else {
                None
            };
            let reply_to = if i == 0 { options.reply_to } else { None };
            let id = self
                .send_message_chunk(chat_id, chunk, keyboard, reply_to)
                .await?;
            first_id.get_or_insert(id);
        }
        Ok(first_id.unwrap_or_default())
    }

    async fn send_photo_group(
        &self,
        chat_id: ChatId,
        file_ids: &[String],
        reply_to: Option<MessageId>,
    ) -> Result<(), ChannelError> {
        let media: Vec<Value> = file_ids
            .iter()
            .map(|id| json!({ "type": "photo", "media": id }))
            .collect();
        let mut body = json!({ "chat_id": chat_id, "media": media });
        if let Some(id) = reply_to {
            body["reply_to_message_id"] = json!(id);
        }
        self.call("sendMediaGroup", &body).await?;
        tracing::info!(chat_id, count = file_ids.len(), "Telegram photo group sent");
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
        reply_to: Option<MessageId>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "chat_id": chat_id, "document": file_id });
        if let Some(cap) = caption {
            body["caption"] = Value::String(cap.to_string());
        }
        if let Some(id) = reply_to {
            body["reply_to_message_id"] = json!(id);
        }
        self.call("sendDocument", &body).await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "chat_id": chat_id, "photo": file_id });
        if let Some(cap) = caption {
            body["caption"] = Value::String(cap.to_string());
        }
        self.call("sendPhoto", &body).await?;
        Ok(())
    }

    async fn send_document_bytes(
        &self,
        chat_id: ChatId,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<(), ChannelError> {
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(transport_failed)?;
        Self::read_result("sendDocument", resp).await?;

        tracing::info!(chat_id, file_name, "Telegram document uploaded");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// `reply_markup` for a reply keyboard.
fn keyboard_markup(keyboard: &Keyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .rows
        .iter()
        .map(|row| row.iter().map(|label| json!({ "text": label })).collect())
        .collect();
    json!({
        "keyboard": rows,
        "resize_keyboard": true,
        "one_time_keyboard": keyboard.one_time,
    })
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

/// File id of the largest size in a `photo` array.
fn largest_photo(message: &Value) -> Option<String> {
    message
        .get("photo")
        .and_then(Value::as_array)
        .and_then(|sizes| sizes.last())
        .and_then(|size| str_field(size, "file_id"))
}

fn document_id(message: &Value) -> Option<String> {
    message
        .get("document")
        .and_then(|d| str_field(d, "file_id"))
}

/// Decode a Bot API update into an [`InboundEvent`].
///
/// Returns `None` for updates that carry no message or no chat.
pub fn parse_update(update: &Value) -> Option<InboundEvent> {
    let message = update.get("message")?;
    let chat_id = message.get("chat")?.get("id")?.as_i64()?;
    let from = message.get("from");

    let reply_to = message.get("reply_to_message").map(|reply| RepliedMessage {
        text: str_field(reply, "text"),
        caption: str_field(reply, "caption"),
        photo: largest_photo(reply),
        document: document_id(reply),
    });

    Some(InboundEvent {
        chat_id,
        message_id: message
            .get("message_id")
            .and_then(Value::as_i64)
            .unwrap_or_default(),
        text: str_field(message, "text").or_else(|| str_field(message, "caption")),
        photo: largest_photo(message),
        document: document_id(message),
        sender_id: from
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)
            .unwrap_or(chat_id),
        sender_username: from.and_then(|f| str_field(f, "username")),
        reply_to,
    })
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        // Byte offset of the first char past the limit, if any.
        let Some((cut, _)) = remaining.char_indices().nth(max_len) else {
            chunks.push(remaining.to_string());
            break;
        };

        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&pos| pos > 0)
            .unwrap_or(cut);

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

    fn messenger() -> TelegramMessenger {
        TelegramMessenger::new(SecretString::from("123:ABC"))
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            messenger().api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
        assert_eq!(
            messenger()
                .with_api_base("http://localhost:8081/")
                .api_url("sendMediaGroup"),
            "http://localhost:8081/bot123:ABC/sendMediaGroup"
        );
    }

    #[test]
    fn keyboard_markup_flags() {
        let kb = Keyboard::new(&[&["A", "B"], &["C"]], true);
        let markup = keyboard_markup(&kb);
        assert_eq!(markup["keyboard"][0][1]["text"], "B");
        assert_eq!(markup["keyboard"][1][0]["text"], "C");
        assert_eq!(markup["resize_keyboard"], true);
        assert_eq!(markup["one_time_keyboard"], true);
    }

    #[test]
    fn parse_text_update() {
        let update = json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "chat": { "id": 42, "type": "private" },
                "from": { "id": 42, "username": "alice" },
                "text": "/start"
            }
        });
        let event = parse_update(&update).unwrap();
        assert_eq!(event.chat_id, 42);
        assert_eq!(event.message_id, 10);
        assert_eq!(event.text.as_deref(), Some("/start"));
        assert_eq!(event.sender_username.as_deref(), Some("alice"));
        assert!(event.reply_to.is_none());
    }

    #[test]
    fn parse_photo_takes_largest_size() {
        let update = json!({
            "message": {
                "message_id": 11,
                "chat": { "id": 42 },
                "from": { "id": 42 },
                "caption": "receipt",
                "photo": [
                    { "file_id": "small", "width": 90 },
                    { "file_id": "large", "width": 1280 }
                ]
            }
        });
        let event = parse_update(&update).unwrap();
        assert_eq!(event.photo.as_deref(), Some("large"));
        assert_eq!(event.text.as_deref(), Some("receipt"));
        assert!(event.sender_username.is_none());
    }

    #[test]
    fn parse_reply_to_card() {
        let update = json!({
            "message": {
                "message_id": 12,
                "chat": { "id": -100200300 },
                "from": { "id": 7, "username": "boss" },
                "text": "/senddoc 555",
                "reply_to_message": {
                    "message_id": 3,
                    "caption": "voucher",
                    "document": { "file_id": "doc-1" }
                }
            }
        });
        let event = parse_update(&update).unwrap();
        assert_eq!(event.sender_id, 7);
        let reply = event.reply_to.unwrap();
        assert_eq!(reply.document.as_deref(), Some("doc-1"));
        assert_eq!(reply.caption.as_deref(), Some("voucher"));
    }

    #[test]
    fn parse_ignores_non_message_updates() {
        assert!(parse_update(&json!({ "update_id": 5, "edited_message": {} })).is_none());
        assert!(parse_update(&json!({ "message": { "text": "no chat" } })).is_none());
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_short_message_is_single_chunk() {
        assert_eq!(split_message("hello", 4096), vec!["hello".to_string()]);
    }

    #[test]
    fn split_prefers_newlines() {
        let chunks = split_message("aaaa\nbbbb\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb".to_string(), "cccc".to_string()]);
    }

    #[test]
    fn split_hard_cuts_without_break_points() {
        let chunks = split_message("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn split_counts_chars_not_bytes() {
        let text = "🏨".repeat(5);
        let chunks = split_message(&text, 2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], "🏨");
    }

    // ── Network error tests (nothing listens on the target port) ────

    #[tokio::test]
    async fn send_failure_maps_to_channel_error() {
        let ch = messenger().with_api_base("http://127.0.0.1:9");
        let err = ch
            .send_text(1, "hi", SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { .. }));

        let err = ch
            .send_document_bytes(1, b"a;b\n".to_vec(), "requests.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { .. }));
    }

    #[tokio::test]
    async fn transport_errors_never_carry_the_token() {
        let ch = TelegramMessenger::new(SecretString::from("999:SECRET_TOKEN"))
            .with_api_base("http://127.0.0.1:9");

        let err = ch
            .send_text(1, "hi", SendOptions::default())
            .await
            .unwrap_err();
        let shown = err.to_string();
        assert!(!shown.contains("SECRET_TOKEN"), "token leaked: {shown}");
        assert!(!shown.contains("/bot999"), "url leaked: {shown}");

        let err = ch
            .send_document_bytes(1, b"x".to_vec(), "requests.csv")
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("SECRET_TOKEN"));

        let err = ch.set_webhook("https://example.org/webhook/x").await.unwrap_err();
        assert!(!err.to_string().contains("SECRET_TOKEN"));
    }
}
