//! Messenger capability: the transport boundary the bot talks through.
//!
//! The bot never speaks a wire protocol directly. Inbound traffic arrives as
//! [`InboundEvent`]s on a [`MessageStream`]; outbound traffic goes through the
//! [`Messenger`] trait so tests can swap in a recording double.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::attachments::{Attachment, AttachmentKind};
use crate::error::ChannelError;

/// Conversation identity (a Telegram chat id; negative for groups).
pub type ChatId = i64;

/// Identifier of a delivered message within its chat.
pub type MessageId = i64;

/// Stream of inbound events produced by a transport.
pub type MessageStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// The message an inbound event replies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepliedMessage {
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Largest size of an attached photo.
    pub photo: Option<String>,
    pub document: Option<String>,
}

impl RepliedMessage {
    /// Text or caption, whichever the message carries.
    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// The single attachment carried by the message, documents first.
    pub fn attachment(&self) -> Option<Attachment> {
        if let Some(ref id) = self.document {
            return Some(Attachment::new(AttachmentKind::Document, id));
        }
        self.photo
            .as_ref()
            .map(|id| Attachment::new(AttachmentKind::Photo, id))
    }
}

/// A single inbound message, already decoded from the provider format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: Option<String>,
    /// Largest size of an attached photo.
    pub photo: Option<String>,
    pub document: Option<String>,
    pub sender_id: i64,
    pub sender_username: Option<String>,
    pub reply_to: Option<RepliedMessage>,
}

impl InboundEvent {
    /// A plain text message from a private chat (chat id == sender id).
    pub fn text(chat_id: ChatId, text: &str) -> Self {
        Self {
            chat_id,
            sender_id: chat_id,
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.sender_username = Some(username.to_string());
        self
    }

    pub fn with_sender(mut self, sender_id: i64) -> Self {
        self.sender_id = sender_id;
        self
    }

    pub fn with_reply(mut self, reply: RepliedMessage) -> Self {
        self.reply_to = Some(reply);
        self
    }

    /// Trimmed text, if any.
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim)
    }

    /// The photo or document carried by this event, photos first.
    pub fn attachment(&self) -> Option<Attachment> {
        if let Some(ref id) = self.photo {
            return Some(Attachment::new(AttachmentKind::Photo, id));
        }
        self.document
            .as_ref()
            .map(|id| Attachment::new(AttachmentKind::Document, id))
    }

    /// `@username` or "—" for summaries and diagnostics.
    pub fn display_username(&self) -> String {
        match self.sender_username.as_deref() {
            Some(u) if !u.is_empty() => format!("@{u}"),
            _ => "—".to_string(),
        }
    }
}

/// Reply keyboard: rows of button labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub rows: Vec<Vec<String>>,
    /// Hide after one press (flow keyboards) or stay (main menu).
    pub one_time: bool,
}

impl Keyboard {
    pub fn new(rows: &[&[&str]], one_time: bool) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|row| row.iter().map(|label| label.to_string()).collect())
                .collect(),
            one_time,
        }
    }

    /// Whether `label` is one of the buttons.
    pub fn contains(&self, label: &str) -> bool {
        self.rows.iter().flatten().any(|l| l == label)
    }
}

/// Escape user-supplied text for HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

/// Options for [`Messenger::send_text`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub keyboard: Option<Keyboard>,
    pub reply_to: Option<MessageId>,
}

impl SendOptions {
    pub fn keyboard(keyboard: Keyboard) -> Self {
        Self {
            keyboard: Some(keyboard),
            reply_to: None,
        }
    }

    pub fn reply_to(message_id: MessageId) -> Self {
        Self {
            keyboard: None,
            reply_to: Some(message_id),
        }
    }
}

/// Outbound side of a transport.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send an HTML-formatted text message; returns the delivered message id.
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        options: SendOptions,
    ) -> Result<MessageId, ChannelError>;

    /// Send up to ten photos as one grouped message.
    async fn send_photo_group(
        &self,
        chat_id: ChatId,
        file_ids: &[String],
        reply_to: Option<MessageId>,
    ) -> Result<(), ChannelError>;

    /// Send a previously uploaded document by file reference.
    async fn send_document(
        &self,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
        reply_to: Option<MessageId>,
    ) -> Result<(), ChannelError>;

    /// Send a previously uploaded photo by file reference.
    async fn send_photo(
        &self,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    /// Upload an in-memory file as a document.
    async fn send_document_bytes(
        &self,
        chat_id: ChatId,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<(), ChannelError>;

    /// Send text with a reply keyboard.
    async fn send_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Keyboard,
    ) -> Result<MessageId, ChannelError> {
        self.send_text(chat_id, text, SendOptions::keyboard(keyboard))
            .await
    }

    /// Send an attachment by reference, choosing the right method for its kind.
    async fn send_attachment(
        &self,
        chat_id: ChatId,
        attachment: &Attachment,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        match attachment.kind {
            AttachmentKind::Photo => self.send_photo(chat_id, &attachment.file_id, caption).await,
            AttachmentKind::Document => {
                self.send_document(chat_id, &attachment.file_id, caption, None)
                    .await
            }
        }
    }
}
