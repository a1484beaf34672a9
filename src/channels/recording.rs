//! In-memory [`Messenger`] that records every outbound call.
//!
//! Test fixture only: used by the unit tests and by `tests/`, never by the
//! binary. It is public so integration tests can reach it; nothing it
//! records leaves the process.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use crate::error::ChannelError;

use super::messenger::{ChatId, Keyboard, MessageId, Messenger, SendOptions};

/// One recorded outbound call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outgoing {
    pub chat_id: ChatId,
    /// Id the recorder handed back for this message.
    pub message_id: MessageId,
    pub text: Option<String>,
    pub keyboard: Option<Keyboard>,
    pub reply_to: Option<MessageId>,
    pub photos: Vec<String>,
    pub document: Option<String>,
    pub caption: Option<String>,
    /// Set for in-memory uploads.
    pub file_name: Option<String>,
    pub bytes: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Outgoing>>,
    next_id: AtomicI64,
    failing: HashSet<ChatId>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `chat_id` fail.
    pub fn failing_for(mut self, chat_id: ChatId) -> Self {
        self.failing.insert(chat_id);
        self
    }

    pub fn all(&self) -> Vec<Outgoing> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn sent_to(&self, chat_id: ChatId) -> Vec<Outgoing> {
        self.all()
            .into_iter()
            .filter(|o| o.chat_id == chat_id)
            .collect()
    }

    /// Text of every text message sent to `chat_id`, in order.
    pub fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent_to(chat_id)
            .into_iter()
            .filter_map(|o| o.text)
            .collect()
    }

    pub fn last_to(&self, chat_id: ChatId) -> Option<Outgoing> {
        self.sent_to(chat_id).pop()
    }

    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn record(&self, mut outgoing: Outgoing) -> Result<MessageId, ChannelError> {
        if self.failing.contains(&outgoing.chat_id) {
            return Err(ChannelError::SendFailed {
                name: "recording".into(),
                reason: format!("chat {} unreachable", outgoing.chat_id),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        outgoing.message_id = id;
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(outgoing);
        Ok(id)
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        options: SendOptions,
    ) -> Result<MessageId, ChannelError> {
        self.record(Outgoing {
            chat_id,
            text: Some(text.to_string()),
            keyboard: options.keyboard,
            reply_to: options.reply_to,
            ..Default::default()
        })
    }

    async fn send_photo_group(
        &self,
        chat_id: ChatId,
        file_ids: &[String],
        reply_to: Option<MessageId>,
    ) -> Result<(), ChannelError> {
        self.record(Outgoing {
            chat_id,
            photos: file_ids.to_vec(),
            reply_to,
            ..Default::default()
        })
        .map(|_| ())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
        reply_to: Option<MessageId>,
    ) -> Result<(), ChannelError> {
        self.record(Outgoing {
            chat_id,
            document: Some(file_id.to_string()),
            caption: caption.map(str::to_string),
            reply_to,
            ..Default::default()
        })
        .map(|_| ())
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.record(Outgoing {
            chat_id,
            photos: vec![file_id.to_string()],
            caption: caption.map(str::to_string),
            ..Default::default()
        })
        .map(|_| ())
    }

    async fn send_document_bytes(
        &self,
        chat_id: ChatId,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<(), ChannelError> {
        self.record(Outgoing {
            chat_id,
            file_name: Some(file_name.to_string()),
            bytes: Some(bytes),
            ..Default::default()
        })
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::Attachment;

    #[tokio::test]
    async fn records_in_order_with_increasing_ids() {
        let m = RecordingMessenger::new();
        let a = m.send_text(1, "a", SendOptions::default()).await.unwrap();
        let b = m.send_text(2, "b", SendOptions::reply_to(a)).await.unwrap();
        assert!(b > a);
        assert_eq!(m.texts_to(1), vec!["a".to_string()]);
        assert_eq!(m.last_to(2).unwrap().reply_to, Some(a));
    }

    #[tokio::test]
    async fn send_attachment_picks_method_by_kind() {
        let m = RecordingMessenger::new();
        m.send_attachment(1, &Attachment::photo("p"), Some("cap"))
            .await
            .unwrap();
        m.send_attachment(1, &Attachment::document("d"), None)
            .await
            .unwrap();
        let sent = m.sent_to(1);
        assert_eq!(sent[0].photos, vec!["p".to_string()]);
        assert_eq!(sent[0].caption.as_deref(), Some("cap"));
        assert_eq!(sent[1].document.as_deref(), Some("d"));
    }

    #[tokio::test]
    async fn failing_chat_errors_and_records_nothing() {
        let m = RecordingMessenger::new().failing_for(9);
        assert!(m.send_text(9, "x", SendOptions::default()).await.is_err());
        assert!(m.all().is_empty());
    }
}
