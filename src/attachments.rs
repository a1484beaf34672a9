//! Attachment collector — buffers photos and documents into the active session.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channels::InboundEvent;
use crate::session::SessionStore;

/// What kind of file a reference points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Photo,
    #[serde(rename = "doc")]
    Document,
}

impl AttachmentKind {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Document => "doc",
        }
    }

    /// Acknowledgement sent for each accepted file.
    pub fn ack(&self) -> &'static str {
        match self {
            Self::Photo => "📸 Photo received ✅",
            Self::Document => "📎 Document received ✅",
        }
    }
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttachmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(Self::Photo),
            "doc" | "document" => Ok(Self::Document),
            other => Err(format!("unknown attachment kind: {other}")),
        }
    }
}

/// A file reference held by the transport (Telegram `file_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub file_id: String,
}

impl Attachment {
    pub fn new(kind: AttachmentKind, file_id: &str) -> Self {
        Self {
            kind,
            file_id: file_id.to_string(),
        }
    }

    pub fn photo(file_id: &str) -> Self {
        Self::new(AttachmentKind::Photo, file_id)
    }

    pub fn document(file_id: &str) -> Self {
        Self::new(AttachmentKind::Document, file_id)
    }
}

/// Append the event's photo or document to the sender's active session.
///
/// Files go to `pay_attachments` while the session is in the payment flow and
/// to `attachments` otherwise. Returns the accepted kind, or `None` when the
/// event carries no file or there is no active flow; nothing is created in
/// the store in that case.
pub async fn collect(sessions: &SessionStore, event: &InboundEvent) -> Option<AttachmentKind> {
    let attachment = event.attachment()?;
    let kind = attachment.kind;

    let accepted = sessions
        .update(event.chat_id, |session| {
            let step = session.step?;
            let bucket = if step.is_payment() {
                &mut session.pay_attachments
            } else {
                &mut session.attachments
            };
            bucket.push(attachment);
            Some(step)
        })
        .await
        .flatten();

    match accepted {
        Some(step) => {
            debug!(chat_id = event.chat_id, step = %step, kind = %kind, "Attachment buffered");
            Some(kind)
        }
        None => {
            debug!(chat_id = event.chat_id, "Attachment outside any flow ignored");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn photo_event(chat_id: i64, file_id: &str) -> InboundEvent {
        InboundEvent {
            chat_id,
            sender_id: chat_id,
            photo: Some(file_id.into()),
            ..Default::default()
        }
    }

    fn doc_event(chat_id: i64, file_id: &str) -> InboundEvent {
        InboundEvent {
            chat_id,
            sender_id: chat_id,
            document: Some(file_id.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn no_session_is_a_silent_noop() {
        let store = SessionStore::new();
        assert_eq!(collect(&store, &photo_event(7, "p")).await, None);
        assert!(store.get(7).await.is_none(), "collector must not create sessions");
    }

    #[tokio::test]
    async fn request_flow_uses_attachments_bucket() {
        let store = SessionStore::new();
        store.set(7, Session::start_request().0).await;

        assert_eq!(
            collect(&store, &photo_event(7, "p1")).await,
            Some(AttachmentKind::Photo)
        );
        assert_eq!(
            collect(&store, &doc_event(7, "d1")).await,
            Some(AttachmentKind::Document)
        );

        let session = store.get(7).await.unwrap();
        assert_eq!(
            session.attachments,
            vec![Attachment::photo("p1"), Attachment::document("d1")]
        );
        assert!(session.pay_attachments.is_empty());
    }

    #[tokio::test]
    async fn payment_flow_uses_pay_bucket() {
        let store = SessionStore::new();
        store.set(7, Session::start_payment().0).await;

        collect(&store, &photo_event(7, "receipt")).await;

        let session = store.get(7).await.unwrap();
        assert!(session.attachments.is_empty());
        assert_eq!(session.pay_attachments, vec![Attachment::photo("receipt")]);
    }

    #[tokio::test]
    async fn tombstone_session_ignores_files() {
        let store = SessionStore::new();
        store.set(7, Session::tombstone()).await;
        assert_eq!(collect(&store, &photo_event(7, "p")).await, None);
        assert!(store.get(7).await.unwrap().attachments.is_empty());
    }

    #[test]
    fn kind_roundtrips_through_storage_names() {
        for kind in [AttachmentKind::Photo, AttachmentKind::Document] {
            assert_eq!(kind.as_str().parse::<AttachmentKind>().unwrap(), kind);
        }
    }
}
