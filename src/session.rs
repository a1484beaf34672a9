//! Session store — per-conversation step tracker and answer buffer.
//!
//! Sessions live in memory for the lifetime of the process. The store is an
//! explicit object constructed at startup and shared by `Arc`; callers only
//! touch it through `get`/`set`/`update`/`clear`.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::attachments::Attachment;
use crate::channels::ChatId;
use crate::flow::{FormType, Prompt, Step};

/// Mutable state of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Current position in a flow; `None` when no flow is active.
    pub step: Option<Step>,
    /// Chosen at the `type` step of the request flow.
    pub form_type: Option<FormType>,
    /// Field name → collected text.
    pub answers: HashMap<String, String>,
    pub attachments: Vec<Attachment>,
    pub pay_attachments: Vec<Attachment>,
    /// Set once the terminal action of the current flow has fired.
    pub submitted: bool,
}

impl Session {
    /// Fresh request flow positioned at the form-type question.
    pub fn start_request() -> (Self, Prompt) {
        let session = Self {
            step: Some(Step::Type),
            ..Default::default()
        };
        (session, Step::Type.prompt(None))
    }

    /// Fresh payment-notification flow positioned at the amount question.
    pub fn start_payment() -> (Self, Prompt) {
        let session = Self {
            step: Some(Step::PayAmount),
            ..Default::default()
        };
        (session, Step::PayAmount.prompt(None))
    }

    /// What remains after a successful submission: no flow, no data, but the
    /// submitted flag so a repeated terminal press is recognized.
    pub fn tombstone() -> Self {
        Self {
            submitted: true,
            ..Default::default()
        }
    }

    /// Whether a flow is in progress.
    pub fn is_active(&self) -> bool {
        self.step.is_some()
    }

    pub fn answer(&self, key: &str) -> Option<&str> {
        self.answers.get(key).map(String::as_str)
    }

    /// Owned copy of an answer, for building records.
    pub fn answer_owned(&self, key: &str) -> Option<String> {
        self.answers.get(key).cloned()
    }

    /// Answer keys in a stable order, for diagnostics.
    pub fn answer_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.answers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Whether payment answers are present even though the step may be lost.
    ///
    /// Best-effort recovery heuristic for the "Send ✅" / "Skip ⏭️" buttons;
    /// it matches on key prefixes, not on a recorded step.
    pub fn has_payment_traces(&self) -> bool {
        self.answers.keys().any(|k| k.starts_with("pay_"))
    }
}

/// Concurrency-safe map from conversation identity to session.
///
/// Each identity's session is only touched by that identity's own event
/// lane, so a single map lock is enough.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<ChatId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the session for `chat_id`.
    pub async fn get(&self, chat_id: ChatId) -> Option<Session> {
        self.sessions.read().await.get(&chat_id).cloned()
    }

    /// Replace whatever was stored for `chat_id`.
    pub async fn set(&self, chat_id: ChatId, session: Session) {
        self.sessions.write().await.insert(chat_id, session);
    }

    /// Mutate an existing session in place. Never creates one.
    pub async fn update<R>(
        &self,
        chat_id: ChatId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&chat_id).map(f)
    }

    /// Drop the session for `chat_id`, returning it.
    pub async fn clear(&self, chat_id: ChatId) -> Option<Session> {
        self.sessions.write().await.remove(&chat_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_clear() {
        let store = SessionStore::new();
        assert!(store.get(1).await.is_none());

        let (session, _) = Session::start_request();
        store.set(1, session.clone()).await;
        assert_eq!(store.get(1).await, Some(session));
        assert_eq!(store.len().await, 1);

        assert!(store.clear(1).await.is_some());
        assert!(store.get(1).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn update_never_creates() {
        let store = SessionStore::new();
        let touched = store.update(9, |s| s.submitted = true).await;
        assert!(touched.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn starting_a_flow_replaces_previous_state() {
        let store = SessionStore::new();
        let (mut old, _) = Session::start_request();
        old.answers.insert("route".into(), "Tbilisi".into());
        old.attachments.push(Attachment::photo("p"));
        old.submitted = true;
        store.set(3, old).await;

        store.set(3, Session::start_payment().0).await;

        let now = store.get(3).await.unwrap();
        assert_eq!(now.step, Some(Step::PayAmount));
        assert!(now.answers.is_empty());
        assert!(now.attachments.is_empty());
        assert!(!now.submitted);
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_identity() {
        let store = SessionStore::new();
        store.set(1, Session::start_request().0).await;
        store.set(2, Session::start_payment().0).await;
        store.clear(1).await;
        assert_eq!(store.get(2).await.unwrap().step, Some(Step::PayAmount));
    }

    #[test]
    fn payment_traces_match_key_prefix() {
        let mut s = Session::default();
        assert!(!s.has_payment_traces());
        s.answers.insert("route".into(), "x".into());
        assert!(!s.has_payment_traces());
        s.answers.insert("pay_method".into(), "cash".into());
        assert!(s.has_payment_traces());
    }

    #[test]
    fn tombstone_is_inactive_and_submitted() {
        let t = Session::tombstone();
        assert!(!t.is_active());
        assert!(t.submitted);
        assert!(t.answers.is_empty());
    }

    #[test]
    fn answer_keys_sorted() {
        let mut s = Session::default();
        s.answers.insert("route".into(), "a".into());
        s.answers.insert("dates".into(), "b".into());
        assert_eq!(s.answer_keys(), vec!["dates", "route"]);
    }
}
