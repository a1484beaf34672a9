//! Submission finalizer: persists a finished flow once, sends the staff
//! summary, and leaves a tombstone so repeats are recognized.

use tracing::{info, warn};

use crate::admin::parser::parse_payment_amount;
use crate::attachments::{Attachment, AttachmentKind};
use crate::channels::{ChatId, InboundEvent, Messenger, SendOptions, escape_html};
use crate::error::{ChannelError, DatabaseError};
use crate::flow::FormType;
use crate::flow::keyboard::main_menu;
use crate::session::{Session, SessionStore};
use crate::store::{Database, NewPayment, NewRequest, RequestFields};

/// Placeholder for unanswered fields.
pub const EMPTY: &str = "—";

/// Telegram caps a media group at ten items.
const MAX_GROUPED_PHOTOS: usize = 10;

/// What finalizing did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Record stored; `delivered` is false when the staff chat send failed.
    Submitted { record_id: i64, delivered: bool },
    /// Storage failed; the summary was still sent and the session dropped.
    Unsaved,
    /// The session was already submitted; nothing stored.
    AlreadySubmitted,
    /// No session, or one that cannot be submitted.
    NothingToSubmit,
}

/// Who sent the finishing message, for the summary trailer.
#[derive(Debug, Clone)]
pub struct Sender {
    pub username: String,
    pub id: i64,
}

impl Sender {
    pub fn from_event(event: &InboundEvent) -> Self {
        Self {
            username: event.display_username(),
            id: event.sender_id,
        }
    }

    /// `From user: @name (id N)`; staff commands read the id back from this.
    pub fn trailer(&self) -> String {
        format!("From user: {} (id {})", escape_html(&self.username), self.id)
    }
}

fn field(session: &Session, key: &str) -> String {
    session
        .answer(key)
        .map(escape_html)
        .unwrap_or_else(|| EMPTY.to_string())
}

/// Staff summary of a request.
pub fn request_summary(form_type: FormType, session: &Session, sender: &Sender) -> String {
    let f = |key: &str| field(session, key);
    match form_type {
        FormType::Hotel => format!(
            "<b>New TripBuddy request</b> 🏨\n\
             City: {}\n\
             Dates: {}\n\
             Guests: {}\n\
             Rooms: {}\n\
             ⭐️ Stars: {}\n\
             Breakfast: {}\n\
             Location: {}\n\
             Budget: {}\n\
             — — — Guest details — — —\n\
             Full name (Latin): {}\n\
             Date of birth: {}\n\
             Citizenship: {}\n\
             Passport No.: {}\n\
             Passport valid until: {}\n\
             Contact: {}\n\n\
             {}",
            f("route"),
            f("dates"),
            f("guests"),
            f("rooms"),
            f("stars"),
            f("breakfast"),
            f("location_pref"),
            f("budget"),
            f("fullname"),
            f("dob"),
            f("citizenship"),
            f("passport_no"),
            f("passport_exp"),
            f("contact"),
            sender.trailer(),
        ),
        FormType::Flight => format!(
            "<b>New TripBuddy request</b> ✈️\n\
             Route: {}\n\
             Dates: {}\n\
             Class: {}\n\
             Baggage: {}\n\
             Airlines: {}\n\
             Budget: {}\n\
             — — — Passenger details — — —\n\
             Full name (Latin): {}\n\
             Date of birth: {}\n\
             Gender: {}\n\
             Citizenship: {}\n\
             Passport No.: {}\n\
             Passport valid until: {}\n\
             Contact: {}\n\n\
             {}",
            f("route"),
            f("dates"),
            f("class"),
            f("baggage"),
            f("carriers"),
            f("budget"),
            f("fullname"),
            f("dob"),
            f("gender"),
            f("citizenship"),
            f("passport_no"),
            f("passport_exp"),
            f("contact"),
            sender.trailer(),
        ),
    }
}

/// Staff summary of a payment notification.
pub fn payment_summary(session: &Session, sender: &Sender) -> String {
    format!(
        "<b>Payment notification</b> ✅\n\
         Amount: {}\n\
         Date/time: {}\n\
         Method: {}\n\n\
         {}",
        field(session, "pay_amount"),
        field(session, "pay_date"),
        field(session, "pay_method"),
        sender.trailer(),
    )
}

/// Runs the terminal action of a flow.
pub struct Finalizer<'a> {
    pub messenger: &'a dyn Messenger,
    pub db: &'a dyn Database,
    pub sessions: &'a SessionStore,
    /// Where summaries go; nothing is dispatched when unset.
    pub staff_chat: Option<ChatId>,
}

impl Finalizer<'_> {
    /// Finish the request flow of `event`'s chat.
    pub async fn finish_request(&self, event: &InboundEvent) -> Outcome {
        let chat_id = event.chat_id;
        let Some(session) = self.sessions.get(chat_id).await else {
            return Outcome::NothingToSubmit;
        };
        if session.submitted {
            self.notify_menu(chat_id, "This request has already been sent ✅")
                .await;
            return Outcome::AlreadySubmitted;
        }
        let Some(form_type) = session.form_type else {
            warn!(chat_id, "Request finished without a form type, dropping it");
            self.sessions.clear(chat_id).await;
            return Outcome::NothingToSubmit;
        };

        let record = NewRequest {
            chat_id,
            form_type,
            fields: RequestFields::from_answers(&session.answers),
        };
        let saved = self.db.store_request(&record, &session.attachments).await;
        if let Err(ref e) = saved {
            warn!(chat_id, error = %e, "Failed to store request");
            self.notify(chat_id, &format!("⚠️ Could not save the request: {e}"))
                .await;
        }

        let sender = Sender::from_event(event);
        let body = request_summary(form_type, &session, &sender);
        let delivered = match self.deliver(&body, &session.attachments).await {
            Ok(()) => true,
            Err(e) => {
                warn!(chat_id, error = %e, "Failed to deliver request to staff chat");
                self.notify(
                    chat_id,
                    &format!("Could not deliver the request to the staff chat: {e}"),
                )
                .await;
                false
            }
        };

        self.notify_menu(
            chat_id,
            "Thank you! Your request has been sent. We will be in touch soon 🤝",
        )
        .await;

        self.settle(chat_id, saved, delivered, "request").await
    }

    /// Finish the payment flow of `event`'s chat.
    pub async fn finish_payment(&self, event: &InboundEvent) -> Outcome {
        let chat_id = event.chat_id;
        let Some(session) = self.sessions.get(chat_id).await else {
            return Outcome::NothingToSubmit;
        };
        if session.submitted {
            self.notify_menu(chat_id, "The payment notification has already been sent ✅")
                .await;
            return Outcome::AlreadySubmitted;
        }

        let amount_raw = session.answer("pay_amount").unwrap_or_default().trim();
        let (amount, currency) = parse_payment_amount(amount_raw);
        let record = NewPayment {
            chat_id,
            amount_raw: amount_raw.to_string(),
            amount,
            currency,
            pay_method: session.answer_owned("pay_method"),
            pay_date: session.answer_owned("pay_date"),
        };
        let saved = self.db.store_payment(&record, &session.pay_attachments).await;
        if let Err(ref e) = saved {
            warn!(chat_id, error = %e, "Failed to store payment");
            self.notify(chat_id, &format!("⚠️ Could not save the payment: {e}"))
                .await;
        }

        let sender = Sender::from_event(event);
        let body = payment_summary(&session, &sender);
        let delivered = match self.deliver(&body, &session.pay_attachments).await {
            Ok(()) => true,
            Err(e) => {
                warn!(chat_id, error = %e, "Failed to deliver payment to staff chat");
                self.notify(
                    chat_id,
                    &format!("Could not deliver the payment notification to the staff chat: {e}"),
                )
                .await;
                false
            }
        };

        self.notify_menu(
            chat_id,
            "Thank you! We received your payment notification. We will check it and confirm 🙌",
        )
        .await;

        self.settle(chat_id, saved, delivered, "payment").await
    }

    /// Tombstone on success, clean slate when nothing was stored.
    async fn settle(
        &self,
        chat_id: ChatId,
        saved: Result<i64, DatabaseError>,
        delivered: bool,
        what: &str,
    ) -> Outcome {
        match saved {
            Ok(record_id) => {
                self.sessions.set(chat_id, Session::tombstone()).await;
                info!(chat_id, record_id, delivered, "{what} submitted");
                Outcome::Submitted {
                    record_id,
                    delivered,
                }
            }
            Err(_) => {
                self.sessions.clear(chat_id).await;
                Outcome::Unsaved
            }
        }
    }

    /// Summary, then up to ten photos grouped as a reply to it, then each
    /// document individually.
    async fn deliver(&self, body: &str, attachments: &[Attachment]) -> Result<(), ChannelError> {
        let Some(staff) = self.staff_chat else {
            return Ok(());
        };

        let summary_id = self
            .messenger
            .send_text(staff, body, SendOptions::default())
            .await?;

        let photos: Vec<String> = attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::Photo)
            .take(MAX_GROUPED_PHOTOS)
            .map(|a| a.file_id.clone())
            .collect();
        if !photos.is_empty() {
            self.messenger
                .send_photo_group(staff, &photos, Some(summary_id))
                .await?;
        }

        for doc in attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::Document)
        {
            self.messenger
                .send_document(staff, &doc.file_id, None, Some(summary_id))
                .await?;
        }
        Ok(())
    }

    async fn notify(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self
            .messenger
            .send_text(chat_id, text, SendOptions::default())
            .await
        {
            warn!(chat_id, error = %e, "Failed to notify user");
        }
    }

    async fn notify_menu(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self
            .messenger
            .send_keyboard(chat_id, text, main_menu())
            .await
        {
            warn!(chat_id, error = %e, "Failed to notify user");
        }
    }
}
