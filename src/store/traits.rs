//! `Database` trait — single async interface for request and payment storage.
//!
//! All four tables are append-only: rows are inserted once and never updated.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::attachments::Attachment;
use crate::channels::ChatId;
use crate::error::DatabaseError;
use crate::flow::FormType;

/// Answer fields of a request, one column each.
///
/// Hotel requests store their destination under `route`. Fields that do not
/// apply to the chosen form stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFields {
    pub route: Option<String>,
    pub dates: Option<String>,
    pub guests: Option<String>,
    pub rooms: Option<String>,
    pub stars: Option<String>,
    pub breakfast: Option<String>,
    pub location_pref: Option<String>,
    pub budget: Option<String>,
    pub class: Option<String>,
    pub baggage: Option<String>,
    pub carriers: Option<String>,
    pub fullname: Option<String>,
    pub dob: Option<String>,
    pub gender: Option<String>,
    pub citizenship: Option<String>,
    pub passport_no: Option<String>,
    pub passport_exp: Option<String>,
    pub contact: Option<String>,
}

/// Column order shared by inserts, selects and CSV export.
pub const REQUEST_FIELD_COLUMNS: [&str; 18] = [
    "route",
    "dates",
    "guests",
    "rooms",
    "stars",
    "breakfast",
    "location_pref",
    "budget",
    "class",
    "baggage",
    "carriers",
    "fullname",
    "dob",
    "gender",
    "citizenship",
    "passport_no",
    "passport_exp",
    "contact",
];

impl RequestFields {
    /// Pick the request columns out of a session's answers.
    pub fn from_answers(answers: &HashMap<String, String>) -> Self {
        let get = |key: &str| answers.get(key).cloned();
        Self {
            route: get("route"),
            dates: get("dates"),
            guests: get("guests"),
            rooms: get("rooms"),
            stars: get("stars"),
            breakfast: get("breakfast"),
            location_pref: get("location_pref"),
            budget: get("budget"),
            class: get("class"),
            baggage: get("baggage"),
            carriers: get("carriers"),
            fullname: get("fullname"),
            dob: get("dob"),
            gender: get("gender"),
            citizenship: get("citizenship"),
            passport_no: get("passport_no"),
            passport_exp: get("passport_exp"),
            contact: get("contact"),
        }
    }

    /// Values in [`REQUEST_FIELD_COLUMNS`] order.
    pub fn values(&self) -> [Option<&str>; 18] {
        [
            self.route.as_deref(),
            self.dates.as_deref(),
            self.guests.as_deref(),
            self.rooms.as_deref(),
            self.stars.as_deref(),
            self.breakfast.as_deref(),
            self.location_pref.as_deref(),
            self.budget.as_deref(),
            self.class.as_deref(),
            self.baggage.as_deref(),
            self.carriers.as_deref(),
            self.fullname.as_deref(),
            self.dob.as_deref(),
            self.gender.as_deref(),
            self.citizenship.as_deref(),
            self.passport_no.as_deref(),
            self.passport_exp.as_deref(),
            self.contact.as_deref(),
        ]
    }

    /// Inverse of [`values`](Self::values).
    pub fn from_values(mut values: Vec<Option<String>>) -> Self {
        values.resize(REQUEST_FIELD_COLUMNS.len(), None);
        let mut it = values.into_iter();
        let mut next = || it.next().flatten();
        Self {
            route: next(),
            dates: next(),
            guests: next(),
            rooms: next(),
            stars: next(),
            breakfast: next(),
            location_pref: next(),
            budget: next(),
            class: next(),
            baggage: next(),
            carriers: next(),
            fullname: next(),
            dob: next(),
            gender: next(),
            citizenship: next(),
            passport_no: next(),
            passport_exp: next(),
            contact: next(),
        }
    }
}

/// A request about to be inserted.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub chat_id: ChatId,
    pub form_type: FormType,
    pub fields: RequestFields,
}

/// A stored request row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub id: i64,
    pub chat_id: ChatId,
    /// `hotel` / `flight`; free text on rows written by older versions.
    pub form_type: Option<String>,
    pub fields: RequestFields,
    pub created_at: Option<String>,
}

/// A payment notification about to be inserted.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub chat_id: ChatId,
    /// What the user typed at the amount step.
    pub amount_raw: String,
    /// Digits and separators only.
    pub amount: String,
    /// Upper-cased three-letter code, or empty when none was given.
    pub currency: String,
    pub pay_method: Option<String>,
    pub pay_date: Option<String>,
}

/// A stored payment row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub id: i64,
    pub chat_id: ChatId,
    pub amount_raw: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub pay_method: Option<String>,
    pub pay_date: Option<String>,
    pub created_at: Option<String>,
}

/// A stored attachment row; `parent_id` is the request or payment id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRow {
    pub id: i64,
    pub parent_id: i64,
    pub kind: Option<String>,
    pub file_id: Option<String>,
}

/// Backend-agnostic storage for requests, payments, and their files.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Add any required column missing from an existing table.
    /// Returns how many columns were added.
    async fn ensure_columns(&self) -> Result<usize, DatabaseError>;

    // ── Requests ────────────────────────────────────────────────────

    /// Insert a request. Returns the new row id.
    async fn insert_request(&self, request: &NewRequest) -> Result<i64, DatabaseError>;

    /// Insert a request and its attachments as one unit: either all rows
    /// land or none do. Returns the request id.
    async fn store_request(
        &self,
        request: &NewRequest,
        attachments: &[Attachment],
    ) -> Result<i64, DatabaseError>;

    async fn insert_request_attachment(
        &self,
        request_id: i64,
        attachment: &Attachment,
    ) -> Result<(), DatabaseError>;

    /// Most recent request of a chat.
    async fn latest_request_for_chat(
        &self,
        chat_id: ChatId,
    ) -> Result<Option<RequestRecord>, DatabaseError>;

    /// All requests, newest first.
    async fn list_requests(&self) -> Result<Vec<RequestRecord>, DatabaseError>;

    /// All request attachments, newest first.
    async fn list_request_attachments(&self) -> Result<Vec<AttachmentRow>, DatabaseError>;

    async fn count_requests_since(&self, since: DateTime<Utc>) -> Result<i64, DatabaseError>;

    // ── Payments ────────────────────────────────────────────────────

    /// Insert a payment. Returns the new row id.
    async fn insert_payment(&self, payment: &NewPayment) -> Result<i64, DatabaseError>;

    /// Insert a payment and its files as one unit. Returns the payment id.
    async fn store_payment(
        &self,
        payment: &NewPayment,
        attachments: &[Attachment],
    ) -> Result<i64, DatabaseError>;

    async fn insert_payment_file(
        &self,
        payment_id: i64,
        attachment: &Attachment,
    ) -> Result<(), DatabaseError>;

    /// All payments, newest first.
    async fn list_payments(&self) -> Result<Vec<PaymentRecord>, DatabaseError>;

    /// All payment files, newest first.
    async fn list_payment_files(&self) -> Result<Vec<AttachmentRow>, DatabaseError>;

    async fn count_payments_since(&self, since: DateTime<Utc>) -> Result<i64, DatabaseError>;

    /// Payments created at or after `since`.
    async fn payments_since(&self, since: DateTime<Utc>)
    -> Result<Vec<PaymentRecord>, DatabaseError>;
}
