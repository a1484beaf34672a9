//! TripBuddy: a Telegram travel-booking assistant.
//!
//! Guides clients through hotel, flight, and payment questionnaires, stores
//! the results, forwards summaries to a staff chat, and gives staff a small
//! command surface for invoices and follow-ups.

pub mod admin;
pub mod attachments;
pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod flow;
pub mod session;
pub mod store;
pub mod submission;
pub mod webhook;
