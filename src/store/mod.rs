//! Persistence layer — SQLite-backed storage for requests, payments, and files.

pub mod export;
pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use export::{ExportFile, export_all};
pub use libsql_backend::LibSqlBackend;
pub use traits::{
    AttachmentRow, Database, NewPayment, NewRequest, PaymentRecord, RequestFields, RequestRecord,
};
