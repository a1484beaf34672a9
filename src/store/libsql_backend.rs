//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::attachments::Attachment;
use crate::channels::ChatId;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    AttachmentRow, Database, NewPayment, NewRequest, PaymentRecord, REQUEST_FIELD_COLUMNS,
    RequestFields, RequestRecord,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
/// Writes are serialized by `write_lock` so a transaction on the shared
/// connection never picks up another task's statements.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Insert a record and its files in one transaction.
    async fn store_with_files(
        &self,
        parent: Parent<'_>,
        attachments: &[Attachment],
    ) -> Result<i64, DatabaseError> {
        let _write = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("begin transaction: {e}")))?;

        let (table, parent_column) = parent.files_table();
        let written = async {
            let id = match parent {
                Parent::Request(request) => insert_request_row(&tx, request).await?,
                Parent::Payment(payment) => insert_payment_row(&tx, payment).await?,
            };
            for attachment in attachments {
                insert_attachment_row(&tx, table, parent_column, id, attachment).await?;
            }
            Ok::<_, DatabaseError>(id)
        }
        .await;

        match written {
            Ok(id) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("commit: {e}")))?;
                Ok(id)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn insert_attachment(
        &self,
        table: &str,
        parent_column: &str,
        parent_id: i64,
        attachment: &Attachment,
    ) -> Result<(), DatabaseError> {
        let _write = self.write_lock.lock().await;
        insert_attachment_row(self.conn(), table, parent_column, parent_id, attachment).await
    }

    async fn list_attachments(
        &self,
        table: &str,
        parent_column: &str,
    ) -> Result<Vec<AttachmentRow>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT id, {parent_column}, kind, file_id FROM {table} ORDER BY id DESC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list {table}: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list {table}: {e}")))?
        {
            out.push(
                row_to_attachment(&row)
                    .map_err(|e| DatabaseError::Query(format!("{table} row parse: {e}")))?,
            );
        }
        Ok(out)
    }

    async fn count_since(&self, table: &str, since: DateTime<Utc>) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT COUNT(*) FROM {table} WHERE created_at >= ?1"),
                params![timestamp(since)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count {table}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("count {table}: {e}"))),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count {table}: {e}"))),
        }
    }

    async fn query_payments(
        &self,
        filter: &str,
        params: Vec<libsql::Value>,
    ) -> Result<Vec<PaymentRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PAYMENT_COLUMNS} FROM payments {filter} ORDER BY id DESC"),
                params,
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("query_payments: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("query_payments: {e}")))?
        {
            out.push(
                row_to_payment(&row)
                    .map_err(|e| DatabaseError::Query(format!("payment row parse: {e}")))?,
            );
        }
        Ok(out)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parent row of a transactional insert.
enum Parent<'a> {
    Request(&'a NewRequest),
    Payment(&'a NewPayment),
}

impl Parent<'_> {
    /// Attachment table and its foreign-key column.
    fn files_table(&self) -> (&'static str, &'static str) {
        match self {
            Self::Request(_) => ("request_attachments", "request_id"),
            Self::Payment(_) => ("payment_files", "payment_id"),
        }
    }
}

async fn insert_request_row(
    conn: &Connection,
    request: &NewRequest,
) -> Result<i64, DatabaseError> {
    let placeholders: Vec<String> = (1..=REQUEST_FIELD_COLUMNS.len() + 3)
        .map(|i| format!("?{i}"))
        .collect();
    let sql = format!(
        "INSERT INTO requests (chat_id, type, {}, created_at) VALUES ({}) RETURNING id",
        REQUEST_FIELD_COLUMNS.join(", "),
        placeholders.join(", ")
    );

    let mut values: Vec<libsql::Value> = Vec::with_capacity(placeholders.len());
    values.push(request.chat_id.into());
    values.push(request.form_type.as_str().into());
    values.extend(request.fields.values().into_iter().map(opt_text));
    values.push(timestamp(Utc::now()).into());

    let mut rows = conn
        .query(&sql, values)
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_request: {e}")))?;

    let id = match rows.next().await {
        Ok(Some(row)) => row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Query(format!("insert_request id: {e}")))?,
        Ok(None) => {
            return Err(DatabaseError::Query(
                "insert_request: no id returned".to_string(),
            ));
        }
        Err(e) => return Err(DatabaseError::Query(format!("insert_request: {e}"))),
    };

    debug!(id, chat_id = request.chat_id, form_type = %request.form_type, "Request inserted into DB");
    Ok(id)
}

async fn insert_payment_row(
    conn: &Connection,
    payment: &NewPayment,
) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query(
            "INSERT INTO payments (chat_id, amount_raw, amount, currency, pay_method, pay_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) RETURNING id",
            params![
                payment.chat_id,
                payment.amount_raw.as_str(),
                payment.amount.as_str(),
                payment.currency.as_str(),
                opt_text(payment.pay_method.as_deref()),
                opt_text_owned(payment.pay_date.clone()),
                timestamp(Utc::now()),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_payment: {e}")))?;

    let id = match rows.next().await {
        Ok(Some(row)) => row
            .get::<i64>(0)
            .map_err(|e| DatabaseError::Query(format!("insert_payment id: {e}")))?,
        Ok(None) => {
            return Err(DatabaseError::Query(
                "insert_payment: no id returned".to_string(),
            ));
        }
        Err(e) => return Err(DatabaseError::Query(format!("insert_payment: {e}"))),
    };

    debug!(id, chat_id = payment.chat_id, "Payment inserted into DB");
    Ok(id)
}

async fn insert_attachment_row(
    conn: &Connection,
    table: &str,
    parent_column: &str,
    parent_id: i64,
    attachment: &Attachment,
) -> Result<(), DatabaseError> {
    conn.execute(
        &format!("INSERT INTO {table} ({parent_column}, kind, file_id) VALUES (?1, ?2, ?3)"),
        params![parent_id, attachment.kind.as_str(), attachment.file_id.as_str()],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("insert into {table}: {e}")))?;
    Ok(())
}

/// Canonical write format: RFC 3339 UTC with whole seconds, so that text
/// comparison on `created_at` is chronological.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Read a nullable column as text. Legacy rows may hold numbers where text
/// is expected now.
fn opt_col(row: &libsql::Row, idx: i32) -> Option<String> {
    match row.get_value(idx) {
        Ok(libsql::Value::Text(s)) => Some(s),
        Ok(libsql::Value::Integer(i)) => Some(i.to_string()),
        Ok(libsql::Value::Real(f)) => Some(f.to_string()),
        _ => None,
    }
}

/// Read a nullable integer column; NULL reads as 0.
fn int_col(row: &libsql::Row, idx: i32) -> i64 {
    match row.get_value(idx) {
        Ok(libsql::Value::Integer(i)) => i,
        Ok(libsql::Value::Text(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    }
}

fn request_columns() -> String {
    format!(
        "id, chat_id, type, {}, created_at",
        REQUEST_FIELD_COLUMNS.join(", ")
    )
}

const PAYMENT_COLUMNS: &str =
    "id, chat_id, amount_raw, amount, currency, pay_method, pay_date, created_at";

/// Map a row selected with [`request_columns`] to a record.
///
/// 0:id, 1:chat_id, 2:type, 3..21: fields, 21:created_at
fn row_to_request(row: &libsql::Row) -> Result<RequestRecord, libsql::Error> {
    let field_count = REQUEST_FIELD_COLUMNS.len() as i32;
    let values = (0..field_count).map(|i| opt_col(row, 3 + i)).collect();
    Ok(RequestRecord {
        id: row.get(0)?,
        chat_id: int_col(row, 1),
        form_type: opt_col(row, 2),
        fields: RequestFields::from_values(values),
        created_at: opt_col(row, 3 + field_count),
    })
}

fn row_to_payment(row: &libsql::Row) -> Result<PaymentRecord, libsql::Error> {
    Ok(PaymentRecord {
        id: row.get(0)?,
        chat_id: int_col(row, 1),
        amount_raw: opt_col(row, 2),
        amount: opt_col(row, 3),
        currency: opt_col(row, 4),
        pay_method: opt_col(row, 5),
        pay_date: opt_col(row, 6),
        created_at: opt_col(row, 7),
    })
}

fn row_to_attachment(row: &libsql::Row) -> Result<AttachmentRow, libsql::Error> {
    Ok(AttachmentRow {
        id: row.get(0)?,
        parent_id: int_col(row, 1),
        kind: opt_col(row, 2),
        file_id: opt_col(row, 3),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn ensure_columns(&self) -> Result<usize, DatabaseError> {
        let _write = self.write_lock.lock().await;
        migrations::add_missing_columns(self.conn()).await
    }

    // ── Requests ────────────────────────────────────────────────────

    async fn insert_request(&self, request: &NewRequest) -> Result<i64, DatabaseError> {
        let _write = self.write_lock.lock().await;
        insert_request_row(self.conn(), request).await
    }

    async fn store_request(
        &self,
        request: &NewRequest,
        attachments: &[Attachment],
    ) -> Result<i64, DatabaseError> {
        self.store_with_files(Parent::Request(request), attachments)
            .await
    }

    async fn insert_request_attachment(
        &self,
        request_id: i64,
        attachment: &Attachment,
    ) -> Result<(), DatabaseError> {
        self.insert_attachment("request_attachments", "request_id", request_id, attachment)
            .await
    }

    async fn latest_request_for_chat(
        &self,
        chat_id: ChatId,
    ) -> Result<Option<RequestRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {} FROM requests WHERE chat_id = ?1 ORDER BY id DESC LIMIT 1",
                    request_columns()
                ),
                params![chat_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("latest_request_for_chat: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let record = row_to_request(&row)
                    .map_err(|e| DatabaseError::Query(format!("request row parse: {e}")))?;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("latest_request_for_chat: {e}"))),
        }
    }

    async fn list_requests(&self) -> Result<Vec<RequestRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {} FROM requests ORDER BY id DESC", request_columns()),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_requests: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_requests: {e}")))?
        {
            out.push(
                row_to_request(&row)
                    .map_err(|e| DatabaseError::Query(format!("request row parse: {e}")))?,
            );
        }
        Ok(out)
    }

    async fn list_request_attachments(&self) -> Result<Vec<AttachmentRow>, DatabaseError> {
        self.list_attachments("request_attachments", "request_id")
            .await
    }

    async fn count_requests_since(&self, since: DateTime<Utc>) -> Result<i64, DatabaseError> {
        self.count_since("requests", since).await
    }

    // ── Payments ────────────────────────────────────────────────────

    async fn insert_payment(&self, payment: &NewPayment) -> Result<i64, DatabaseError> {
        let _write = self.write_lock.lock().await;
        insert_payment_row(self.conn(), payment).await
    }

    async fn store_payment(
        &self,
        payment: &NewPayment,
        attachments: &[Attachment],
    ) -> Result<i64, DatabaseError> {
        self.store_with_files(Parent::Payment(payment), attachments)
            .await
    }

    async fn insert_payment_file(
        &self,
        payment_id: i64,
        attachment: &Attachment,
    ) -> Result<(), DatabaseError> {
        self.insert_attachment("payment_files", "payment_id", payment_id, attachment)
            .await
    }

    async fn list_payments(&self) -> Result<Vec<PaymentRecord>, DatabaseError> {
        self.query_payments("", Vec::new()).await
    }

    async fn list_payment_files(&self) -> Result<Vec<AttachmentRow>, DatabaseError> {
        self.list_attachments("payment_files", "payment_id").await
    }

    async fn count_payments_since(&self, since: DateTime<Utc>) -> Result<i64, DatabaseError> {
        self.count_since("payments", since).await
    }

    async fn payments_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, DatabaseError> {
        self.query_payments("WHERE created_at >= ?1", vec![timestamp(since).into()])
            .await
    }
}
