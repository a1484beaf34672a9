//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.
//! Databases created before version tracking already hold the four tables;
//! V1 only uses `IF NOT EXISTS`, so on those it just records the version and
//! `add_missing_columns()` fills in whatever the old layout lacks.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER,
                type TEXT,
                route TEXT,
                dates TEXT,
                guests TEXT,
                rooms TEXT,
                stars TEXT,
                breakfast TEXT,
                location_pref TEXT,
                budget TEXT,
                class TEXT,
                baggage TEXT,
                carriers TEXT,
                fullname TEXT,
                dob TEXT,
                gender TEXT,
                citizenship TEXT,
                passport_no TEXT,
                passport_exp TEXT,
                contact TEXT,
                created_at TEXT
            );

            CREATE TABLE IF NOT EXISTS request_attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id INTEGER,
                kind TEXT,
                file_id TEXT
            );

            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER,
                amount_raw TEXT,
                amount TEXT,
                currency TEXT,
                pay_method TEXT,
                pay_date TEXT,
                created_at TEXT
            );

            CREATE TABLE IF NOT EXISTS payment_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payment_id INTEGER,
                kind TEXT,
                file_id TEXT
            );
        "#,
    },
    Migration {
        version: 2,
        name: "lookup_indexes",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_requests_chat ON requests(chat_id);
            CREATE INDEX IF NOT EXISTS idx_requests_created ON requests(created_at);
            CREATE INDEX IF NOT EXISTS idx_payments_created ON payments(created_at);
            CREATE INDEX IF NOT EXISTS idx_request_attachments_request
                ON request_attachments(request_id);
            CREATE INDEX IF NOT EXISTS idx_payment_files_payment ON payment_files(payment_id);
        "#,
    },
];

/// Columns every table must have, with their SQL types.
static REQUIRED_COLUMNS: &[(&str, &[(&str, &str)])] = &[
    (
        "requests",
        &[
            ("chat_id", "INTEGER"),
            ("type", "TEXT"),
            ("route", "TEXT"),
            ("dates", "TEXT"),
            ("guests", "TEXT"),
            ("rooms", "TEXT"),
            ("stars", "TEXT"),
            ("breakfast", "TEXT"),
            ("location_pref", "TEXT"),
            ("budget", "TEXT"),
            ("class", "TEXT"),
            ("baggage", "TEXT"),
            ("carriers", "TEXT"),
            ("fullname", "TEXT"),
            ("dob", "TEXT"),
            ("gender", "TEXT"),
            ("citizenship", "TEXT"),
            ("passport_no", "TEXT"),
            ("passport_exp", "TEXT"),
            ("contact", "TEXT"),
            ("created_at", "TEXT"),
        ],
    ),
    (
        "request_attachments",
        &[("request_id", "INTEGER"), ("kind", "TEXT"), ("file_id", "TEXT")],
    ),
    (
        "payments",
        &[
            ("chat_id", "INTEGER"),
            ("amount_raw", "TEXT"),
            ("amount", "TEXT"),
            ("currency", "TEXT"),
            ("pay_method", "TEXT"),
            ("pay_date", "TEXT"),
            ("created_at", "TEXT"),
        ],
    ),
    (
        "payment_files",
        &[("payment_id", "INTEGER"), ("kind", "TEXT"), ("file_id", "TEXT")],
    ),
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;

            // Pre-existing tables may lack columns the later versions index.
            if migration.version == 1 {
                add_missing_columns(conn).await?;
            }
        }
    }

    tracing::info!(
        "Database migrations complete (at V{})",
        get_current_version(conn).await?
    );
    Ok(())
}

/// Add required columns missing from existing tables.
///
/// Only ever adds columns, so it is safe to run at any time and any number
/// of times. Tables that do not exist are skipped. Returns the number of
/// columns added.
pub async fn add_missing_columns(conn: &Connection) -> Result<usize, DatabaseError> {
    let mut added = 0;
    for (table, columns) in REQUIRED_COLUMNS {
        let existing = table_columns(conn, table).await?;
        if existing.is_empty() {
            continue;
        }
        for (name, sql_type) in *columns {
            if existing.iter().any(|c| c == name) {
                continue;
            }
            conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {name} {sql_type}"), ())
                .await
                .map_err(|e| {
                    DatabaseError::Migration(format!("Failed to add {table}.{name}: {e}"))
                })?;
            tracing::info!(table = *table, column = *name, "Added missing column");
            added += 1;
        }
    }
    Ok(added)
}

/// Column names of `table`, empty when the table does not exist.
async fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, DatabaseError> {
    let mut rows = conn
        .query(&format!("PRAGMA table_info({table})"), ())
        .await
        .map_err(|e| DatabaseError::Query(format!("table_info({table}): {e}")))?;

    let mut names = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("table_info({table}): {e}")))?
    {
        let name: String = row
            .get(1)
            .map_err(|e| DatabaseError::Query(format!("table_info({table}) row: {e}")))?;
        names.push(name);
    }
    Ok(names)
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
