//! SQLite access: the connection, schema history, transactions and the
//! mapping of SQLite constraint failures onto [`CrmError`].

pub mod rows;

use crate::error::{CrmError, Result};
use crate::schema::SchemaDefinition;
use rusqlite::{ffi, params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// One SQLite connection, serialized behind a mutex so the store can be
/// shared between threads.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database file at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS schema_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT NOT NULL,
                schema_yaml TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CrmError::Other("database connection lock poisoned".into()))
    }

    /// Run `f` with the connection, outside any explicit transaction.
    pub fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&*conn)
    }

    /// Run `f` inside a transaction: committed when `f` returns `Ok`,
    /// rolled back when it returns `Err`.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        match f(&*tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback()?;
                Err(e)
            }
        }
    }

    /// Execute DDL statements in one transaction.
    pub fn apply_ddl(&self, statements: &[String]) -> Result<()> {
        self.transaction(|conn| {
            for statement in statements {
                conn.execute_batch(statement)?;
            }
            Ok(())
        })
    }

    // ── Schema State ─────────────────────────────────────────────────

    /// Get the most recent schema hash.
    pub fn get_last_schema_hash(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let hash = conn
                .query_row(
                    "SELECT hash FROM schema_history ORDER BY id DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(hash)
        })
    }

    /// Record a new schema version.
    pub fn record_schema(&self, hash: &str, yaml: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO schema_history (hash, schema_yaml) VALUES (?1, ?2)",
                params![hash, yaml],
            )?;
            Ok(())
        })
    }

    /// Number of recorded schema versions.
    pub fn schema_versions(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM schema_history", [], |row| row.get(0))?)
        })
    }
}

/// Translate SQLite constraint failures into store errors. Column names in
/// unique violations are mapped back to field names.
pub fn map_sqlite_error(schema: &SchemaDefinition, err: rusqlite::Error) -> CrmError {
    let (code, message) = match &err {
        rusqlite::Error::SqliteFailure(e, message) => (e.extended_code, message.clone()),
        _ => return CrmError::Sqlite(err),
    };
    let message = message.unwrap_or_else(|| err.to_string());

    match code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            unique_violation(schema, &message).unwrap_or(CrmError::Sqlite(err))
        }
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => CrmError::ReferentialIntegrity(message),
        ffi::SQLITE_CONSTRAINT_NOTNULL | ffi::SQLITE_CONSTRAINT_CHECK => {
            CrmError::Validation(message)
        }
        _ => CrmError::Sqlite(err),
    }
}

/// Parse `UNIQUE constraint failed: crm_x.col_a, crm_x.col_b`.
fn unique_violation(schema: &SchemaDefinition, message: &str) -> Option<CrmError> {
    let columns = message.split_once(": ")?.1;

    let mut table = None;
    let mut fields = Vec::new();
    for qualified in columns.split(", ") {
        let (db_table, column) = qualified.trim().split_once('.')?;
        let key = schema.table_for_db_name(db_table).unwrap_or(db_table);
        let field = schema
            .tables
            .get(key)
            .and_then(|def| def.field_for_column(column))
            .unwrap_or(column);
        table = Some(key.to_string());
        fields.push(field.to_string());
    }

    Some(CrmError::UniqueViolation {
        table: table?,
        fields,
    })
}
