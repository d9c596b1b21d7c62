//! Relata SQLite - rusqlite-backed connector for the Relata ORM engine.
//!
//! One [`rusqlite::Connection`] behind a mutex; every engine call is a
//! single synchronous statement against it. Transactions use the engine's
//! default BEGIN/COMMIT/ROLLBACK flow, which matches SQLite's semantics.

use parking_lot::Mutex;
use relata_core::{Connector, ConnectorError, ExecResult, Row, Value};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A [`Connector`] over one SQLite connection.
pub struct SqliteConnector {
    conn: Mutex<Connection>,
}

impl SqliteConnector {
    /// Open (creating if needed) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConnectorError> {
        let conn = Connection::open(path).map_err(to_connector_error)?;
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, ConnectorError> {
        let conn = Connection::open_in_memory().map_err(to_connector_error)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already configured connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run a raw statement batch, typically schema DDL.
    pub fn execute_batch(&self, sql: &str) -> Result<(), ConnectorError> {
        debug!(sql = %sql, "executing batch");
        self.conn.lock().execute_batch(sql).map_err(to_connector_error)
    }
}

impl Connector for SqliteConnector {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult, ConnectorError> {
        let conn = self.conn.lock();
        let rows_affected = conn
            .execute(sql, rusqlite::params_from_iter(params.iter().map(bind)))
            .map_err(to_connector_error)? as u64;
        // last_insert_rowid() is connection-global, so only report it for
        // the INSERT that just ran.
        let generated_key = if is_insert(sql) {
            Some(conn.last_insert_rowid())
        } else {
            None
        };
        Ok(ExecResult {
            rows_affected,
            generated_key,
        })
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ConnectorError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(to_connector_error)?;
        let columns: Arc<Vec<String>> = Arc::new(
            stmt.column_names().iter().map(|c| c.to_string()).collect(),
        );

        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter().map(bind)))
            .map_err(to_connector_error)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(to_connector_error)? {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                let value = row.get_ref(idx).map_err(to_connector_error)?;
                values.push(read(value));
            }
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .map(|head| head.eq_ignore_ascii_case("INSERT"))
        .unwrap_or(false)
}

fn bind(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
        Value::Int32(i) => rusqlite::types::Value::Integer(i64::from(*i)),
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

fn read(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

fn to_connector_error(err: rusqlite::Error) -> ConnectorError {
    let message = err.to_string();
    // SQLite phrases the failure differently on the read and write paths.
    if message.contains("no such column") || message.contains("has no column named") {
        return ConnectorError::missing_column(message);
    }
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if matches!(
            failure.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ) {
            return ConnectorError::busy(message);
        }
    }
    ConnectorError::backend(message)
}
