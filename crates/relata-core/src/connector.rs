//! The minimal backing store contract.
//!
//! The engine consumes the relational backend through this blocking
//! execute/query surface; connection pooling, timeouts, and cancellation
//! stay on the connector side of the boundary.

use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Number of rows the statement touched.
    pub rows_affected: u64,
    /// Key generated by an INSERT, when the backend produced one.
    pub generated_key: Option<i64>,
}

/// One result row.
///
/// Column access works by name or ordinal; all values are already decoded
/// into the engine's [`Value`] model.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row from its column names and values.
    ///
    /// The column list is shared across the rows of one result set.
    pub fn new(columns: Arc<Vec<String>>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check for an empty projection.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Result column names, in projection order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get a value by result column name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.values.get(idx)
    }

    /// Get a value by ordinal.
    pub fn get_at(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Check whether a named column is null or absent.
    pub fn is_null(&self, name: &str) -> bool {
        self.get(name).map(Value::is_null).unwrap_or(true)
    }
}

/// Error classification for connector failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorErrorKind {
    /// A statement referenced a column the table does not have.
    MissingColumn,
    /// The backend is busy or locked; still surfaced, never retried here.
    Busy,
    /// Any other backend failure.
    Backend,
}

/// A failure reported by the backing store.
#[derive(Debug, Clone, Error)]
pub struct ConnectorError {
    kind: ConnectorErrorKind,
    message: String,
}

impl ConnectorError {
    /// A missing-column failure.
    pub fn missing_column(message: impl Into<String>) -> Self {
        Self {
            kind: ConnectorErrorKind::MissingColumn,
            message: message.into(),
        }
    }

    /// A busy/locked failure.
    pub fn busy(message: impl Into<String>) -> Self {
        Self {
            kind: ConnectorErrorKind::Busy,
            message: message.into(),
        }
    }

    /// A generic backend failure.
    pub fn backend(message: impl Into<String>) -> Self {
        Self {
            kind: ConnectorErrorKind::Backend,
            message: message.into(),
        }
    }

    /// The failure classification.
    pub fn kind(&self) -> ConnectorErrorKind {
        self.kind
    }
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Blocking access to the relational backend.
///
/// Implementations must be shareable across threads; each call is one
/// synchronous round trip.
pub trait Connector: Send + Sync {
    /// Run a write statement with positional parameters.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult, ConnectorError>;

    /// Run a read statement with positional parameters.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ConnectorError>;

    /// Open a transaction scope.
    ///
    /// The default issues a plain `BEGIN`; backends without transactions
    /// override these three and document the deviation.
    fn begin(&self) -> Result<(), ConnectorError> {
        self.execute("BEGIN", &[]).map(|_| ())
    }

    /// Commit the current transaction scope.
    fn commit(&self) -> Result<(), ConnectorError> {
        self.execute("COMMIT", &[]).map(|_| ())
    }

    /// Roll back the current transaction scope.
    fn rollback(&self) -> Result<(), ConnectorError> {
        self.execute("ROLLBACK", &[]).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        Row::new(
            Arc::new(vec!["t0_id".into(), "t0_name".into()]),
            vec![Value::Int64(1), Value::Null],
        )
    }

    #[test]
    fn test_row_access_by_name_and_ordinal() {
        let row = sample_row();
        assert_eq!(row.get("t0_id"), Some(&Value::Int64(1)));
        assert_eq!(row.get_at(1), Some(&Value::Null));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_row_null_check() {
        let row = sample_row();
        assert!(!row.is_null("t0_id"));
        assert!(row.is_null("t0_name"));
        assert!(row.is_null("missing"));
    }
}
