//! Core error types.

use crate::connector::{ConnectorError, ConnectorErrorKind};
use crate::value::ValueKind;
use thiserror::Error;

/// Errors raised by the mapping engine.
///
/// Builder misuse variants are detected before any statement is issued;
/// nothing here is ever retried internally, because a duplicated
/// non-idempotent write would corrupt data.
#[derive(Debug, Error)]
pub enum Error {
    /// Conflicting metadata declarations detected at registry build time.
    #[error("metadata conflict: {0}")]
    MetadataConflict(String),

    /// An entity type was used without being registered.
    #[error("entity type `{0}` is not registered")]
    UnknownEntity(&'static str),

    /// A column name does not exist in the entity metadata.
    #[error("unknown column `{column}` on table `{table}`")]
    UnknownColumn {
        /// Table the lookup ran against.
        table: String,
        /// The missing logical column name.
        column: String,
    },

    /// A relation foreign key does not exist in the entity metadata.
    #[error("unknown relation `{relation}` on table `{table}`")]
    UnknownRelation {
        /// Table the lookup ran against.
        table: String,
        /// The missing foreign key name.
        relation: String,
    },

    /// AND and OR were mixed at one nesting level without explicit grouping.
    #[error("ambiguous predicate: mixed and()/or() at one nesting level; group with open()/close()")]
    AmbiguousPrecedence,

    /// An eager-load path could not be resolved against the metadata.
    #[error("invalid eager path: {0}")]
    InvalidEagerPath(String),

    /// Pagination over a to-many eager load without a stable ordering key.
    #[error("pagination with a to-many eager load requires paged_order_by()")]
    AmbiguousPagination,

    /// Page number or page size below 1.
    #[error("invalid page window: page {page}, size {size} (both must be >= 1)")]
    InvalidPage {
        /// Requested 1-based page number.
        page: i64,
        /// Requested page size.
        size: i64,
    },

    /// A fluent call arrived in a state that does not accept it.
    #[error("builder misuse: {0}")]
    BuilderMisuse(String),

    /// A point lookup, update, or delete matched no row.
    #[error("no `{table}` row with key {key}")]
    EntityNotFound {
        /// Table that was searched.
        table: String,
        /// Primary key that matched nothing.
        key: i64,
    },

    /// `exec_for_entity` matched more than one distinct root.
    #[error("expected at most one result, got {count}")]
    NotUniqueResult {
        /// Number of distinct roots that matched.
        count: usize,
    },

    /// A row value did not have the type the mapping expected.
    #[error("column `{column}` is not of kind {expected:?}")]
    TypeMismatch {
        /// Qualified result column name.
        column: String,
        /// Kind the caller asked for.
        expected: ValueKind,
    },

    /// The backend rejected a generated statement, typically a missing column.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Any other backing store failure, surfaced unchanged.
    #[error("connector error: {0}")]
    Connector(ConnectorError),
}

impl From<ConnectorError> for Error {
    fn from(err: ConnectorError) -> Self {
        match err.kind() {
            ConnectorErrorKind::MissingColumn => Error::SchemaMismatch(err.to_string()),
            _ => Error::Connector(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_becomes_schema_mismatch() {
        let err = ConnectorError::missing_column("no such column: color");
        assert!(matches!(Error::from(err), Error::SchemaMismatch(_)));
    }

    #[test]
    fn test_backend_error_passes_through() {
        let err = ConnectorError::backend("disk I/O error");
        assert!(matches!(Error::from(err), Error::Connector(_)));
    }
}
