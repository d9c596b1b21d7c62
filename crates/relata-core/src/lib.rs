//! Relata Core - Entity mapping, lazy proxies, and the fluent SQL builder.
//!
//! This crate provides the backend-independent half of the Relata ORM
//! engine: metadata registration, query planning and row mapping, and the
//! persistence manager. Backends plug in through [`Connector`].

pub mod connector;
pub mod dynamic;
pub mod entity;
pub mod error;
pub mod meta;
pub mod orm;
pub mod proxy;
pub mod query;
pub mod value;

mod persist;

#[cfg(test)]
pub(crate) mod testkit;

pub use connector::{Connector, ConnectorError, ConnectorErrorKind, ExecResult, Row};
pub use dynamic::{DynamicColumn, DynamicValues};
pub use entity::Entity;
pub use error::Error;
pub use meta::{
    Cardinality, ColumnDef, FetchKind, MetaRegistry, RegistryBuilder, RelationDef, TableMeta,
};
pub use orm::Orm;
pub use proxy::{Children, Lazy};
pub use query::{EagerPath, Page, QueryBuilder, RowContext};
pub use value::{Value, ValueKind};
