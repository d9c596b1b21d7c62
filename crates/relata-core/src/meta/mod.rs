//! Entity metadata: tables, columns, relations, and the registry.

mod column;
mod registry;
mod relation;
mod table;

pub use column::ColumnDef;
pub use registry::{MetaRegistry, RegistryBuilder};
pub use relation::{Cardinality, FetchKind, RelationDef};
pub use table::TableMeta;
