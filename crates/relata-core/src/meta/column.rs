//! Scalar column descriptors.

use crate::value::ValueKind;

/// A scalar column mapped onto an entity property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name as it appears in the table.
    pub name: String,
    /// Value kind stored in the column.
    pub kind: ValueKind,
}

impl ColumnDef {
    /// Create a new column descriptor.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}
