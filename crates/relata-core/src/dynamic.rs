//! Dynamic columns: per-instance attributes outside the static metadata.

use crate::value::{Value, ValueKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_COLUMN_ID: AtomicU64 = AtomicU64::new(1);

/// A named, typed column descriptor not declared in [`crate::meta::TableMeta`].
///
/// Each descriptor carries a process-unique identity; equality and hashing
/// use that identity, not the name, so two descriptors with the same name
/// are distinct keys in a [`DynamicValues`] map.
#[derive(Debug, Clone)]
pub struct DynamicColumn {
    id: u64,
    name: String,
    kind: ValueKind,
}

impl DynamicColumn {
    /// Create a descriptor with a fresh identity.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            id: NEXT_COLUMN_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            kind,
        }
    }

    /// The underlying table column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value kind this column stores.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }
}

impl PartialEq for DynamicColumn {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DynamicColumn {}

impl std::hash::Hash for DynamicColumn {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Per-instance store of dynamic column values, keyed by column identity.
#[derive(Debug, Clone, Default)]
pub struct DynamicValues {
    values: HashMap<u64, Value>,
}

impl DynamicValues {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value for a column.
    pub fn set(&mut self, column: &DynamicColumn, value: impl Into<Value>) {
        self.values.insert(column.id, value.into());
    }

    /// Get the value for a column, if present.
    pub fn get(&self, column: &DynamicColumn) -> Option<&Value> {
        self.values.get(&column.id)
    }

    /// Remove and return the value for a column.
    pub fn take(&mut self, column: &DynamicColumn) -> Option<Value> {
        self.values.remove(&column.id)
    }

    /// Check whether a column has a value.
    pub fn contains(&self, column: &DynamicColumn) -> bool {
        self.values.contains_key(&column.id)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check for an empty store.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
