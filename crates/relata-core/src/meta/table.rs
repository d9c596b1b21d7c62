//! Table mapping descriptors.

use super::column::ColumnDef;
use super::relation::{Cardinality, FetchKind, RelationDef};
use crate::entity::Entity;
use crate::error::Error;
use crate::value::ValueKind;

/// The mapping descriptor for one entity type: table name, primary key
/// column, scalar columns, and relations to other entity types.
///
/// Descriptors are built once per process (typically inside a
/// `LazyLock` behind [`Entity::meta`]) and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct TableMeta {
    table: String,
    key: ColumnDef,
    columns: Vec<ColumnDef>,
    relations: Vec<RelationDef>,
}

impl TableMeta {
    /// Create a descriptor with an integer primary key column.
    pub fn new(table: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: ColumnDef::new(key_column, ValueKind::Int64),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Add a scalar column.
    pub fn with_column(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.columns.push(ColumnDef::new(name, kind));
        self
    }

    /// Add a to-one relation to entity type `M`; `fk_column` is the foreign
    /// key column on this table.
    pub fn with_one<M: Entity>(mut self, fk_column: impl Into<String>, fetch: FetchKind) -> Self {
        self.relations.push(RelationDef::one::<M>(fk_column, fetch));
        self
    }

    /// Add a to-many relation to entity type `M`; `fk_column` is the column
    /// on `M`'s table pointing back at this one.
    pub fn with_many<M: Entity>(mut self, fk_column: impl Into<String>, fetch: FetchKind) -> Self {
        self.relations.push(RelationDef::many::<M>(fk_column, fetch));
        self
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Primary key column.
    pub fn key(&self) -> &ColumnDef {
        &self.key
    }

    /// Scalar columns, excluding the primary key.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Declared relations.
    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    /// Resolve a scalar column (or the primary key) by logical name.
    pub fn column(&self, name: &str) -> Result<&ColumnDef, Error> {
        if self.key.name == name {
            return Ok(&self.key);
        }
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownColumn {
                table: self.table.clone(),
                column: name.to_string(),
            })
    }

    /// Resolve a relation by its foreign key name.
    pub fn relation(&self, fk_column: &str) -> Result<&RelationDef, Error> {
        self.relations
            .iter()
            .find(|r| r.fk_column == fk_column)
            .ok_or_else(|| Error::UnknownRelation {
                table: self.table.clone(),
                relation: fk_column.to_string(),
            })
    }

    /// Resolve a name that may appear in a predicate or projection: the
    /// primary key, a scalar column, or a to-one foreign key column.
    pub fn selectable(&self, name: &str) -> Result<&str, Error> {
        if self.key.name == name {
            return Ok(&self.key.name);
        }
        if let Some(col) = self.columns.iter().find(|c| c.name == name) {
            return Ok(&col.name);
        }
        self.relations
            .iter()
            .find(|r| r.cardinality == Cardinality::One && r.fk_column == name)
            .map(|r| r.fk_column.as_str())
            .ok_or_else(|| Error::UnknownColumn {
                table: self.table.clone(),
                column: name.to_string(),
            })
    }

    /// Every physical column the engine selects for this table: primary key,
    /// scalars, then to-one foreign keys, in declaration order.
    pub fn select_columns(&self) -> Vec<&str> {
        let mut cols = Vec::with_capacity(1 + self.columns.len() + self.relations.len());
        cols.push(self.key.name.as_str());
        cols.extend(self.columns.iter().map(|c| c.name.as_str()));
        cols.extend(
            self.relations
                .iter()
                .filter(|r| r.cardinality == Cardinality::One)
                .map(|r| r.fk_column.as_str()),
        );
        cols
    }

    /// Reject duplicate column declarations and foreign key collisions.
    ///
    /// Called at registry build so mapping mistakes fail at startup, never
    /// at query time.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        let mut seen: Vec<&str> = vec![&self.key.name];
        for col in &self.columns {
            if seen.contains(&col.name.as_str()) {
                return Err(Error::MetadataConflict(format!(
                    "table `{}` declares column `{}` twice",
                    self.table, col.name
                )));
            }
            seen.push(&col.name);
        }
        for rel in &self.relations {
            if rel.cardinality == Cardinality::One {
                if seen.contains(&rel.fk_column.as_str()) {
                    return Err(Error::MetadataConflict(format!(
                        "table `{}` maps `{}` as both a column and a foreign key",
                        self.table, rel.fk_column
                    )));
                }
                seen.push(&rel.fk_column);
            }
        }
        Ok(())
    }
}
