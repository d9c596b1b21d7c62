//! Relation descriptors between mapped entities.

use super::table::TableMeta;
use crate::entity::Entity;
use std::any::TypeId;

/// When a relation value is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Joined into the owning query automatically.
    Eager,
    /// Deferred behind a proxy until first access.
    Lazy,
}

/// How many related rows a relation can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one related row; the foreign key lives on the owning table.
    One,
    /// An ordered collection; the foreign key lives on the target table and
    /// points back at the owner.
    Many,
}

/// A relation from one entity type to another.
///
/// The target is captured as a metadata accessor rather than a name so the
/// planner can walk relation chains without a lookup table.
#[derive(Clone)]
pub struct RelationDef {
    /// Foreign key column name. For [`Cardinality::One`] the column is on
    /// the owning table; for [`Cardinality::Many`] it is on the target.
    pub fk_column: String,
    /// Fetch behavior when no eager path covers this relation.
    pub fetch: FetchKind,
    /// Relation cardinality.
    pub cardinality: Cardinality,
    target_id: TypeId,
    target_meta: fn() -> &'static TableMeta,
}

impl RelationDef {
    /// Describe a to-one relation to entity type `M`.
    pub fn one<M: Entity>(fk_column: impl Into<String>, fetch: FetchKind) -> Self {
        Self {
            fk_column: fk_column.into(),
            fetch,
            cardinality: Cardinality::One,
            target_id: TypeId::of::<M>(),
            target_meta: M::meta,
        }
    }

    /// Describe a to-many relation to entity type `M`.
    pub fn many<M: Entity>(fk_column: impl Into<String>, fetch: FetchKind) -> Self {
        Self {
            fk_column: fk_column.into(),
            fetch,
            cardinality: Cardinality::Many,
            target_id: TypeId::of::<M>(),
            target_meta: M::meta,
        }
    }

    /// Type id of the target entity.
    pub fn target_id(&self) -> TypeId {
        self.target_id
    }

    /// Metadata of the target entity.
    pub fn target_meta(&self) -> &'static TableMeta {
        (self.target_meta)()
    }

    /// Table name of the target entity.
    pub fn target_table(&self) -> &'static str {
        self.target_meta().table()
    }

    /// Check whether this relation points at entity type `M`.
    pub fn targets<M: Entity>(&self) -> bool {
        self.target_id == TypeId::of::<M>()
    }
}

impl std::fmt::Debug for RelationDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationDef")
            .field("fk_column", &self.fk_column)
            .field("fetch", &self.fetch)
            .field("cardinality", &self.cardinality)
            .field("target", &self.target_table())
            .finish()
    }
}
