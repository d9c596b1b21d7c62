//! The process-wide registry of entity descriptors.

use super::relation::RelationDef;
use super::table::TableMeta;
use crate::entity::Entity;
use crate::error::Error;
use crate::meta::ColumnDef;
use std::any::TypeId;
use std::collections::HashMap;

/// One registered entity type.
#[derive(Debug, Clone, Copy)]
struct Registered {
    meta: &'static TableMeta,
    type_name: &'static str,
}

/// Immutable registry of every mapped entity type.
///
/// Built once at startup through [`RegistryBuilder`]; after `build()` the
/// registry is read-only and safe for unsynchronized concurrent reads.
#[derive(Debug)]
pub struct MetaRegistry {
    by_type: HashMap<TypeId, Registered>,
    by_table: HashMap<String, TypeId>,
}

impl MetaRegistry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Number of registered entity types.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Check whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Get the descriptor for entity type `T`.
    pub fn describe<T: Entity>(&self) -> Result<&'static TableMeta, Error> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|r| r.meta)
            .ok_or_else(|| Error::UnknownEntity(std::any::type_name::<T>()))
    }

    /// Get the descriptor for a type id, if registered.
    pub fn describe_by_id(&self, id: TypeId) -> Option<&'static TableMeta> {
        self.by_type.get(&id).map(|r| r.meta)
    }

    /// Resolve a scalar column on entity type `T` by logical name.
    pub fn resolve_column<T: Entity>(&self, name: &str) -> Result<&'static ColumnDef, Error> {
        self.describe::<T>()?.column(name)
    }

    /// Resolve a relation on entity type `T` by foreign key name.
    pub fn resolve_relation<T: Entity>(&self, fk_column: &str) -> Result<&'static RelationDef, Error> {
        self.describe::<T>()?.relation(fk_column)
    }
}

/// Builder collecting entity registrations before the registry freezes.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    by_type: HashMap<TypeId, Registered>,
    by_table: HashMap<String, TypeId>,
}

impl RegistryBuilder {
    /// Register entity type `T`.
    ///
    /// Fails with [`Error::MetadataConflict`] on duplicate registrations,
    /// table name collisions, or invalid column declarations.
    pub fn register<T: Entity>(mut self) -> Result<Self, Error> {
        let meta = T::meta();
        meta.validate()?;

        let id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();
        if self.by_type.contains_key(&id) {
            return Err(Error::MetadataConflict(format!(
                "entity type `{type_name}` registered twice"
            )));
        }
        if let Some(other) = self.by_table.get(meta.table()) {
            let other_name = self.by_type[other].type_name;
            return Err(Error::MetadataConflict(format!(
                "table `{}` mapped by both `{other_name}` and `{type_name}`",
                meta.table()
            )));
        }

        self.by_table.insert(meta.table().to_string(), id);
        self.by_type.insert(id, Registered { meta, type_name });
        Ok(self)
    }

    /// Freeze the registry.
    ///
    /// Verifies that every relation points at a registered entity type, so
    /// dangling targets fail here instead of during planning.
    pub fn build(self) -> Result<MetaRegistry, Error> {
        for reg in self.by_type.values() {
            for rel in reg.meta.relations() {
                if !self.by_type.contains_key(&rel.target_id()) {
                    return Err(Error::MetadataConflict(format!(
                        "table `{}` relation `{}` targets unregistered table `{}`",
                        reg.meta.table(),
                        rel.fk_column,
                        rel.target_table()
                    )));
                }
            }
        }
        Ok(MetaRegistry {
            by_type: self.by_type,
            by_table: self.by_table,
        })
    }
}
