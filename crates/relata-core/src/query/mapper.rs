//! Row-to-object mapping and join fan-out reassembly.

use super::eager::JoinPlan;
use crate::connector::Row;
use crate::dynamic::DynamicValues;
use crate::entity::Entity;
use crate::error::Error;
use crate::meta::{Cardinality, TableMeta};
use crate::proxy::{Children, Lazy};
use crate::value::{Value, ValueKind};
use std::collections::HashMap;

/// One result row seen through a join plan node.
///
/// Result columns are aliased `<table alias>_<column>`; the context resolves
/// logical column names against the node's metadata and hands relations back
/// as loaded values or proxies depending on plan coverage.
pub struct RowContext<'a> {
    row: &'a Row,
    plan: &'a JoinPlan,
    node: Option<usize>,
}

impl<'a> RowContext<'a> {
    pub(crate) fn root(row: &'a Row, plan: &'a JoinPlan) -> Self {
        Self {
            row,
            plan,
            node: None,
        }
    }

    fn meta(&self) -> &'static TableMeta {
        self.plan.meta_of(self.node)
    }

    fn qualified(&self, name: &str) -> String {
        format!("{}_{}", self.plan.alias_of(self.node), name)
    }

    /// This node's primary key value, `None` when the joined row is absent.
    pub fn key(&self) -> Result<Option<i64>, Error> {
        let column = self.qualified(&self.meta().key().name);
        match self.row.get(&column) {
            Some(value) => Ok(value.as_i64()),
            None => Err(Error::SchemaMismatch(format!(
                "result set is missing key column `{column}`"
            ))),
        }
    }

    /// Raw value of a logical column on this node.
    pub fn value(&self, name: &str) -> Result<&'a Value, Error> {
        let resolved = self.meta().selectable(name)?;
        let column = self.qualified(resolved);
        self.row.get(&column).ok_or_else(|| {
            Error::SchemaMismatch(format!("result set is missing column `{column}`"))
        })
    }

    /// A non-null text column.
    pub fn string(&self, name: &str) -> Result<String, Error> {
        self.value(name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.mismatch(name, ValueKind::Text))
    }

    /// A nullable text column.
    pub fn opt_string(&self, name: &str) -> Result<Option<String>, Error> {
        let value = self.value(name)?;
        if value.is_null() {
            return Ok(None);
        }
        self.string(name).map(Some)
    }

    /// A non-null 64-bit integer column.
    pub fn int64(&self, name: &str) -> Result<i64, Error> {
        self.value(name)?
            .as_i64()
            .ok_or_else(|| self.mismatch(name, ValueKind::Int64))
    }

    /// A nullable 64-bit integer column.
    pub fn opt_int64(&self, name: &str) -> Result<Option<i64>, Error> {
        let value = self.value(name)?;
        if value.is_null() {
            return Ok(None);
        }
        self.int64(name).map(Some)
    }

    /// A non-null 32-bit integer column.
    pub fn int32(&self, name: &str) -> Result<i32, Error> {
        self.value(name)?
            .as_i32()
            .ok_or_else(|| self.mismatch(name, ValueKind::Int32))
    }

    /// A non-null boolean column (integer-backed backends map 0/1).
    pub fn boolean(&self, name: &str) -> Result<bool, Error> {
        let value = self.value(name)?;
        value
            .as_bool()
            .or_else(|| value.as_i64().map(|i| i != 0))
            .ok_or_else(|| self.mismatch(name, ValueKind::Bool))
    }

    /// A non-null float column.
    pub fn float64(&self, name: &str) -> Result<f64, Error> {
        self.value(name)?
            .as_f64()
            .ok_or_else(|| self.mismatch(name, ValueKind::Float64))
    }

    fn mismatch(&self, name: &str, expected: ValueKind) -> Error {
        Error::TypeMismatch {
            column: self.qualified(name),
            expected,
        }
    }

    /// Map a to-one relation: the joined value when the plan covers it,
    /// otherwise a proxy built from the foreign key column.
    pub fn one<M: Entity>(&self, fk_column: &str) -> Result<Lazy<M>, Error> {
        let relation = self.meta().relation(fk_column)?;
        if relation.cardinality != Cardinality::One || !relation.targets::<M>() {
            return Err(Error::BuilderMisuse(format!(
                "relation `{fk_column}` on table `{}` does not map to a to-one `{}`",
                self.meta().table(),
                M::meta().table()
            )));
        }

        if let Some(node) = self.plan.node_for(self.node, fk_column) {
            let child = RowContext {
                row: self.row,
                plan: self.plan,
                node: Some(node),
            };
            if child.key()?.is_some() {
                return Ok(Lazy::loaded(M::from_row(&child)?));
            }
            // Joined row absent: NULL foreign key or a dangling reference.
        }

        match self.value(fk_column)?.as_i64() {
            Some(key) => Ok(Lazy::unloaded(key)),
            None => Ok(Lazy::absent()),
        }
    }

    /// Map a to-many relation: a one-element (or empty) loaded collection
    /// when the plan covers it, otherwise an unloaded collection.
    ///
    /// Fan-out rows for the same parent each carry one child; the parent's
    /// [`Entity::merge_row`] absorbs them into the first row's collection.
    pub fn many<M: Entity>(&self, fk_column: &str) -> Result<Children<M>, Error> {
        let relation = self.meta().relation(fk_column)?;
        if relation.cardinality != Cardinality::Many || !relation.targets::<M>() {
            return Err(Error::BuilderMisuse(format!(
                "relation `{fk_column}` on table `{}` does not map to a to-many `{}`",
                self.meta().table(),
                M::meta().table()
            )));
        }

        if let Some(node) = self.plan.node_for(self.node, fk_column) {
            let child = RowContext {
                row: self.row,
                plan: self.plan,
                node: Some(node),
            };
            return match child.key()? {
                Some(_) => Ok(Children::from_vec(vec![M::from_row(&child)?])),
                None => Ok(Children::empty()),
            };
        }

        match self.key()? {
            Some(parent) => Ok(Children::unloaded(fk_column, parent)),
            None => Ok(Children::empty()),
        }
    }

    /// Build the dynamic value store from the descriptors the query
    /// requested. Descriptors outside the request stay absent.
    pub fn dynamic(&self) -> Result<DynamicValues, Error> {
        let mut values = DynamicValues::new();
        for column in &self.plan.dynamic {
            let qualified = self.qualified(column.name());
            let value = self.row.get(&qualified).ok_or_else(|| {
                Error::SchemaMismatch(format!("result set is missing column `{qualified}`"))
            })?;
            values.set(column, value.clone());
        }
        Ok(values)
    }
}

/// Reassemble a joined result set into root entities.
///
/// Each distinct root key yields exactly one instance, in first-seen row
/// order; repeated keys (to-many fan-out) route through
/// [`Entity::merge_row`].
pub(crate) fn map_rows<T: Entity>(rows: &[Row], plan: &JoinPlan) -> Result<Vec<T>, Error> {
    let mut items: Vec<T> = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();

    for row in rows {
        let ctx = RowContext::root(row, plan);
        let Some(key) = ctx.key()? else {
            continue;
        };
        match index.get(&key) {
            Some(&at) => items[at].merge_row(&ctx)?,
            None => {
                index.insert(key, items.len());
                items.push(T::from_row(&ctx)?);
            }
        }
    }
    Ok(items)
}
