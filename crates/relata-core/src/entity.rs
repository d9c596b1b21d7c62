//! The mapping contract implemented by persisted types.

use crate::dynamic::DynamicValues;
use crate::error::Error;
use crate::meta::TableMeta;
use crate::query::RowContext;
use crate::value::Value;

/// A type mapped onto a table row.
///
/// Implementations describe their table once through [`Entity::meta`]
/// (typically a `std::sync::LazyLock<TableMeta>`) and convert between rows
/// and instances through [`Entity::from_row`] / [`Entity::to_row`].
///
/// An unset key marks a transient instance: the persistence manager INSERTs
/// it and writes the generated key back before returning. A set key means
/// UPDATE by primary key.
pub trait Entity: Send + Sync + Sized + 'static {
    /// The table descriptor for this type. Must return the same reference
    /// on every call.
    fn meta() -> &'static TableMeta;

    /// Primary key value, `None` while transient.
    fn key(&self) -> Option<i64>;

    /// Store a generated primary key after INSERT.
    fn set_key(&mut self, key: i64);

    /// Materialize an instance from one result row.
    ///
    /// Relations are read through [`RowContext::one`] and
    /// [`RowContext::many`], which decide between a mapped value and a lazy
    /// proxy based on the query's eager-load plan.
    fn from_row(ctx: &RowContext<'_>) -> Result<Self, Error>;

    /// Absorb a duplicate row produced by to-many join fan-out.
    ///
    /// Called instead of [`Entity::from_row`] when a row repeats an already
    /// mapped primary key. Types with eagerly loaded collections must
    /// forward the row into them (see [`crate::proxy::Children::absorb`]);
    /// the default drops the duplicate.
    fn merge_row(&mut self, ctx: &RowContext<'_>) -> Result<(), Error> {
        let _ = ctx;
        Ok(())
    }

    /// Column assignments for INSERT/UPDATE, excluding the primary key.
    ///
    /// Each name must resolve to a scalar column or a to-one foreign key of
    /// [`Entity::meta`]; to-one values come from [`crate::proxy::Lazy::key_value`].
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Extra persisted attributes, for types carrying dynamic columns.
    fn dynamic(&self) -> Option<&DynamicValues> {
        None
    }

    /// Mutable access to the dynamic attribute store.
    fn dynamic_mut(&mut self) -> Option<&mut DynamicValues> {
        None
    }
}
