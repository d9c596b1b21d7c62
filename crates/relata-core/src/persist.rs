//! Write-side statement generation.
//!
//! Transient instances (no key) INSERT and get the generated key written
//! back; keyed instances UPDATE by primary key. Requested dynamic columns
//! join the regular assignment list.

use crate::connector::Connector;
use crate::dynamic::DynamicColumn;
use crate::entity::Entity;
use crate::error::Error;
use crate::value::Value;
use tracing::debug;

/// Collect the column assignments for one entity, validating every name
/// against the metadata.
fn assignments<T: Entity>(
    entity: &T,
    dynamic: &[DynamicColumn],
) -> Result<Vec<(String, Value)>, Error> {
    let meta = T::meta();
    let mut out = Vec::new();
    for (name, value) in entity.to_row() {
        let resolved = meta.selectable(name)?;
        if resolved == meta.key().name {
            return Err(Error::BuilderMisuse(format!(
                "to_row() must not assign the key column `{resolved}`"
            )));
        }
        out.push((resolved.to_string(), value));
    }
    // Dynamic columns the caller asked to persist; values the instance
    // never set stay untouched.
    if let Some(values) = entity.dynamic() {
        for column in dynamic {
            if let Some(value) = values.get(column) {
                out.push((column.name().to_string(), value.clone()));
            }
        }
    }
    Ok(out)
}

/// INSERT or UPDATE one entity.
pub(crate) fn save_one<T: Entity>(
    connector: &dyn Connector,
    entity: &mut T,
    dynamic: &[DynamicColumn],
) -> Result<(), Error> {
    let meta = T::meta();
    let columns = assignments(entity, dynamic)?;

    match entity.key() {
        None => {
            let mut sql = format!("INSERT INTO {} (", meta.table());
            for (i, (name, _)) in columns.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(name);
            }
            sql.push_str(") VALUES (");
            for i in 0..columns.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push('?');
            }
            sql.push(')');
            let params: Vec<Value> = columns.into_iter().map(|(_, v)| v).collect();

            debug!(table = meta.table(), "inserting entity");
            let result = connector.execute(&sql, &params)?;
            let key = result.generated_key.ok_or_else(|| {
                Error::SchemaMismatch(format!(
                    "backend returned no generated key for INSERT into `{}`",
                    meta.table()
                ))
            })?;
            entity.set_key(key);
            Ok(())
        }
        Some(key) => {
            let mut sql = format!("UPDATE {} SET ", meta.table());
            for (i, (name, _)) in columns.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(name);
                sql.push_str(" = ?");
            }
            sql.push_str(&format!(" WHERE {} = ?", meta.key().name));
            let mut params: Vec<Value> = columns.into_iter().map(|(_, v)| v).collect();
            params.push(Value::Int64(key));

            debug!(table = meta.table(), key, "updating entity");
            let result = connector.execute(&sql, &params)?;
            if result.rows_affected == 0 {
                return Err(Error::EntityNotFound {
                    table: meta.table().to_string(),
                    key,
                });
            }
            Ok(())
        }
    }
}

/// DELETE one row by primary key.
pub(crate) fn delete_by_key<T: Entity>(connector: &dyn Connector, key: i64) -> Result<(), Error> {
    let meta = T::meta();
    let sql = format!("DELETE FROM {} WHERE {} = ?", meta.table(), meta.key().name);
    debug!(table = meta.table(), key, "deleting entity");
    let result = connector.execute(&sql, &[Value::Int64(key)])?;
    if result.rows_affected == 0 {
        return Err(Error::EntityNotFound {
            table: meta.table().to_string(),
            key,
        });
    }
    Ok(())
}
