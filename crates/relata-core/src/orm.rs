//! The engine facade tying metadata, connector, and statement machinery
//! together.

use crate::connector::Connector;
use crate::dynamic::DynamicColumn;
use crate::entity::Entity;
use crate::error::Error;
use crate::meta::MetaRegistry;
use crate::persist;
use crate::proxy::Lazy;
use crate::query::QueryBuilder;
use std::sync::Arc;
use tracing::debug;

/// The object-relational engine.
///
/// Holds a metadata registry and a backend connector; all reads go through
/// [`Orm::query`] and all writes through the `save`/`delete` family.
/// Cloning is cheap and shares both.
#[derive(Clone)]
pub struct Orm {
    connector: Arc<dyn Connector>,
    registry: Arc<MetaRegistry>,
}

impl Orm {
    pub fn new(connector: Arc<dyn Connector>, registry: Arc<MetaRegistry>) -> Self {
        Self {
            connector,
            registry,
        }
    }

    /// The backend connector.
    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    /// The metadata registry.
    pub fn registry(&self) -> &MetaRegistry {
        &self.registry
    }

    /// Start a fluent select over entity type `T`.
    ///
    /// An unregistered `T` is reported from the chain's terminal, like any
    /// other construction error.
    pub fn query<T: Entity>(&self) -> QueryBuilder<'_, T> {
        let err = self.registry.describe::<T>().err();
        QueryBuilder::new(self, err)
    }

    /// Fetch one entity by primary key.
    pub fn find<T: Entity>(&self, key: i64) -> Result<Option<T>, Error> {
        self.query::<T>()
            .select()
            .filter()
            .id()
            .eq(key)
            .exec_for_entity()
    }

    /// Fetch one entity by primary key, failing when the row is missing.
    pub fn get<T: Entity>(&self, key: i64) -> Result<T, Error> {
        self.find::<T>(key)?.ok_or_else(|| Error::EntityNotFound {
            table: T::meta().table().to_string(),
            key,
        })
    }

    /// Build an unloaded proxy for the row with the given key.
    ///
    /// No statement is issued; the row is fetched on first access, so the
    /// key is not verified to exist here.
    pub fn proxy<T: Entity>(&self, key: i64) -> Result<Lazy<T>, Error> {
        self.registry.describe::<T>()?;
        Ok(Lazy::unloaded(key))
    }

    /// INSERT a transient entity (writing the generated key back) or UPDATE
    /// a keyed one.
    pub fn save<T: Entity>(&self, entity: &mut T) -> Result<(), Error> {
        self.save_with(entity, &[])
    }

    /// Like [`Orm::save`], also persisting the given dynamic columns.
    pub fn save_with<T: Entity>(
        &self,
        entity: &mut T,
        dynamic: &[DynamicColumn],
    ) -> Result<(), Error> {
        self.registry.describe::<T>()?;
        persist::save_one(self.connector(), entity, dynamic)
    }

    /// Save a batch atomically: all entities persist or none do.
    pub fn save_all<T: Entity>(&self, entities: &mut [T]) -> Result<(), Error> {
        self.save_all_with(entities, &[])
    }

    /// Like [`Orm::save_all`], also persisting the given dynamic columns.
    pub fn save_all_with<T: Entity>(
        &self,
        entities: &mut [T],
        dynamic: &[DynamicColumn],
    ) -> Result<(), Error> {
        self.registry.describe::<T>()?;
        debug!(table = T::meta().table(), count = entities.len(), "saving batch");
        self.transaction(|orm| {
            for entity in entities.iter_mut() {
                persist::save_one(orm.connector(), entity, dynamic)?;
            }
            Ok(())
        })
    }

    /// DELETE one row by primary key; missing rows are an error.
    pub fn delete<T: Entity>(&self, key: i64) -> Result<(), Error> {
        self.registry.describe::<T>()?;
        persist::delete_by_key::<T>(self.connector(), key)
    }

    /// Run `body` inside a backend transaction, committing on `Ok` and
    /// rolling back on `Err`.
    pub fn transaction<R>(
        &self,
        body: impl FnOnce(&Orm) -> Result<R, Error>,
    ) -> Result<R, Error> {
        self.connector.begin()?;
        match body(self) {
            Ok(value) => {
                self.connector.commit()?;
                Ok(value)
            }
            Err(err) => {
                // Surface the original failure even when rollback also fails.
                if let Err(rollback) = self.connector.rollback() {
                    debug!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Fetch the children of one parent row, ordered by primary key.
    /// Backs [`crate::proxy::Children::load`].
    pub(crate) fn load_children<T: Entity>(
        &self,
        fk_column: &str,
        parent: i64,
    ) -> Result<Vec<T>, Error> {
        self.query::<T>()
            .select()
            .filter()
            .column(fk_column)
            .eq(parent)
            .order_by()
            .id()
            .exec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{car_registry, CarManufacturer, CarModel, MockConnector};
    use crate::value::Value;

    fn orm(connector: Arc<MockConnector>) -> Orm {
        Orm::new(connector, Arc::new(car_registry()))
    }

    #[test]
    fn test_get_missing_row_is_an_error() {
        let connector = Arc::new(MockConnector::new());
        connector.expect_query(vec!["t0_id", "t0_name"], vec![]);
        let orm = orm(connector);

        let err = orm.get::<CarManufacturer>(5).unwrap_err();
        assert!(matches!(err, Error::EntityNotFound { key: 5, .. }));
    }

    #[test]
    fn test_proxy_issues_no_statement() {
        let connector = Arc::new(MockConnector::new());
        let orm = orm(connector.clone());

        let proxy = orm.proxy::<CarManufacturer>(12).unwrap();
        assert!(proxy.is_proxy());
        assert_eq!(proxy.key(), Some(12));
        assert_eq!(connector.query_count(), 0);
    }

    #[test]
    fn test_proxy_for_unregistered_type() {
        let connector = Arc::new(MockConnector::new());
        let registry = MetaRegistry::builder().build().unwrap();
        let orm = Orm::new(connector, Arc::new(registry));

        let err = orm.proxy::<CarManufacturer>(1).unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(_)));
    }

    #[test]
    fn test_save_all_wraps_in_transaction() {
        let connector = Arc::new(MockConnector::new());
        connector.expect_exec(1, Some(1));
        connector.expect_exec(1, Some(2));
        let orm = orm(connector.clone());

        let mut makers = vec![
            CarManufacturer::named("Mazda"),
            CarManufacturer::named("Honda"),
        ];
        orm.save_all(&mut makers).unwrap();
        assert_eq!(makers[0].key(), Some(1));
        assert_eq!(makers[1].key(), Some(2));

        let statements: Vec<String> =
            connector.execs().into_iter().map(|(sql, _)| sql).collect();
        assert_eq!(statements[0], "BEGIN");
        assert!(statements[1].starts_with("INSERT INTO CarManufacturers"));
        assert!(statements[2].starts_with("INSERT INTO CarManufacturers"));
        assert_eq!(statements[3], "COMMIT");
    }

    #[test]
    fn test_save_all_rolls_back_on_failure() {
        let connector = Arc::new(MockConnector::new());
        connector.expect_exec(1, Some(1));
        connector.expect_exec(0, None); // second UPDATE misses
        let orm = orm(connector.clone());

        let mut makers = vec![
            CarManufacturer::named("Mazda"),
            CarManufacturer::with_key(99, "Ghost"),
        ];
        let err = orm.save_all(&mut makers).unwrap_err();
        assert!(matches!(err, Error::EntityNotFound { key: 99, .. }));

        let statements: Vec<String> =
            connector.execs().into_iter().map(|(sql, _)| sql).collect();
        assert_eq!(statements.last().map(String::as_str), Some("ROLLBACK"));
    }

    #[test]
    fn test_load_children_orders_by_key() {
        let connector = Arc::new(MockConnector::new());
        connector.expect_query(
            vec!["t0_id", "t0_name", "t0_kind", "t0_manufacturer_id"],
            vec![vec![
                Value::Int64(3),
                Value::Text("mx5".into()),
                Value::Text("car".into()),
                Value::Int64(1),
            ]],
        );
        let orm = orm(connector.clone());

        let models = orm
            .load_children::<CarModel>("manufacturer_id", 1)
            .unwrap();
        assert_eq!(models.len(), 1);

        let (sql, params) = connector.last_query().unwrap();
        assert!(sql.contains("WHERE t0.manufacturer_id = ?"));
        assert!(sql.ends_with("ORDER BY t0.id ASC"));
        assert_eq!(params, vec![Value::Int64(1)]);
    }
}
