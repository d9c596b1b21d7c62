//! Shared test fixtures: a scripted connector and a small car-catalog
//! mapping exercised across the unit tests.

use crate::connector::{Connector, ConnectorError, ExecResult, Row};
use crate::dynamic::DynamicValues;
use crate::entity::Entity;
use crate::error::Error;
use crate::meta::{FetchKind, MetaRegistry, TableMeta};
use crate::proxy::{Children, Lazy};
use crate::query::RowContext;
use crate::value::{Value, ValueKind};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, LazyLock};

/// A connector that replays scripted results and records every statement.
pub(crate) struct MockConnector {
    queries: Mutex<Vec<(String, Vec<Value>)>>,
    execs: Mutex<Vec<(String, Vec<Value>)>>,
    query_results: Mutex<VecDeque<(Arc<Vec<String>>, Vec<Vec<Value>>)>>,
    exec_results: Mutex<VecDeque<ExecResult>>,
    next_key: AtomicI64,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self {
            queries: Mutex::new(Vec::new()),
            execs: Mutex::new(Vec::new()),
            query_results: Mutex::new(VecDeque::new()),
            exec_results: Mutex::new(VecDeque::new()),
            next_key: AtomicI64::new(1),
        }
    }

    /// Script the next query's result set.
    pub(crate) fn expect_query(&self, columns: Vec<&str>, rows: Vec<Vec<Value>>) {
        let columns = Arc::new(columns.into_iter().map(String::from).collect::<Vec<_>>());
        self.query_results.lock().push_back((columns, rows));
    }

    /// Script the next write statement's outcome.
    pub(crate) fn expect_exec(&self, rows_affected: u64, generated_key: Option<i64>) {
        self.exec_results.lock().push_back(ExecResult {
            rows_affected,
            generated_key,
        });
    }

    pub(crate) fn query_count(&self) -> usize {
        self.queries.lock().len()
    }

    pub(crate) fn queries(&self) -> Vec<(String, Vec<Value>)> {
        self.queries.lock().clone()
    }

    pub(crate) fn last_query(&self) -> Option<(String, Vec<Value>)> {
        self.queries.lock().last().cloned()
    }

    pub(crate) fn execs(&self) -> Vec<(String, Vec<Value>)> {
        self.execs.lock().clone()
    }

    pub(crate) fn last_exec(&self) -> Option<(String, Vec<Value>)> {
        self.execs.lock().last().cloned()
    }
}

impl Connector for MockConnector {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult, ConnectorError> {
        self.execs.lock().push((sql.to_string(), params.to_vec()));
        if matches!(sql, "BEGIN" | "COMMIT" | "ROLLBACK") {
            return Ok(ExecResult::default());
        }
        if let Some(scripted) = self.exec_results.lock().pop_front() {
            return Ok(scripted);
        }
        // Unscripted writes succeed with a fresh generated key.
        Ok(ExecResult {
            rows_affected: 1,
            generated_key: Some(self.next_key.fetch_add(1, Ordering::Relaxed)),
        })
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ConnectorError> {
        self.queries.lock().push((sql.to_string(), params.to_vec()));
        let Some((columns, rows)) = self.query_results.lock().pop_front() else {
            return Ok(Vec::new());
        };
        Ok(rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect())
    }
}

/// Parent side of the test mapping.
#[derive(Debug, Clone)]
pub(crate) struct CarManufacturer {
    pub id: Option<i64>,
    pub name: String,
    pub models: Children<CarModel>,
}

impl CarManufacturer {
    pub(crate) fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            models: Children::empty(),
        }
    }

    pub(crate) fn with_key(key: i64, name: impl Into<String>) -> Self {
        Self {
            id: Some(key),
            ..Self::named(name)
        }
    }
}

static MANUFACTURER_META: LazyLock<TableMeta> = LazyLock::new(|| {
    TableMeta::new("CarManufacturers", "id")
        .with_column("name", ValueKind::Text)
        .with_many::<CarModel>("manufacturer_id", FetchKind::Lazy)
});

impl Entity for CarManufacturer {
    fn meta() -> &'static TableMeta {
        &MANUFACTURER_META
    }

    fn key(&self) -> Option<i64> {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = Some(key);
    }

    fn from_row(ctx: &RowContext<'_>) -> Result<Self, Error> {
        Ok(Self {
            id: ctx.key()?,
            name: ctx.string("name")?,
            models: ctx.many("manufacturer_id")?,
        })
    }

    fn merge_row(&mut self, ctx: &RowContext<'_>) -> Result<(), Error> {
        self.models.absorb(ctx.many("manufacturer_id")?);
        Ok(())
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("name", Value::Text(self.name.clone()))]
    }
}

/// Child side of the test mapping, with a dynamic value store.
#[derive(Debug, Clone)]
pub(crate) struct CarModel {
    pub id: Option<i64>,
    pub name: String,
    pub kind: String,
    pub manufacturer: Lazy<CarManufacturer>,
    pub dynamic: DynamicValues,
}

static MODEL_META: LazyLock<TableMeta> = LazyLock::new(|| {
    TableMeta::new("CarModels", "id")
        .with_column("name", ValueKind::Text)
        .with_column("kind", ValueKind::Text)
        .with_one::<CarManufacturer>("manufacturer_id", FetchKind::Lazy)
});

impl Entity for CarModel {
    fn meta() -> &'static TableMeta {
        &MODEL_META
    }

    fn key(&self) -> Option<i64> {
        self.id
    }

    fn set_key(&mut self, key: i64) {
        self.id = Some(key);
    }

    fn from_row(ctx: &RowContext<'_>) -> Result<Self, Error> {
        Ok(Self {
            id: ctx.key()?,
            name: ctx.string("name")?,
            kind: ctx.string("kind")?,
            manufacturer: ctx.one("manufacturer_id")?,
            dynamic: ctx.dynamic()?,
        })
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("name", Value::Text(self.name.clone())),
            ("kind", Value::Text(self.kind.clone())),
            ("manufacturer_id", self.manufacturer.key_value()),
        ]
    }

    fn dynamic(&self) -> Option<&DynamicValues> {
        Some(&self.dynamic)
    }

    fn dynamic_mut(&mut self) -> Option<&mut DynamicValues> {
        Some(&mut self.dynamic)
    }
}

/// The registry both test entities live in.
pub(crate) fn car_registry() -> MetaRegistry {
    MetaRegistry::builder()
        .register::<CarManufacturer>()
        .expect("register CarManufacturer")
        .register::<CarModel>()
        .expect("register CarModel")
        .build()
        .expect("build car registry")
}
