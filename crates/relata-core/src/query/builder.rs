//! The fluent select builder.
//!
//! Construction is a small state machine: every call checks the state it
//! arrived in, and the first illegal transition (or unresolved name) is
//! recorded and surfaced from the terminal operation before any statement
//! is issued.

use super::eager::{EagerPath, JoinPlan};
use super::mapper::map_rows;
use super::page::{Page, PageRequest};
use super::predicate::{CompareOp, Connective, Group, Leaf, Node, Piece};
use crate::dynamic::DynamicColumn;
use crate::entity::Entity;
use crate::error::Error;
use crate::orm::Orm;
use crate::value::Value;
use std::any::TypeId;
use std::marker::PhantomData;
use tracing::debug;

/// Where the fluent chain currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    /// Nothing selected yet; only `select` variants are legal.
    Created,
    /// Projection fixed; predicate or ordering may start.
    Selected,
    /// Inside the predicate tree, between conditions.
    Predicate,
    /// A predicate leaf is under construction, awaiting its comparator.
    PredicateLeaf,
    /// Collecting ordering keys.
    Ordering,
}

#[derive(Debug, Clone)]
struct OrderKey {
    alias: String,
    column: String,
}

/// Fluent builder for SELECT statements over entity type `T`.
///
/// Obtained from [`Orm::query`]; consumed by one of the `exec*` terminals.
/// A builder is a plain value and must stay on the thread that drives the
/// chain.
pub struct QueryBuilder<'a, T: Entity> {
    orm: &'a Orm,
    plan: JoinPlan,
    state: BuilderState,
    stack: Vec<Group>,
    leaf: Vec<Piece>,
    needs_item: bool,
    scope: Option<usize>,
    order: Vec<OrderKey>,
    page: Option<PageRequest>,
    paged_order: bool,
    err: Option<Error>,
    _marker: PhantomData<T>,
}

impl<'a, T: Entity> QueryBuilder<'a, T> {
    pub(crate) fn new(orm: &'a Orm, err: Option<Error>) -> Self {
        Self {
            orm,
            // Placeholder plan; `select` rebuilds it with the real paths.
            plan: JoinPlan::root::<T>(),
            state: BuilderState::Created,
            stack: vec![Group::default()],
            leaf: Vec::new(),
            needs_item: false,
            scope: None,
            order: Vec::new(),
            page: None,
            paged_order: false,
            err,
            _marker: PhantomData,
        }
    }

    fn fail(mut self, err: Error) -> Self {
        if self.err.is_none() {
            self.err = Some(err);
        }
        self
    }

    fn misuse(self, message: impl Into<String>) -> Self {
        self.fail(Error::BuilderMisuse(message.into()))
    }

    // ---- projection -----------------------------------------------------

    /// Select all mapped columns with no explicit eager loads.
    pub fn select(self) -> Self {
        self.select_with(&[])
    }

    /// Select with eager-load paths joined into the same round trip.
    pub fn select_with(mut self, paths: &[EagerPath]) -> Self {
        if self.state != BuilderState::Created {
            return self.misuse("select() must be the first call on a builder");
        }
        match JoinPlan::build::<T>(paths) {
            Ok(plan) => self.plan = plan,
            Err(err) => return self.fail(err),
        }
        self.state = BuilderState::Selected;
        self
    }

    /// Select a 1-based page window.
    pub fn paged_select(self, page: i64, size: i64) -> Self {
        self.paged_select_with(page, size, &[])
    }

    /// Select a 1-based page window with eager-load paths.
    pub fn paged_select_with(mut self, page: i64, size: i64, paths: &[EagerPath]) -> Self {
        if page < 1 || size < 1 {
            return self.fail(Error::InvalidPage { page, size });
        }
        self.page = Some(PageRequest { page, size });
        self.select_with(paths)
    }

    /// Project the given dynamic columns off the root table and populate
    /// each mapped instance's dynamic value store from them.
    pub fn with_dynamic(mut self, columns: &[DynamicColumn]) -> Self {
        if self.state != BuilderState::Selected {
            return self.misuse("with_dynamic() must follow select() directly");
        }
        self.plan.dynamic.extend_from_slice(columns);
        self
    }

    // ---- predicate tree -------------------------------------------------

    /// Start the WHERE predicate tree.
    pub fn filter(mut self) -> Self {
        if self.state != BuilderState::Selected {
            return self.misuse("filter() must follow select()");
        }
        self.state = BuilderState::Predicate;
        self.scope = None;
        self
    }

    /// Open an explicit predicate group (a parenthesized level).
    pub fn open(mut self) -> Self {
        if self.state != BuilderState::Predicate {
            return self.misuse("open() is only valid between predicate conditions");
        }
        if let Err(err) = self.expect_item_slot() {
            return self.fail(err);
        }
        self.stack.push(Group::default());
        self
    }

    /// Close the innermost predicate group.
    pub fn close(mut self) -> Self {
        if self.state != BuilderState::Predicate {
            return self.misuse("close() is only valid between predicate conditions");
        }
        if self.needs_item {
            return self.misuse("and()/or() must be followed by a condition before close()");
        }
        if self.stack.len() < 2 {
            return self.misuse("close() without a matching open()");
        }
        let group = self.stack.pop().expect("stack underflow");
        if group.is_empty() {
            return self.misuse("empty predicate group");
        }
        self.push_item(Node::Group(group));
        self
    }

    /// Join the previous and next condition with AND.
    pub fn and(self) -> Self {
        self.connective(Connective::And)
    }

    /// Join the previous and next condition with OR.
    pub fn or(self) -> Self {
        self.connective(Connective::Or)
    }

    fn connective(mut self, connective: Connective) -> Self {
        if self.state != BuilderState::Predicate {
            return self.misuse("and()/or() must follow a completed condition");
        }
        let group = self.stack.last_mut().expect("stack underflow");
        if group.is_empty() || self.needs_item {
            return self.misuse("and()/or() must follow a completed condition");
        }
        if let Err(err) = group.connect(connective) {
            return self.fail(err);
        }
        self.needs_item = true;
        self
    }

    /// Scope subsequent column references to the joined table for entity
    /// type `R` (required when joined tables share a column name).
    pub fn alias<R: Entity>(mut self) -> Self {
        if self.state != BuilderState::Predicate {
            return self.misuse("alias() is only valid between predicate conditions");
        }
        if TypeId::of::<R>() == self.plan.root_id {
            self.scope = None;
            return self;
        }
        match self
            .plan
            .node_by_type(TypeId::of::<R>(), std::any::type_name::<R>())
        {
            Ok(node) => {
                self.scope = Some(node);
                self
            }
            Err(err) => self.fail(err),
        }
    }

    /// Return column scoping to the root table.
    pub fn root_alias(mut self) -> Self {
        if self.state != BuilderState::Predicate {
            return self.misuse("root_alias() is only valid between predicate conditions");
        }
        self.scope = None;
        self
    }

    /// Reference a column of the current scope.
    ///
    /// In the predicate tree this starts (or extends) a condition's
    /// left-hand side; after `order_by()` it appends a sort key.
    pub fn column(mut self, name: &str) -> Self {
        match self.state {
            BuilderState::Predicate => {
                if let Err(err) = self.expect_item_slot() {
                    return self.fail(err);
                }
                let piece = match self.column_piece(name) {
                    Ok(piece) => piece,
                    Err(err) => return self.fail(err),
                };
                self.leaf.push(piece);
                self.state = BuilderState::PredicateLeaf;
                self
            }
            BuilderState::PredicateLeaf => {
                let piece = match self.column_piece(name) {
                    Ok(piece) => piece,
                    Err(err) => return self.fail(err),
                };
                self.leaf.push(piece);
                self
            }
            BuilderState::Ordering => {
                let meta = self.plan.root_meta;
                let resolved = match meta.selectable(name) {
                    Ok(resolved) => resolved.to_string(),
                    Err(err) => return self.fail(err),
                };
                self.order.push(OrderKey {
                    alias: "t0".to_string(),
                    column: resolved,
                });
                self
            }
            _ => self.misuse("column() is only valid in a predicate or after order_by()"),
        }
    }

    /// Reference a column wrapped in `upper(...)` for case-insensitive
    /// comparison.
    pub fn upper_column(mut self, name: &str) -> Self {
        if self.state != BuilderState::Predicate {
            return self.misuse("upper_column() must start a condition");
        }
        if let Err(err) = self.expect_item_slot() {
            return self.fail(err);
        }
        let piece = match self.column_piece(name) {
            Ok(piece) => piece,
            Err(err) => return self.fail(err),
        };
        self.leaf.push(Piece::Raw("upper(".to_string()));
        self.leaf.push(piece);
        self.leaf.push(Piece::Raw(")".to_string()));
        self.state = BuilderState::PredicateLeaf;
        self
    }

    /// Shorthand for the current scope's primary key column.
    pub fn id(self) -> Self {
        let meta = match self.state {
            BuilderState::Ordering => self.plan.root_meta,
            _ => self.plan.meta_of(self.scope),
        };
        let key = meta.key().name.clone();
        self.column(&key)
    }

    /// Splice a raw SQL fragment into the condition under construction.
    ///
    /// Fragments are concatenated verbatim (identifiers are caller-trusted);
    /// only the values handed to comparison terminators are parameter-bound.
    pub fn sql(mut self, fragment: &str) -> Self {
        match self.state {
            BuilderState::Predicate => {
                if let Err(err) = self.expect_item_slot() {
                    return self.fail(err);
                }
                self.leaf.push(Piece::Raw(fragment.to_string()));
                self.state = BuilderState::PredicateLeaf;
                self
            }
            BuilderState::PredicateLeaf => {
                self.leaf.push(Piece::Raw(fragment.to_string()));
                self
            }
            _ => self.misuse("sql() is only valid inside a predicate condition"),
        }
    }

    fn column_piece(&self, name: &str) -> Result<Piece, Error> {
        let meta = self.plan.meta_of(self.scope);
        let resolved = meta.selectable(name)?;
        Ok(Piece::Column {
            alias: self.plan.alias_of(self.scope).to_string(),
            name: resolved.to_string(),
        })
    }

    /// A condition may start here only when the group is empty or a
    /// connective announced another item.
    fn expect_item_slot(&self) -> Result<(), Error> {
        let group = self.stack.last().expect("stack underflow");
        if group.is_empty() || self.needs_item {
            Ok(())
        } else {
            Err(Error::BuilderMisuse(
                "conditions must be joined with and()/or()".to_string(),
            ))
        }
    }

    fn push_item(&mut self, node: Node) {
        let group = self.stack.last_mut().expect("stack underflow");
        group.push(node);
        self.needs_item = false;
    }

    // ---- comparison terminators -----------------------------------------

    /// Equals.
    pub fn eq(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Eq, value.into())
    }

    /// Not equals.
    pub fn ne(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Ne, value.into())
    }

    /// Greater than.
    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Gt, value.into())
    }

    /// Greater than or equal.
    pub fn ge(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Ge, value.into())
    }

    /// Less than.
    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Lt, value.into())
    }

    /// Less than or equal.
    pub fn le(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Le, value.into())
    }

    /// SQL LIKE match.
    pub fn like(self, value: impl Into<Value>) -> Self {
        self.compare(CompareOp::Like, value.into())
    }

    fn compare(mut self, op: CompareOp, value: Value) -> Self {
        if self.state != BuilderState::PredicateLeaf {
            return self.misuse("comparison without a preceding column()/sql()");
        }
        let pieces = std::mem::take(&mut self.leaf);
        self.push_item(Node::Leaf(Leaf { pieces, op, value }));
        self.state = BuilderState::Predicate;
        self
    }

    // ---- ordering -------------------------------------------------------

    /// Start the ordering list; subsequent `column()` calls append
    /// ascending sort keys, with the primary key as the final tiebreak.
    pub fn order_by(mut self) -> Self {
        if let Err(err) = self.finish_predicate() {
            return self.fail(err);
        }
        self.state = BuilderState::Ordering;
        self.scope = None;
        self
    }

    /// Like [`QueryBuilder::order_by`], declaring the stable sort key that
    /// pagination windows by. Mandatory when a page window is combined
    /// with a to-many eager load.
    pub fn paged_order_by(mut self) -> Self {
        if self.page.is_none() {
            return self.misuse("paged_order_by() requires paged_select()");
        }
        self.paged_order = true;
        self.order_by()
    }

    fn finish_predicate(&mut self) -> Result<(), Error> {
        match self.state {
            BuilderState::Selected | BuilderState::Predicate => {}
            _ => {
                return Err(Error::BuilderMisuse(
                    "ordering must follow select() or a completed predicate".to_string(),
                ))
            }
        }
        if self.needs_item {
            return Err(Error::BuilderMisuse(
                "and()/or() must be followed by a condition".to_string(),
            ));
        }
        if self.stack.len() != 1 {
            return Err(Error::BuilderMisuse(
                "unclosed predicate group".to_string(),
            ));
        }
        Ok(())
    }

    // ---- terminals ------------------------------------------------------

    /// Run the query and map every row.
    pub fn exec(mut self) -> Result<Vec<T>, Error> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }
        if self.page.is_some() {
            return Err(Error::BuilderMisuse(
                "paged_select() must terminate with exec_for_page()".to_string(),
            ));
        }
        let (sql, params, plan) = self.prepare()?;
        debug!(sql = %sql, params = params.len(), "executing select");
        let rows = self.orm.connector().query(&sql, &params)?;
        map_rows::<T>(&rows, &plan)
    }

    /// Run the query expecting at most one distinct root entity.
    pub fn exec_for_entity(self) -> Result<Option<T>, Error> {
        let mut items = self.exec()?;
        match items.len() {
            0 => Ok(None),
            1 => Ok(items.pop()),
            count => Err(Error::NotUniqueResult { count }),
        }
    }

    /// Run the paged query: count distinct roots, window the root keys,
    /// then eager-expand exactly those roots.
    pub fn exec_for_page(mut self) -> Result<Page<T>, Error> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }
        let page = match self.page {
            Some(page) => page,
            None => {
                return Err(Error::BuilderMisuse(
                    "exec_for_page() requires paged_select()".to_string(),
                ));
            }
        };
        if self.plan.has_many_join() && !self.paged_order {
            return Err(Error::AmbiguousPagination);
        }
        let (_, where_params, plan) = self.prepare()?;
        let orm = self.orm;

        // Phase 1: total distinct roots, independent of join fan-out.
        let count_sql = self.render_count();
        debug!(sql = %count_sql, "counting page roots");
        let rows = orm.connector().query(&count_sql, &where_params)?;
        let total = rows
            .first()
            .and_then(|row| row.get("total"))
            .and_then(Value::as_i64)
            .unwrap_or(0) as u64;

        // Phase 2: only the root keys falling inside the window.
        let keys_sql = self.render_key_window();
        let mut key_params = where_params;
        key_params.push(Value::Int64(page.size));
        key_params.push(Value::Int64(page.offset()));
        debug!(sql = %keys_sql, "windowing page roots");
        let key_column = format!("t0_{}", plan.root_meta.key().name);
        let keys: Vec<i64> = orm
            .connector()
            .query(&keys_sql, &key_params)?
            .iter()
            .filter_map(|row| row.get(&key_column).and_then(Value::as_i64))
            .collect();

        if keys.is_empty() {
            return Ok(Page::new(Vec::new(), page.page, page.size, total));
        }

        // Phase 3: eager-expand exactly the windowed roots, so a page
        // boundary can never split a parent's children.
        let expand_sql = self.render_key_expansion(keys.len());
        let expand_params: Vec<Value> = keys.into_iter().map(Value::Int64).collect();
        debug!(sql = %expand_sql, "expanding page roots");
        let rows = orm.connector().query(&expand_sql, &expand_params)?;
        let items = map_rows::<T>(&rows, &plan)?;
        Ok(Page::new(items, page.page, page.size, total))
    }

    /// Validate the finished chain and render the main statement.
    fn prepare(&mut self) -> Result<(String, Vec<Value>, JoinPlan), Error> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }
        match self.state {
            BuilderState::Created => {
                return Err(Error::BuilderMisuse(
                    "select() was never called".to_string(),
                ))
            }
            BuilderState::PredicateLeaf => {
                return Err(Error::BuilderMisuse(
                    "condition is missing its comparison".to_string(),
                ))
            }
            // The predicate was already validated when ordering started.
            BuilderState::Ordering => {}
            BuilderState::Selected | BuilderState::Predicate => self.finish_predicate()?,
        }

        let mut sql = String::from("SELECT ");
        self.render_projection(&mut sql);
        self.render_from(&mut sql);
        let mut params = Vec::new();
        self.render_where(&mut sql, &mut params);
        self.render_order(&mut sql);
        Ok((sql, params, self.plan.clone()))
    }

    fn render_projection(&self, sql: &mut String) {
        let mut first = true;
        let mut push = |sql: &mut String, alias: &str, column: &str| {
            if !first {
                sql.push_str(", ");
            }
            first = false;
            sql.push_str(&format!("{alias}.{column} AS {alias}_{column}"));
        };
        for column in self.plan.root_meta.select_columns() {
            push(sql, "t0", column);
        }
        for dynamic in &self.plan.dynamic {
            push(sql, "t0", dynamic.name());
        }
        for node in &self.plan.nodes {
            for column in node.meta().select_columns() {
                push(sql, &node.alias, column);
            }
        }
    }

    fn render_from(&self, sql: &mut String) {
        sql.push_str(" FROM ");
        sql.push_str(self.plan.root_meta.table());
        sql.push_str(" t0");
        self.plan.render_joins(sql);
    }

    fn render_where(&self, sql: &mut String, params: &mut Vec<Value>) {
        let group = self.stack.first().expect("stack underflow");
        if !group.is_empty() {
            sql.push_str(" WHERE ");
            group.render(sql, params);
        }
    }

    fn render_order(&self, sql: &mut String) {
        if self.order.is_empty() {
            return;
        }
        sql.push_str(" ORDER BY ");
        for (i, key) in self.order.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&format!("{}.{} ASC", key.alias, key.column));
        }
        // Deterministic tiebreak on the root key.
        let pk = &self.plan.root_meta.key().name;
        if !self
            .order
            .iter()
            .any(|k| k.alias == "t0" && &k.column == pk)
        {
            sql.push_str(&format!(", t0.{pk} ASC"));
        }
    }

    fn render_count(&self) -> String {
        let pk = &self.plan.root_meta.key().name;
        let mut sql = format!("SELECT COUNT(DISTINCT t0.{pk}) AS total");
        self.render_from(&mut sql);
        let mut ignored = Vec::new();
        self.render_where(&mut sql, &mut ignored);
        sql
    }

    fn render_key_window(&self) -> String {
        let pk = &self.plan.root_meta.key().name;
        let mut sql = format!("SELECT DISTINCT t0.{pk} AS t0_{pk}");
        for key in &self.order {
            if &key.column != pk {
                sql.push_str(&format!(", {0}.{1} AS {0}_{1}", key.alias, key.column));
            }
        }
        self.render_from(&mut sql);
        let mut ignored = Vec::new();
        self.render_where(&mut sql, &mut ignored);
        // The window must be totally ordered even without declared sort
        // keys, or page membership depends on backend row order.
        if self.order.is_empty() {
            sql.push_str(&format!(" ORDER BY t0.{pk} ASC"));
        } else {
            self.render_order(&mut sql);
        }
        sql.push_str(" LIMIT ? OFFSET ?");
        sql
    }

    fn render_key_expansion(&self, key_count: usize) -> String {
        let pk = &self.plan.root_meta.key().name;
        let mut sql = String::from("SELECT ");
        self.render_projection(&mut sql);
        self.render_from(&mut sql);
        sql.push_str(&format!(" WHERE t0.{pk} IN ("));
        for i in 0..key_count {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
        }
        sql.push(')');
        // Keep the expansion in the same order the window selected.
        if self.order.is_empty() {
            sql.push_str(&format!(" ORDER BY t0.{pk} ASC"));
        } else {
            self.render_order(&mut sql);
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::MetaRegistry;
    use crate::testkit::{car_registry, CarManufacturer, CarModel, MockConnector};
    use std::sync::Arc;

    fn orm_with(connector: Arc<MockConnector>) -> Orm {
        Orm::new(connector, Arc::new(car_registry()))
    }

    fn empty_result(connector: &MockConnector) {
        connector.expect_query(vec!["t0_id", "t0_name", "t0_kind", "t0_manufacturer_id"], vec![]);
    }

    #[test]
    fn test_plain_select_sql() {
        let connector = Arc::new(MockConnector::new());
        empty_result(&connector);
        let orm = orm_with(connector.clone());

        orm.query::<CarModel>()
            .select()
            .order_by()
            .column("name")
            .exec()
            .unwrap();

        let (sql, params) = connector.last_query().unwrap();
        assert_eq!(
            sql,
            "SELECT t0.id AS t0_id, t0.name AS t0_name, t0.kind AS t0_kind, \
             t0.manufacturer_id AS t0_manufacturer_id FROM CarModels t0 \
             ORDER BY t0.name ASC, t0.id ASC"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_eager_select_sql() {
        let connector = Arc::new(MockConnector::new());
        connector.expect_query(vec!["t0_id"], vec![]);
        let orm = orm_with(connector.clone());

        orm.query::<CarModel>()
            .select_with(&[EagerPath::to::<CarManufacturer>()])
            .exec()
            .unwrap();

        let (sql, _) = connector.last_query().unwrap();
        assert!(sql.contains("LEFT JOIN CarManufacturers t1 ON t0.manufacturer_id = t1.id"));
        assert!(sql.contains("t1.name AS t1_name"));
    }

    #[test]
    fn test_predicate_sql_and_param_order() {
        let connector = Arc::new(MockConnector::new());
        connector.expect_query(vec!["t0_id"], vec![]);
        let orm = orm_with(connector.clone());

        orm.query::<CarModel>()
            .select_with(&[EagerPath::to::<CarManufacturer>()])
            .filter()
            .column("name")
            .eq("cx3")
            .and()
            .alias::<CarManufacturer>()
            .sql("upper(")
            .column("name")
            .sql(")")
            .eq("MAZDA")
            .and()
            .root_alias()
            .id()
            .gt(0i64)
            .exec()
            .unwrap();

        let (sql, params) = connector.last_query().unwrap();
        assert!(sql.contains(
            "WHERE t0.name = ? AND upper(t1.name) = ? AND t0.id > ?"
        ));
        assert_eq!(
            params,
            vec![
                Value::Text("cx3".into()),
                Value::Text("MAZDA".into()),
                Value::Int64(0)
            ]
        );
    }

    #[test]
    fn test_upper_column_sql() {
        let connector = Arc::new(MockConnector::new());
        connector.expect_query(vec!["t0_id"], vec![]);
        let orm = orm_with(connector.clone());

        orm.query::<CarModel>()
            .select()
            .filter()
            .upper_column("name")
            .eq("CRV")
            .exec()
            .unwrap();

        let (sql, _) = connector.last_query().unwrap();
        assert!(sql.contains("WHERE upper(t0.name) = ?"));
    }

    #[test]
    fn test_grouping_sql() {
        let connector = Arc::new(MockConnector::new());
        connector.expect_query(vec!["t0_id"], vec![]);
        let orm = orm_with(connector.clone());

        orm.query::<CarModel>()
            .select()
            .filter()
            .column("kind")
            .eq("suv")
            .and()
            .open()
            .column("name")
            .eq("crv")
            .or()
            .column("name")
            .eq("cx3")
            .close()
            .exec()
            .unwrap();

        let (sql, _) = connector.last_query().unwrap();
        assert!(sql.contains("WHERE t0.kind = ? AND (t0.name = ? OR t0.name = ?)"));
    }

    #[test]
    fn test_mixed_connectives_fail_before_io() {
        let connector = Arc::new(MockConnector::new());
        let orm = orm_with(connector.clone());

        let err = orm
            .query::<CarModel>()
            .select()
            .filter()
            .column("name")
            .eq("a")
            .and()
            .column("kind")
            .eq("car")
            .or()
            .column("name")
            .eq("b")
            .exec()
            .unwrap_err();

        assert!(matches!(err, Error::AmbiguousPrecedence));
        assert_eq!(connector.query_count(), 0);
    }

    #[test]
    fn test_unknown_column_fails_before_io() {
        let connector = Arc::new(MockConnector::new());
        let orm = orm_with(connector.clone());

        let err = orm
            .query::<CarModel>()
            .select()
            .filter()
            .column("colour")
            .eq("red")
            .exec()
            .unwrap_err();

        assert!(matches!(err, Error::UnknownColumn { .. }));
        assert_eq!(connector.query_count(), 0);
    }

    #[test]
    fn test_state_machine_rejects_bad_sequences() {
        let connector = Arc::new(MockConnector::new());
        let orm = orm_with(connector.clone());

        // Comparator without a column.
        let err = orm
            .query::<CarModel>()
            .select()
            .filter()
            .eq("x")
            .exec()
            .unwrap_err();
        assert!(matches!(err, Error::BuilderMisuse(_)));

        // Dangling column without a comparator.
        let err = orm
            .query::<CarModel>()
            .select()
            .filter()
            .column("name")
            .exec()
            .unwrap_err();
        assert!(matches!(err, Error::BuilderMisuse(_)));

        // Missing connective between conditions.
        let err = orm
            .query::<CarModel>()
            .select()
            .filter()
            .column("name")
            .eq("a")
            .column("kind")
            .eq("car")
            .exec()
            .unwrap_err();
        assert!(matches!(err, Error::BuilderMisuse(_)));

        // Terminal without select().
        let err = orm.query::<CarModel>().exec().unwrap_err();
        assert!(matches!(err, Error::BuilderMisuse(_)));

        assert_eq!(connector.query_count(), 0);
    }

    #[test]
    fn test_alias_requires_a_join() {
        let connector = Arc::new(MockConnector::new());
        let orm = orm_with(connector.clone());

        let err = orm
            .query::<CarModel>()
            .select()
            .filter()
            .alias::<CarManufacturer>()
            .column("name")
            .eq("Mazda")
            .exec()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidEagerPath(_)));
    }

    #[test]
    fn test_exec_for_entity_not_unique() {
        let connector = Arc::new(MockConnector::new());
        connector.expect_query(
            vec!["t0_id", "t0_name", "t0_kind", "t0_manufacturer_id"],
            vec![
                vec![
                    Value::Int64(1),
                    Value::Text("mx5".into()),
                    Value::Text("car".into()),
                    Value::Null,
                ],
                vec![
                    Value::Int64(2),
                    Value::Text("mx5".into()),
                    Value::Text("car".into()),
                    Value::Null,
                ],
            ],
        );
        let orm = orm_with(connector);

        let err = orm
            .query::<CarModel>()
            .select()
            .filter()
            .column("name")
            .eq("mx5")
            .exec_for_entity()
            .unwrap_err();
        assert!(matches!(err, Error::NotUniqueResult { count: 2 }));
    }

    #[test]
    fn test_exec_for_entity_empty_is_none() {
        let connector = Arc::new(MockConnector::new());
        empty_result(&connector);
        let orm = orm_with(connector);

        let found = orm
            .query::<CarModel>()
            .select()
            .filter()
            .column("name")
            .eq("nope")
            .exec_for_entity()
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_invalid_page_window() {
        let connector = Arc::new(MockConnector::new());
        let orm = orm_with(connector.clone());

        let err = orm
            .query::<CarModel>()
            .paged_select(0, 5)
            .exec_for_page()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPage { page: 0, size: 5 }));
        assert_eq!(connector.query_count(), 0);
    }

    #[test]
    fn test_pagination_over_fanout_requires_paged_order() {
        let connector = Arc::new(MockConnector::new());
        let orm = orm_with(connector.clone());

        let err = orm
            .query::<CarManufacturer>()
            .paged_select_with(1, 3, &[EagerPath::to::<CarModel>()])
            .exec_for_page()
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousPagination));
        assert_eq!(connector.query_count(), 0);
    }

    #[test]
    fn test_paged_exec_three_phases() {
        let connector = Arc::new(MockConnector::new());
        // Phase 1: count.
        connector.expect_query(vec!["total"], vec![vec![Value::Int64(2)]]);
        // Phase 2: windowed root keys.
        connector.expect_query(
            vec!["t0_id", "t0_name"],
            vec![
                vec![Value::Int64(2), Value::Text("Honda".into())],
                vec![Value::Int64(1), Value::Text("Mazda".into())],
            ],
        );
        // Phase 3: expansion with children.
        connector.expect_query(
            vec![
                "t0_id",
                "t0_name",
                "t1_id",
                "t1_name",
                "t1_kind",
                "t1_manufacturer_id",
            ],
            vec![
                vec![
                    Value::Int64(2),
                    Value::Text("Honda".into()),
                    Value::Int64(5),
                    Value::Text("accord".into()),
                    Value::Text("car".into()),
                    Value::Int64(2),
                ],
                vec![
                    Value::Int64(2),
                    Value::Text("Honda".into()),
                    Value::Int64(6),
                    Value::Text("civic".into()),
                    Value::Text("car".into()),
                    Value::Int64(2),
                ],
                vec![
                    Value::Int64(1),
                    Value::Text("Mazda".into()),
                    Value::Int64(1),
                    Value::Text("mx5".into()),
                    Value::Text("car".into()),
                    Value::Int64(1),
                ],
            ],
        );
        let orm = orm_with(connector.clone());

        let page = orm
            .query::<CarManufacturer>()
            .paged_select_with(1, 3, &[EagerPath::to::<CarModel>()])
            .paged_order_by()
            .column("name")
            .exec_for_page()
            .unwrap();

        assert_eq!(page.total(), 2);
        assert_eq!(page.items().len(), 2);
        assert_eq!(page.items()[0].name, "Honda");
        assert_eq!(page.items()[0].models.items().unwrap().len(), 2);

        let statements = connector.queries();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].0.starts_with("SELECT COUNT(DISTINCT t0.id) AS total"));
        assert!(statements[1].0.contains("SELECT DISTINCT t0.id AS t0_id"));
        assert!(statements[1].0.ends_with("LIMIT ? OFFSET ?"));
        assert_eq!(statements[1].1, vec![Value::Int64(3), Value::Int64(0)]);
        assert!(statements[2].0.contains("WHERE t0.id IN (?, ?)"));
    }

    #[test]
    fn test_paged_chain_rejects_plain_exec() {
        let connector = Arc::new(MockConnector::new());
        let orm = orm_with(connector.clone());

        let err = orm
            .query::<CarModel>()
            .paged_select(1, 2)
            .exec()
            .unwrap_err();
        assert!(matches!(err, Error::BuilderMisuse(_)));

        let err = orm
            .query::<CarModel>()
            .paged_select(1, 2)
            .exec_for_entity()
            .unwrap_err();
        assert!(matches!(err, Error::BuilderMisuse(_)));

        assert_eq!(connector.query_count(), 0);
    }

    #[test]
    fn test_unordered_page_window_is_keyed() {
        let connector = Arc::new(MockConnector::new());
        connector.expect_query(vec!["total"], vec![vec![Value::Int64(3)]]);
        connector.expect_query(
            vec!["t0_id"],
            vec![vec![Value::Int64(1)], vec![Value::Int64(2)]],
        );
        connector.expect_query(
            vec!["t0_id", "t0_name", "t0_kind", "t0_manufacturer_id"],
            vec![
                vec![
                    Value::Int64(1),
                    Value::Text("mx5".into()),
                    Value::Text("car".into()),
                    Value::Null,
                ],
                vec![
                    Value::Int64(2),
                    Value::Text("cx3".into()),
                    Value::Text("suv".into()),
                    Value::Null,
                ],
            ],
        );
        let orm = orm_with(connector.clone());

        let page = orm
            .query::<CarModel>()
            .paged_select(1, 2)
            .exec_for_page()
            .unwrap();
        assert_eq!(page.total(), 3);
        assert_eq!(page.items().len(), 2);

        // No order_by() in the chain, yet both key statements still sort.
        let statements = connector.queries();
        assert!(statements[1]
            .0
            .ends_with("ORDER BY t0.id ASC LIMIT ? OFFSET ?"));
        assert!(statements[2].0.ends_with("ORDER BY t0.id ASC"));
    }

    #[test]
    fn test_unregistered_type_fails_at_terminal() {
        let connector = Arc::new(MockConnector::new());
        let registry = MetaRegistry::builder().build().unwrap();
        let orm = Orm::new(connector, Arc::new(registry));

        let err = orm.query::<CarModel>().select().exec().unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(_)));
    }
}
