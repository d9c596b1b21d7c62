//! Eager-load paths and the join plan they resolve into.

use crate::dynamic::DynamicColumn;
use crate::entity::Entity;
use crate::error::Error;
use crate::meta::{Cardinality, FetchKind, TableMeta};
use std::any::TypeId;

/// One hop of an eager-load path.
#[derive(Debug, Clone, Copy)]
struct Hop {
    target_id: TypeId,
    label: &'static str,
}

/// A requested eager-load path: a chain of relations starting at the query
/// root, each hop identified by its target entity type.
///
/// Resolution against the metadata happens when the query is built; a hop
/// with no matching relation, or with more than one, fails with
/// [`Error::InvalidEagerPath`].
#[derive(Debug, Clone)]
pub struct EagerPath {
    hops: Vec<Hop>,
}

impl EagerPath {
    /// A single-hop path from the root to entity type `M`.
    pub fn to<M: Entity>() -> Self {
        Self {
            hops: vec![Hop {
                target_id: TypeId::of::<M>(),
                label: std::any::type_name::<M>(),
            }],
        }
    }

    /// Extend the path one hop further, to entity type `M`.
    pub fn then<M: Entity>(mut self) -> Self {
        self.hops.push(Hop {
            target_id: TypeId::of::<M>(),
            label: std::any::type_name::<M>(),
        });
        self
    }
}

/// One joined table in a select.
#[derive(Debug, Clone)]
pub(crate) struct JoinNode {
    /// Table alias, `t1` onwards (`t0` is the root).
    pub alias: String,
    /// Index of the parent join node; `None` when joined to the root.
    pub parent: Option<usize>,
    /// The relation this join resolves.
    pub relation: crate::meta::RelationDef,
}

impl JoinNode {
    pub(crate) fn meta(&self) -> &'static TableMeta {
        self.relation.target_meta()
    }
}

/// The resolved join plan for one query: root table plus one joined table
/// per covered relation, and the dynamic columns to project off the root.
#[derive(Debug, Clone)]
pub(crate) struct JoinPlan {
    pub root_meta: &'static TableMeta,
    pub root_id: TypeId,
    pub nodes: Vec<JoinNode>,
    pub dynamic: Vec<DynamicColumn>,
}

impl JoinPlan {
    /// A joinless plan over the root table alone.
    pub(crate) fn root<T: Entity>() -> Self {
        Self {
            root_meta: T::meta(),
            root_id: TypeId::of::<T>(),
            nodes: Vec::new(),
            dynamic: Vec::new(),
        }
    }

    /// Resolve the requested paths (plus metadata-declared eager relations)
    /// for root entity type `T`.
    pub(crate) fn build<T: Entity>(paths: &[EagerPath]) -> Result<Self, Error> {
        let mut plan = Self::root::<T>();

        // Relations declared FetchKind::Eager join in even without an
        // explicit path. The ancestor chain guards against relation cycles.
        plan.add_declared_eager(None, plan.root_meta, &mut vec![plan.root_id]);

        for path in paths {
            let mut parent: Option<usize> = None;
            let mut meta = plan.root_meta;
            for hop in &path.hops {
                let node = plan.resolve_hop(parent, meta, hop)?;
                meta = plan.nodes[node].meta();
                parent = Some(node);
            }
        }
        Ok(plan)
    }

    fn add_declared_eager(
        &mut self,
        parent: Option<usize>,
        meta: &'static TableMeta,
        ancestors: &mut Vec<TypeId>,
    ) {
        for relation in meta.relations() {
            if relation.fetch != FetchKind::Eager || ancestors.contains(&relation.target_id()) {
                continue;
            }
            let node = self.push_node(parent, relation.clone());
            ancestors.push(relation.target_id());
            self.add_declared_eager(Some(node), self.nodes[node].meta(), ancestors);
            ancestors.pop();
        }
    }

    fn resolve_hop(
        &mut self,
        parent: Option<usize>,
        meta: &'static TableMeta,
        hop: &Hop,
    ) -> Result<usize, Error> {
        let mut matches = meta
            .relations()
            .iter()
            .filter(|r| r.target_id() == hop.target_id);
        let relation = matches.next().ok_or_else(|| {
            Error::InvalidEagerPath(format!(
                "no relation from table `{}` to `{}`",
                meta.table(),
                hop.label
            ))
        })?;
        if matches.next().is_some() {
            return Err(Error::InvalidEagerPath(format!(
                "table `{}` has more than one relation to `{}`; paths cannot disambiguate",
                meta.table(),
                hop.label
            )));
        }

        // Shared prefixes (and declared-eager overlap) reuse the same join.
        if let Some(existing) = self.node_for(parent, &relation.fk_column) {
            return Ok(existing);
        }
        Ok(self.push_node(parent, relation.clone()))
    }

    fn push_node(&mut self, parent: Option<usize>, relation: crate::meta::RelationDef) -> usize {
        let alias = format!("t{}", self.nodes.len() + 1);
        self.nodes.push(JoinNode {
            alias,
            parent,
            relation,
        });
        self.nodes.len() - 1
    }

    /// The join covering `fk_column` under the given parent node, if any.
    pub(crate) fn node_for(&self, parent: Option<usize>, fk_column: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.parent == parent && n.relation.fk_column == fk_column)
    }

    /// Alias of a node (`None` selects the root alias).
    pub(crate) fn alias_of(&self, node: Option<usize>) -> &str {
        match node {
            None => "t0",
            Some(i) => &self.nodes[i].alias,
        }
    }

    /// Metadata of a node (`None` selects the root).
    pub(crate) fn meta_of(&self, node: Option<usize>) -> &'static TableMeta {
        match node {
            None => self.root_meta,
            Some(i) => self.nodes[i].meta(),
        }
    }

    /// Find the joined node for entity type id `id` (alias scoping).
    pub(crate) fn node_by_type(&self, id: TypeId, label: &str) -> Result<usize, Error> {
        self.nodes
            .iter()
            .position(|n| n.relation.target_id() == id)
            .ok_or_else(|| {
                Error::InvalidEagerPath(format!(
                    "`{label}` is not joined into this query; request it as an eager path first"
                ))
            })
    }

    /// Check whether any join fans root rows out (to-many cardinality).
    pub(crate) fn has_many_join(&self) -> bool {
        self.nodes
            .iter()
            .any(|n| n.relation.cardinality == Cardinality::Many)
    }

    /// Append the JOIN clauses to `sql`.
    pub(crate) fn render_joins(&self, sql: &mut String) {
        for node in &self.nodes {
            let parent_alias = self.alias_of(node.parent);
            let parent_meta = self.meta_of(node.parent);
            let child_meta = node.meta();
            sql.push_str(" LEFT JOIN ");
            sql.push_str(child_meta.table());
            sql.push(' ');
            sql.push_str(&node.alias);
            sql.push_str(" ON ");
            match node.relation.cardinality {
                // FK on the owning (parent) table.
                Cardinality::One => {
                    sql.push_str(&format!(
                        "{parent_alias}.{} = {}.{}",
                        node.relation.fk_column,
                        node.alias,
                        child_meta.key().name
                    ));
                }
                // FK on the child table, pointing back at the parent.
                Cardinality::Many => {
                    sql.push_str(&format!(
                        "{}.{} = {parent_alias}.{}",
                        node.alias,
                        node.relation.fk_column,
                        parent_meta.key().name
                    ));
                }
            }
        }
    }
}
