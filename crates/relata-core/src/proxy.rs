//! Lazy placeholders for relation values.
//!
//! Relation fields hold a tagged state rather than a subclassed proxy
//! object: unloaded states carry just enough identity to fetch later, and
//! the first access swaps the real value in place. Transitions are
//! monotonic under a `parking_lot` lock, so two threads racing on the same
//! proxy may fetch twice but can never observe a half-loaded value.

use crate::entity::Entity;
use crate::error::Error;
use crate::orm::Orm;
use crate::value::Value;
use parking_lot::RwLock;
use std::sync::Arc;

enum LazyState<T> {
    /// The foreign key was NULL; there is nothing to load.
    Absent,
    /// A proxy holding the target's primary key; no I/O performed yet.
    Unloaded(i64),
    /// A proxy that has materialized; keeps reporting `is_proxy() == true`.
    Materialized(Arc<T>),
    /// A value that was never a proxy: eager-loaded or caller-assigned.
    Loaded(Arc<T>),
}

/// A to-one relation value: either a loaded entity or a deferred lookup.
pub struct Lazy<T: Entity> {
    state: RwLock<LazyState<T>>,
}

impl<T: Entity> Lazy<T> {
    /// A relation with no target (NULL foreign key).
    pub fn absent() -> Self {
        Self {
            state: RwLock::new(LazyState::Absent),
        }
    }

    /// An unloaded proxy for the row with the given key. No I/O happens
    /// until [`Lazy::load`].
    pub fn unloaded(key: i64) -> Self {
        Self {
            state: RwLock::new(LazyState::Unloaded(key)),
        }
    }

    /// A fully loaded value; reports `is_proxy() == false`.
    pub fn loaded(value: T) -> Self {
        Self {
            state: RwLock::new(LazyState::Loaded(Arc::new(value))),
        }
    }

    /// Reference an already persisted entity by its key without holding it.
    ///
    /// Fails the caller fast when the target is still transient, since a
    /// foreign key cannot point at an unsaved row.
    pub fn reference(target: &T) -> Result<Self, Error> {
        match target.key() {
            Some(key) => Ok(Self::unloaded(key)),
            None => Err(Error::BuilderMisuse(format!(
                "cannot reference a transient `{}` entity",
                T::meta().table()
            ))),
        }
    }

    /// The target's primary key, whatever the load state.
    pub fn key(&self) -> Option<i64> {
        match &*self.state.read() {
            LazyState::Absent => None,
            LazyState::Unloaded(key) => Some(*key),
            LazyState::Materialized(v) | LazyState::Loaded(v) => v.key(),
        }
    }

    /// The foreign key value this relation persists as.
    pub fn key_value(&self) -> Value {
        self.key().map(Value::Int64).unwrap_or(Value::Null)
    }

    /// Check for a NULL relation.
    pub fn is_absent(&self) -> bool {
        matches!(&*self.state.read(), LazyState::Absent)
    }

    /// Check whether this value is (or started as) a proxy.
    pub fn is_proxy(&self) -> bool {
        matches!(
            &*self.state.read(),
            LazyState::Unloaded(_) | LazyState::Materialized(_)
        )
    }

    /// Check whether the target entity is in memory.
    pub fn is_loaded(&self) -> bool {
        matches!(
            &*self.state.read(),
            LazyState::Materialized(_) | LazyState::Loaded(_)
        )
    }

    /// The loaded value, without performing I/O.
    pub fn get(&self) -> Option<Arc<T>> {
        match &*self.state.read() {
            LazyState::Materialized(v) | LazyState::Loaded(v) => Some(Arc::clone(v)),
            _ => None,
        }
    }

    /// Assign a loaded value, discarding any proxy state.
    pub fn set(&mut self, value: T) {
        *self.state.get_mut() = LazyState::Loaded(Arc::new(value));
    }

    /// Resolve the relation, fetching the target row on first access.
    ///
    /// Exactly one row fetch happens per unloaded proxy (barring a
    /// concurrent race, where the loser's fetch is discarded). Fails with
    /// [`Error::EntityNotFound`] when the referenced row no longer exists.
    /// Returns `None` only for [`Lazy::absent`] relations.
    pub fn load(&self, orm: &Orm) -> Result<Option<Arc<T>>, Error> {
        let key = match &*self.state.read() {
            LazyState::Absent => return Ok(None),
            LazyState::Materialized(v) | LazyState::Loaded(v) => {
                return Ok(Some(Arc::clone(v)));
            }
            LazyState::Unloaded(key) => *key,
        };

        tracing::debug!(table = T::meta().table(), key, "materializing proxy");
        let fetched = orm.find::<T>(key)?.ok_or_else(|| Error::EntityNotFound {
            table: T::meta().table().to_string(),
            key,
        })?;
        let fetched = Arc::new(fetched);

        let mut state = self.state.write();
        match &*state {
            // Keep the winner of a materialization race.
            LazyState::Materialized(v) | LazyState::Loaded(v) => Ok(Some(Arc::clone(v))),
            _ => {
                *state = LazyState::Materialized(Arc::clone(&fetched));
                Ok(Some(fetched))
            }
        }
    }
}

impl<T: Entity> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        let state = match &*self.state.read() {
            LazyState::Absent => LazyState::Absent,
            LazyState::Unloaded(key) => LazyState::Unloaded(*key),
            LazyState::Materialized(v) => LazyState::Materialized(Arc::clone(v)),
            LazyState::Loaded(v) => LazyState::Loaded(Arc::clone(v)),
        };
        Self {
            state: RwLock::new(state),
        }
    }
}

impl<T: Entity> std::fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.state.read() {
            LazyState::Absent => write!(f, "Lazy::Absent"),
            LazyState::Unloaded(key) => write!(f, "Lazy::Unloaded({key})"),
            LazyState::Materialized(v) => write!(f, "Lazy::Materialized(key={:?})", v.key()),
            LazyState::Loaded(v) => write!(f, "Lazy::Loaded(key={:?})", v.key()),
        }
    }
}

enum ChildrenState<T> {
    /// Collection not yet fetched; keyed by the owning row.
    Unloaded { fk_column: String, parent: i64 },
    /// Collection in memory, in first-seen row order.
    Loaded(Vec<Arc<T>>),
}

/// A to-many relation value: an ordered, possibly deferred collection.
pub struct Children<T: Entity> {
    state: RwLock<ChildrenState<T>>,
}

impl<T: Entity> Children<T> {
    /// An empty, loaded collection (for freshly built parents).
    pub fn empty() -> Self {
        Self {
            state: RwLock::new(ChildrenState::Loaded(Vec::new())),
        }
    }

    /// An unloaded collection for the given parent key; `fk_column` is the
    /// column on `T`'s table pointing back at the parent.
    pub fn unloaded(fk_column: impl Into<String>, parent: i64) -> Self {
        Self {
            state: RwLock::new(ChildrenState::Unloaded {
                fk_column: fk_column.into(),
                parent,
            }),
        }
    }

    /// A loaded collection with the given items.
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            state: RwLock::new(ChildrenState::Loaded(
                items.into_iter().map(Arc::new).collect(),
            )),
        }
    }

    /// Check whether the collection is in memory.
    pub fn is_loaded(&self) -> bool {
        matches!(&*self.state.read(), ChildrenState::Loaded(_))
    }

    /// The loaded items, without performing I/O.
    pub fn items(&self) -> Option<Vec<Arc<T>>> {
        match &*self.state.read() {
            ChildrenState::Loaded(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// Resolve the collection, fetching the child rows on first access.
    ///
    /// Children come back ordered by their primary key.
    pub fn load(&self, orm: &Orm) -> Result<Vec<Arc<T>>, Error> {
        let (fk_column, parent) = match &*self.state.read() {
            ChildrenState::Loaded(items) => return Ok(items.clone()),
            ChildrenState::Unloaded { fk_column, parent } => (fk_column.clone(), *parent),
        };

        tracing::debug!(
            table = T::meta().table(),
            parent,
            "materializing child collection"
        );
        let fetched: Vec<Arc<T>> = orm
            .load_children::<T>(&fk_column, parent)?
            .into_iter()
            .map(Arc::new)
            .collect();

        let mut state = self.state.write();
        match &*state {
            ChildrenState::Loaded(items) => Ok(items.clone()),
            _ => {
                *state = ChildrenState::Loaded(fetched.clone());
                Ok(fetched)
            }
        }
    }

    /// Absorb another (loaded) collection produced by join fan-out,
    /// skipping children whose key is already present.
    ///
    /// No-op when either side is unloaded.
    pub fn absorb(&self, other: Children<T>) {
        let incoming = match other.state.into_inner() {
            ChildrenState::Loaded(items) => items,
            ChildrenState::Unloaded { .. } => return,
        };
        let mut state = self.state.write();
        if let ChildrenState::Loaded(items) = &mut *state {
            for child in incoming {
                let key = child.key();
                if key.is_none() || !items.iter().any(|c| c.key() == key) {
                    items.push(child);
                }
            }
        }
    }
}

impl<T: Entity> Default for Children<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Entity> Clone for Children<T> {
    fn clone(&self) -> Self {
        let state = match &*self.state.read() {
            ChildrenState::Unloaded { fk_column, parent } => ChildrenState::Unloaded {
                fk_column: fk_column.clone(),
                parent: *parent,
            },
            ChildrenState::Loaded(items) => ChildrenState::Loaded(items.clone()),
        };
        Self {
            state: RwLock::new(state),
        }
    }
}

impl<T: Entity> std::fmt::Debug for Children<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.state.read() {
            ChildrenState::Unloaded { parent, .. } => write!(f, "Children::Unloaded({parent})"),
            ChildrenState::Loaded(items) => write!(f, "Children::Loaded(len={})", items.len()),
        }
    }
}
