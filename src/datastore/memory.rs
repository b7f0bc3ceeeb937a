//! Process-local datastore with optimistic transactions.
//!
//! Every write bumps a per-key version taken from a store-wide counter.
//! Versions survive deletion, so "absent" observed before a concurrent
//! insert-then-delete still counts as a conflict.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{compare_values, Datastore, Direction, Entity, Key, KeyId, Kind, Query, StoreError, Transaction};

#[derive(Debug, Default)]
struct State {
    entities: BTreeMap<Key, Entity>,
    versions: HashMap<Key, u64>,
    clock: u64,
    next_id: i64,
}

impl State {
    fn version(&self, key: &Key) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: &Key) {
        self.clock += 1;
        self.versions.insert(key.clone(), self.clock);
    }

    fn complete(&mut self, key: Key) -> Key {
        match key.id {
            KeyId::Incomplete => {
                self.next_id += 1;
                Key::with_id(key.kind, self.next_id)
            }
            _ => key,
        }
    }

    fn write(&mut self, mut entity: Entity) -> Key {
        entity.key = self.complete(entity.key);
        let key = entity.key.clone();
        self.bump(&key);
        self.entities.insert(key.clone(), entity);
        key
    }

    fn remove(&mut self, key: &Key) {
        if self.entities.remove(key).is_some() {
            self.bump(key);
        }
    }
}

/// In-memory [`Datastore`]; clones share the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatastore {
    state: Arc<Mutex<State>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored entities of `kind`.
    pub fn count(&self, kind: Kind) -> usize {
        self.lock().entities.keys().filter(|k| k.kind == kind).count()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn get(&self, key: &Key) -> Result<Option<Entity>, StoreError> {
        key.require_complete("get")?;
        Ok(self.lock().entities.get(key).cloned())
    }

    async fn put(&self, entity: Entity) -> Result<Key, StoreError> {
        Ok(self.lock().write(entity))
    }

    async fn delete(&self, key: &Key) -> Result<(), StoreError> {
        key.require_complete("delete")?;
        self.lock().remove(key);
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Entity>, StoreError> {
        let state = self.lock();
        let mut found: Vec<Entity> = state
            .entities
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        drop(state);

        if let Some(order) = &query.order {
            found.sort_by(|a, b| {
                let ord = compare_values(
                    a.properties.get(&order.field),
                    b.properties.get(&order.field),
                );
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        let offset = usize::try_from(query.offset).unwrap_or(0);
        let limit = query
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(offset).take(limit).collect())
    }

    async fn transaction(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            observed: HashMap::new(),
            writes: Vec::new(),
        }))
    }
}

enum Write {
    Put(Entity),
    Delete(Key),
}

struct MemoryTransaction {
    store: MemoryDatastore,
    /// Version of each touched key at the moment it was first touched.
    observed: HashMap<Key, u64>,
    writes: Vec<Write>,
}

impl MemoryTransaction {
    fn observe(&mut self, key: &Key, state: &State) {
        if key.is_complete() && !self.observed.contains_key(key) {
            self.observed.insert(key.clone(), state.version(key));
        }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&mut self, key: &Key) -> Result<Option<Entity>, StoreError> {
        key.require_complete("get")?;
        let store = self.store.clone();
        let state = store.lock();
        self.observe(key, &state);
        Ok(state.entities.get(key).cloned())
    }

    async fn put(&mut self, entity: Entity) -> Result<(), StoreError> {
        let store = self.store.clone();
        let state = store.lock();
        self.observe(&entity.key, &state);
        drop(state);
        self.writes.push(Write::Put(entity));
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<(), StoreError> {
        key.require_complete("delete")?;
        let store = self.store.clone();
        let state = store.lock();
        self.observe(key, &state);
        drop(state);
        self.writes.push(Write::Delete(key.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<Vec<Key>, StoreError> {
        let this = *self;
        let mut state = this.store.lock();
        if this
            .observed
            .iter()
            .any(|(key, seen)| state.version(key) != *seen)
        {
            return Err(StoreError::Aborted);
        }

        let mut keys = Vec::new();
        for write in this.writes {
            match write {
                Write::Put(entity) => keys.push(state.write(entity)),
                Write::Delete(key) => state.remove(&key),
            }
        }
        Ok(keys)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
