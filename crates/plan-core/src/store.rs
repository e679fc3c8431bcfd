//! Last-write-wins state caches.
//!
//! A [`StateStore`] maps an entity key to the latest value seen for it.
//! Entries are created on the first event for a key, overwritten by every
//! later one and never removed for the life of the process.
//!
//! Reads and writes go through a [`RwLock`] held only for the map
//! operation itself, so a reader sees either the old or the new value and
//! nothing in between. [`StateStore::snapshot`] copies the whole map out
//! under the read lock; the copy may be stale by the time a session sends
//! it, which is fine because the session is already subscribed to the bus
//! and will receive anything newer.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use plan_types::{DoorId, Event};

/// A concurrency-safe last-write-wins map for one entity category.
#[derive(Debug)]
pub struct StateStore<K, V> {
    entries: RwLock<BTreeMap<K, V>>,
}

impl<K: Ord, V> Default for StateStore<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K: Ord + Clone, V: Clone> StateStore<K, V> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the latest value for `key`, if one has been observed.
    pub fn get(&self, key: &K) -> Option<V> {
        self.read().get(key).cloned()
    }

    /// Record `value` as the latest for `key`, returning the previous value.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        self.write().insert(key, value)
    }

    /// Copy out every entry as of now, ordered by key.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of keys observed so far.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no key has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Poison is ignored: BTreeMap::insert either completed or did not run.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<K, V>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<K, V>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The full set of caches, one per entity category.
///
/// Constructed once at startup and shared by handle with the ingestion
/// adapters (writers) and the viewer sessions (readers).
#[derive(Debug, Default)]
pub struct StateStores {
    /// Latest state string per door.
    pub doors: StateStore<DoorId, String>,
    /// Latest reading per temperature sensor location.
    pub temperatures: StateStore<String, f64>,
}

impl StateStores {
    /// Create an empty set of stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Render every cached entry as a synthetic event.
    ///
    /// Doors come first, then temperatures, each ordered by key. Button
    /// presses are never cached so they never appear here.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let doors = self
            .doors
            .snapshot()
            .into_iter()
            .map(|(door_id, value)| Event::DoorState { door_id, value });
        let temperatures = self
            .temperatures
            .snapshot()
            .into_iter()
            .map(|(location, reading)| Event::Temperature { location, reading });
        doors.chain(temperatures).collect()
    }
}
