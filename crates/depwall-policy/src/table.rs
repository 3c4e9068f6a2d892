//! Lock-free copy-on-write table with hot-swapping
//!
//! Readers load the current snapshot without blocking. Writers are
//! serialized, clone the snapshot, mutate the clone and swap it in, so a
//! concurrent reader observes either the old or the new map, never a mix.

use arc_swap::ArcSwap;
use depwall_common::{DepwallError, DepwallResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed-capacity copy-on-write map
pub(crate) struct CowTable<K, V> {
    /// Table name (for errors and logs)
    name: &'static str,
    /// Current entries (atomically swappable)
    entries: ArcSwap<HashMap<K, V>>,
    /// Serializes writers; never taken on the read path
    writer: Mutex<()>,
    /// Hard capacity
    capacity: usize,
    /// Bumped on every effective mutation
    version: AtomicU64,
}

impl<K, V> CowTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    pub(crate) fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            entries: ArcSwap::from_pointee(HashMap::new()),
            writer: Mutex::new(()),
            capacity,
            version: AtomicU64::new(0),
        }
    }

    #[inline(always)]
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.entries.load().get(key).cloned()
    }

    /// Insert or replace. A new key beyond capacity is rejected; replacing
    /// an existing key always succeeds.
    pub(crate) fn insert(&self, key: K, value: V) -> DepwallResult<Option<V>> {
        let _guard = self.writer.lock();
        let current = self.entries.load_full();

        match current.get(&key) {
            Some(existing) if *existing == value => return Ok(Some(value)),
            Some(_) => {}
            None if current.len() >= self.capacity => {
                return Err(DepwallError::TableFull {
                    table: self.name,
                    capacity: self.capacity,
                });
            }
            None => {}
        }

        let mut next = HashMap::clone(&current);
        let previous = next.insert(key, value);
        self.publish(next);
        Ok(previous)
    }

    pub(crate) fn remove(&self, key: &K) -> Option<V> {
        let _guard = self.writer.lock();
        let current = self.entries.load_full();
        if !current.contains_key(key) {
            return None;
        }

        let mut next = HashMap::clone(&current);
        let previous = next.remove(key);
        self.publish(next);
        previous
    }

    /// Swap in a complete replacement map in one step
    pub(crate) fn replace_all(&self, entries: HashMap<K, V>) -> DepwallResult<()> {
        if entries.len() > self.capacity {
            return Err(DepwallError::TableFull {
                table: self.name,
                capacity: self.capacity,
            });
        }

        let _guard = self.writer.lock();
        self.publish(entries);
        Ok(())
    }

    fn publish(&self, entries: HashMap<K, V>) {
        self.entries.store(Arc::new(entries));
        self.version.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn snapshot(&self) -> Arc<HashMap<K, V>> {
        self.entries.load_full()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }
}
