//! Dependency table: the directed allow-list of (source, destination) pairs
//!
//! Each pair is an independent fact. There is no wildcard or prefix
//! matching, and (A -> B) says nothing about (B -> A). Absent pairs are
//! denied.

use crate::table::CowTable;
use depwall_common::DepwallResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::debug;

/// Default capacity, matching the kernel map this table replaces
pub const DEFAULT_DEPENDENCY_CAPACITY: usize = 10_000;

/// Directed dependency edge key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyKey {
    /// Source address
    pub src: Ipv4Addr,
    /// Destination address
    pub dst: Ipv4Addr,
}

impl DependencyKey {
    /// Create new key
    #[inline(always)]
    pub const fn new(src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        Self { src, dst }
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

/// Dependency edge table. Mutated by the control plane only.
pub struct DependencyTable {
    inner: CowTable<DependencyKey, bool>,
}

impl DependencyTable {
    /// Create empty table with a hard capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: CowTable::new("dependency", capacity),
        }
    }

    /// True iff an edge `src -> dst` exists and is marked authorized
    #[inline(always)]
    pub fn is_authorized(&self, src: Ipv4Addr, dst: Ipv4Addr) -> bool {
        self.inner.get(&DependencyKey::new(src, dst)) == Some(true)
    }

    /// Authorization marker of an edge, if the edge exists
    pub fn get(&self, src: Ipv4Addr, dst: Ipv4Addr) -> Option<bool> {
        self.inner.get(&DependencyKey::new(src, dst))
    }

    /// Install or update an edge
    pub fn add(&self, src: Ipv4Addr, dst: Ipv4Addr, authorized: bool) -> DepwallResult<()> {
        let key = DependencyKey::new(src, dst);
        self.inner.insert(key, authorized)?;
        debug!(edge = %key, authorized, "dependency installed");
        Ok(())
    }

    /// Remove an edge; returns whether it existed
    pub fn remove(&self, src: Ipv4Addr, dst: Ipv4Addr) -> bool {
        let key = DependencyKey::new(src, dst);
        let existed = self.inner.remove(&key).is_some();
        if existed {
            debug!(edge = %key, "dependency removed");
        }
        existed
    }

    /// Atomically replace all edges
    pub fn replace_all(&self, edges: HashMap<DependencyKey, bool>) -> DepwallResult<()> {
        let count = edges.len();
        self.inner.replace_all(edges)?;
        debug!(count, table = self.inner.name(), "dependencies replaced");
        Ok(())
    }

    /// Current edges (for inspection)
    pub fn snapshot(&self) -> Arc<HashMap<DependencyKey, bool>> {
        self.inner.snapshot()
    }

    /// Number of edges
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hard capacity
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Mutation generation
    pub fn version(&self) -> u64 {
        self.inner.version()
    }
}

impl Default for DependencyTable {
    fn default() -> Self {
        Self::new(DEFAULT_DEPENDENCY_CAPACITY)
    }
}
