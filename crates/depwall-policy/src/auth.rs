//! Source authentication table
//!
//! Binds a link-layer source address to the one IPv4 address it may claim.
//! Frames whose (source MAC, source IP) pair does not match a binding are
//! treated as spoofed.

use crate::table::CowTable;
use depwall_common::{DepwallResult, MacAddr};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::debug;

/// Default capacity, matching the kernel map this table replaces
pub const DEFAULT_AUTH_CAPACITY: usize = 256;

/// MAC -> IPv4 binding table. Read-mostly; reads never block on writers.
pub struct AuthTable {
    inner: CowTable<MacAddr, Ipv4Addr>,
}

impl AuthTable {
    /// Create empty table with a hard capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: CowTable::new("authentication", capacity),
        }
    }

    /// Bound address for `mac`, if any
    #[inline(always)]
    pub fn lookup(&self, mac: &MacAddr) -> Option<Ipv4Addr> {
        self.inner.get(mac)
    }

    /// True iff a binding exists for `mac` and equals `claimed`
    #[inline(always)]
    pub fn verify(&self, mac: &MacAddr, claimed: Ipv4Addr) -> bool {
        self.lookup(mac) == Some(claimed)
    }

    /// Install or rebind; returns the previous address
    pub fn install(&self, mac: MacAddr, addr: Ipv4Addr) -> DepwallResult<Option<Ipv4Addr>> {
        let previous = self.inner.insert(mac, addr)?;
        debug!(%mac, %addr, ?previous, "auth binding installed");
        Ok(previous)
    }

    /// Remove a binding; returns the address it was bound to
    pub fn remove(&self, mac: &MacAddr) -> Option<Ipv4Addr> {
        let removed = self.inner.remove(mac);
        if let Some(addr) = removed {
            debug!(%mac, %addr, "auth binding removed");
        }
        removed
    }

    /// Atomically replace all bindings
    pub fn replace_all(&self, bindings: HashMap<MacAddr, Ipv4Addr>) -> DepwallResult<()> {
        let count = bindings.len();
        self.inner.replace_all(bindings)?;
        debug!(count, table = self.inner.name(), "auth bindings replaced");
        Ok(())
    }

    /// Current bindings (for inspection)
    pub fn snapshot(&self) -> Arc<HashMap<MacAddr, Ipv4Addr>> {
        self.inner.snapshot()
    }

    /// Number of bindings
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

impl Default for AuthTable {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_CAPACITY)
    }
}
