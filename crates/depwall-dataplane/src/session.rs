//! Session tracker
//!
//! Bounded least-recently-used set of flow 5-tuples, shared by every
//! packet-processing context.
//!
//! # Design
//!
//! - Sharded by FNV-1a hash of the 5-tuple; one short mutex per shard
//! - Occupancy is global: one atomic count bounds the whole tracker, so a
//!   shard keeps inserting while a slot is free anywhere
//! - Every touch takes a stamp from a global clock and each shard publishes
//!   the stamp of its least recently used entry; a full tracker evicts from
//!   the shard holding the oldest stamp
//! - Each shard is an arena pre-sized to twice its fair share of the
//!   capacity (all of it when there is one shard), with a free list and an
//!   index-linked recency list, so touching never allocates
//!
//! With one toucher at a time eviction is exact LRU over the whole tracker.
//! Concurrent touches can race between reading a shard's oldest stamp and
//! evicting from it, which may evict an entry slightly younger than the
//! true oldest. A shard whose arena fills under a key spread skewed far
//! past its fair share recycles its own oldest entry instead.

use crate::parser::ParsedHeaders;
use crossbeam::utils::CachePadded;
use depwall_common::{AtomicCounter, IpProtocol};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Fair share of capacity below which the tracker is not split further
pub const MIN_SHARD_CAPACITY: usize = 64;

/// Upper bound on shard count
pub const MAX_SHARDS: usize = 64;

const NIL: u32 = u32::MAX;

/// Oldest stamp published by an empty shard
const EMPTY: u64 = u64::MAX;

/// Flow 5-tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Source address
    pub src_ip: Ipv4Addr,
    /// Destination address
    pub dst_ip: Ipv4Addr,
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// IP protocol (TCP or UDP)
    pub protocol: IpProtocol,
}

impl SessionKey {
    /// Create new key
    #[inline(always)]
    pub const fn new(
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        protocol: IpProtocol,
    ) -> Self {
        Self {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
        }
    }

    /// Key for a parsed TCP/UDP frame; `None` for every other protocol
    #[inline]
    pub fn from_headers(headers: &ParsedHeaders) -> Option<Self> {
        if !headers.protocol.has_ports() {
            return None;
        }
        headers.ports.map(|ports| {
            Self::new(
                headers.src_ip,
                headers.dst_ip,
                ports.src,
                ports.dst,
                headers.protocol,
            )
        })
    }

    /// FNV-1a over the tuple, used for shard selection
    #[inline(always)]
    pub fn hash(&self) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf29ce484222325;
        const FNV_PRIME: u64 = 0x100000001b3;

        let mut h = FNV_OFFSET;
        let mut mix = |bytes: &[u8]| {
            for &byte in bytes {
                h ^= byte as u64;
                h = h.wrapping_mul(FNV_PRIME);
            }
        };
        mix(&self.src_ip.octets());
        mix(&self.dst_ip.octets());
        mix(&self.src_port.to_be_bytes());
        mix(&self.dst_port.to_be_bytes());
        mix(&[self.protocol.0]);
        h
    }
}

/// Outcome of [`SessionTracker::touch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Touch {
    /// First sight of the flow (or first since it was evicted)
    New,
    /// Flow was already tracked; now most recently used
    Existing,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    key: SessionKey,
    /// Clock value of the last touch
    stamp: u64,
    prev: u32,
    next: u32,
}

/// Fixed-size arena LRU; list order matches stamp order
struct LruShard {
    index: HashMap<SessionKey, u32>,
    slots: Vec<Slot>,
    /// Most recently used
    head: u32,
    /// Least recently used
    tail: u32,
    /// Released slots, chained through `next`
    free: u32,
    arena: usize,
}

impl LruShard {
    fn new(arena: usize) -> Self {
        Self {
            // Headroom so tombstone cleanup rehashes in place
            index: HashMap::with_capacity(arena * 2),
            slots: Vec::with_capacity(arena),
            head: NIL,
            tail: NIL,
            free: NIL,
            arena,
        }
    }

    /// Mark `key` most recently used; false if it is not tracked here
    fn refresh(&mut self, key: &SessionKey, stamp: u64) -> bool {
        let Some(&idx) = self.index.get(key) else {
            return false;
        };
        self.slots[idx as usize].stamp = stamp;
        if idx != self.head {
            self.unlink(idx);
            self.push_front(idx);
        }
        true
    }

    fn is_full(&self) -> bool {
        self.free == NIL && self.slots.len() >= self.arena
    }

    /// Caller checks `is_full` first
    fn insert(&mut self, key: SessionKey, stamp: u64) {
        let slot = Slot {
            key,
            stamp,
            prev: NIL,
            next: NIL,
        };
        let idx = if self.free != NIL {
            let idx = self.free;
            self.free = self.slots[idx as usize].next;
            self.slots[idx as usize] = slot;
            idx
        } else {
            self.slots.push(slot);
            (self.slots.len() - 1) as u32
        };
        self.push_front(idx);
        self.index.insert(key, idx);
    }

    /// Remove the least recently used entry
    fn pop_lru(&mut self) -> Option<SessionKey> {
        if self.tail == NIL {
            return None;
        }
        let idx = self.tail;
        self.unlink(idx);
        let key = self.slots[idx as usize].key;
        self.index.remove(&key);
        self.slots[idx as usize].next = self.free;
        self.free = idx;
        Some(key)
    }

    fn oldest_stamp(&self) -> u64 {
        if self.tail == NIL {
            EMPTY
        } else {
            self.slots[self.tail as usize].stamp
        }
    }

    fn unlink(&mut self, idx: u32) {
        let Slot { prev, next, .. } = self.slots[idx as usize];
        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev as usize].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next as usize].prev = prev;
        }
    }

    fn push_front(&mut self, idx: u32) {
        let old_head = self.head;
        {
            let slot = &mut self.slots[idx as usize];
            slot.prev = NIL;
            slot.next = old_head;
        }
        if old_head == NIL {
            self.tail = idx;
        } else {
            self.slots[old_head as usize].prev = idx;
        }
        self.head = idx;
    }

    fn contains(&self, key: &SessionKey) -> bool {
        self.index.contains_key(key)
    }

    fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Keys from most to least recently used
    fn keys_by_recency(&self) -> Vec<SessionKey> {
        let mut keys = Vec::with_capacity(self.index.len());
        let mut idx = self.head;
        while idx != NIL {
            let slot = &self.slots[idx as usize];
            keys.push(slot.key);
            idx = slot.next;
        }
        keys
    }
}

struct Shard {
    lru: Mutex<LruShard>,
    /// Stamp of this shard's least recently used entry
    oldest: AtomicU64,
}

impl Shard {
    fn new(arena: usize) -> Self {
        Self {
            lru: Mutex::new(LruShard::new(arena)),
            oldest: AtomicU64::new(EMPTY),
        }
    }

    #[inline(always)]
    fn publish(&self, lru: &LruShard) {
        self.oldest.store(lru.oldest_stamp(), Ordering::Relaxed);
    }
}

/// Tracker counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Sessions inserted
    pub created: u64,
    /// Touches of an already-tracked session
    pub refreshed: u64,
    /// Sessions evicted under capacity pressure
    pub evicted: u64,
}

/// Bounded, sharded LRU session set
pub struct SessionTracker {
    shards: Box<[CachePadded<Shard>]>,
    mask: u64,
    capacity: usize,
    /// Tracked sessions across all shards
    len: CachePadded<AtomicUsize>,
    clock: CachePadded<AtomicU64>,
    created: AtomicCounter,
    refreshed: AtomicCounter,
    evicted: AtomicCounter,
}

impl SessionTracker {
    /// Create with a total capacity; shard count derived from it
    pub fn new(capacity: usize) -> Self {
        let wanted = (capacity / MIN_SHARD_CAPACITY).clamp(1, MAX_SHARDS);
        // Round down to a power of two so every shard keeps its minimum
        let shards = 1usize << (usize::BITS - 1 - wanted.leading_zeros());
        Self::with_shards(capacity, shards)
    }

    /// Create with an explicit shard count (rounded up to a power of two,
    /// and never more shards than slots)
    pub fn with_shards(capacity: usize, shards: usize) -> Self {
        let capacity = capacity.max(1);
        let mut count = shards.clamp(1, MAX_SHARDS).next_power_of_two();
        while count > capacity {
            count /= 2;
        }

        let arena = if count == 1 {
            capacity
        } else {
            (capacity.div_ceil(count) * 2).min(capacity)
        };
        let shards: Vec<_> = (0..count)
            .map(|_| CachePadded::new(Shard::new(arena)))
            .collect();

        Self {
            shards: shards.into_boxed_slice(),
            mask: (count - 1) as u64,
            capacity,
            len: CachePadded::new(AtomicUsize::new(0)),
            clock: CachePadded::new(AtomicU64::new(0)),
            created: AtomicCounter::new(0),
            refreshed: AtomicCounter::new(0),
            evicted: AtomicCounter::new(0),
        }
    }

    #[inline(always)]
    fn shard(&self, key: &SessionKey) -> &Shard {
        &self.shards[(key.hash() & self.mask) as usize]
    }

    #[inline(always)]
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Claim one unit of occupancy if the tracker is below capacity
    #[inline(always)]
    fn reserve(&self) -> bool {
        if self.len.fetch_add(1, Ordering::AcqRel) < self.capacity {
            true
        } else {
            self.release();
            false
        }
    }

    #[inline(always)]
    fn release(&self) {
        self.len.fetch_sub(1, Ordering::AcqRel);
    }

    /// Look up `key`; refresh it if present, insert it if not. A full
    /// tracker first evicts its least recently touched session.
    #[inline]
    pub fn touch(&self, key: SessionKey) -> Touch {
        let shard = self.shard(&key);
        {
            let mut lru = shard.lru.lock();
            let stamp = self.tick();
            if lru.refresh(&key, stamp) {
                shard.publish(&lru);
                self.refreshed.inc();
                return Touch::Existing;
            }
            if lru.is_full() {
                self.recycle(shard, &mut lru, key, stamp);
                return Touch::New;
            }
            if self.reserve() {
                self.insert(shard, &mut lru, key, stamp);
                return Touch::New;
            }
        }

        // Tracker full: the freed unit of occupancy passes to this insert
        let freed = self.evict_oldest();
        let mut lru = shard.lru.lock();
        let stamp = self.tick();
        if lru.refresh(&key, stamp) {
            // Another context inserted the same flow meanwhile
            if freed {
                self.release();
            }
            shard.publish(&lru);
            self.refreshed.inc();
            return Touch::Existing;
        }
        match (freed, lru.is_full()) {
            (true, false) => self.insert(shard, &mut lru, key, stamp),
            (true, true) => {
                self.release();
                self.recycle(shard, &mut lru, key, stamp);
            }
            (false, _) if !lru.is_empty() => self.recycle(shard, &mut lru, key, stamp),
            (false, _) => {
                // Concurrent evictions emptied every shard in between
                if self.reserve() {
                    self.insert(shard, &mut lru, key, stamp);
                }
            }
        }
        Touch::New
    }

    fn insert(&self, shard: &Shard, lru: &mut LruShard, key: SessionKey, stamp: u64) {
        lru.insert(key, stamp);
        shard.publish(lru);
        self.created.inc();
    }

    /// Replace the shard's own oldest entry with `key`
    fn recycle(&self, shard: &Shard, lru: &mut LruShard, key: SessionKey, stamp: u64) {
        if lru.pop_lru().is_some() {
            self.evicted.inc();
        }
        self.insert(shard, lru, key, stamp);
    }

    /// Evict the least recently touched session of the whole tracker,
    /// keeping its unit of occupancy claimed. False if nothing was evicted.
    fn evict_oldest(&self) -> bool {
        for _ in 0..self.shards.len() {
            let Some((victim, oldest)) = self
                .shards
                .iter()
                .map(|s| (s, s.oldest.load(Ordering::Relaxed)))
                .min_by_key(|&(_, stamp)| stamp)
            else {
                return false;
            };
            if oldest == EMPTY {
                return false;
            }

            let mut lru = victim.lru.lock();
            let popped = lru.pop_lru();
            victim.publish(&lru);
            if popped.is_some() {
                self.evicted.inc();
                return true;
            }
        }
        false
    }

    /// Presence check; does not change recency
    pub fn contains(&self, key: &SessionKey) -> bool {
        self.shard(key).lru.lock().contains(key)
    }

    /// Sessions currently tracked
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire).min(self.capacity)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Keys of each shard, most recently used first
    pub fn dump(&self) -> Vec<Vec<SessionKey>> {
        self.shards
            .iter()
            .map(|s| s.lru.lock().keys_by_recency())
            .collect()
    }

    /// Counter snapshot
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            created: self.created.get(),
            refreshed: self.refreshed.get(),
            evicted: self.evicted.get(),
        }
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(crate::DEFAULT_SESSION_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(n: u16) -> SessionKey {
        SessionKey::new(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            n,
            80,
            IpProtocol::TCP,
        )
    }

    #[test]
    fn test_new_then_existing() {
        let tracker = SessionTracker::new(8);
        assert_eq!(tracker.touch(key(1)), Touch::New);
        assert_eq!(tracker.touch(key(1)), Touch::Existing);
        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.stats(),
            SessionStats { created: 1, refreshed: 1, evicted: 0 }
        );
    }

    #[test]
    fn test_evicts_least_recently_touched() {
        let n = 4;
        let tracker = SessionTracker::new(n);
        assert_eq!(tracker.shard_count(), 1);

        for i in 0..n as u16 {
            tracker.touch(key(i));
        }
        assert_eq!(tracker.touch(key(100)), Touch::New);

        assert_eq!(tracker.stats().evicted, 1);
        assert_eq!(tracker.len(), n);
        assert!(!tracker.contains(&key(0)));
        for i in 1..n as u16 {
            assert!(tracker.contains(&key(i)));
        }
    }

    #[test]
    fn test_retouch_prevents_eviction() {
        let tracker = SessionTracker::new(3);
        tracker.touch(key(0));
        tracker.touch(key(1));
        tracker.touch(key(2));

        // key(0) becomes most recent; key(1) is now the oldest
        assert_eq!(tracker.touch(key(0)), Touch::Existing);
        tracker.touch(key(3));

        assert!(tracker.contains(&key(0)));
        assert!(!tracker.contains(&key(1)));
        assert_eq!(tracker.dump(), vec![vec![key(3), key(0), key(2)]]);
    }

    #[test]
    fn test_evicted_key_is_new_again() {
        let tracker = SessionTracker::new(1);
        tracker.touch(key(0));
        tracker.touch(key(1));
        assert_eq!(tracker.touch(key(0)), Touch::New);
        assert_eq!(tracker.stats().evicted, 2);
    }

    #[test]
    fn test_contains_does_not_refresh() {
        let tracker = SessionTracker::new(2);
        tracker.touch(key(0));
        tracker.touch(key(1));
        assert!(tracker.contains(&key(0)));

        tracker.touch(key(2));
        assert!(!tracker.contains(&key(0)));
    }

    fn scattered(i: u32) -> SessionKey {
        SessionKey::new(
            Ipv4Addr::from(i.wrapping_mul(0x9e37_79b9)),
            Ipv4Addr::new(192, 168, 1, 1),
            (i % 50_000) as u16 + 1024,
            443,
            IpProtocol::UDP,
        )
    }

    /// Distinct keys that all hash into `shard` of a two-shard tracker
    fn keys_in_shard(shard: u64, n: usize) -> Vec<SessionKey> {
        (0..u16::MAX)
            .map(key)
            .filter(|k| k.hash() & 1 == shard)
            .take(n)
            .collect()
    }

    #[test]
    fn test_shard_layout() {
        let tracker = SessionTracker::new(4 * MIN_SHARD_CAPACITY);
        assert_eq!(tracker.shard_count(), 4);

        let tracker = SessionTracker::new(3 * MIN_SHARD_CAPACITY);
        assert_eq!(tracker.shard_count(), 2);

        assert_eq!(SessionTracker::default().shard_count(), 16);
        assert_eq!(SessionTracker::new(1 << 20).shard_count(), MAX_SHARDS);

        let tracker = SessionTracker::with_shards(3, 16);
        assert_eq!(tracker.shard_count(), 2);
        assert_eq!(tracker.capacity(), 3);

        let tracker = SessionTracker::with_shards(0, 0);
        assert_eq!(tracker.capacity(), 1);
    }

    #[test]
    fn test_sharded_tracker_evicts_once_past_capacity() {
        let capacity = 4096;
        let tracker = SessionTracker::new(capacity);
        assert!(tracker.shard_count() > 1);

        for i in 0..capacity as u32 {
            assert_eq!(tracker.touch(scattered(i)), Touch::New);
        }
        assert_eq!(tracker.len(), capacity);
        assert_eq!(tracker.stats().evicted, 0);

        // key 0 becomes most recent, leaving key 1 as the oldest overall
        assert_eq!(tracker.touch(scattered(0)), Touch::Existing);
        assert_eq!(tracker.touch(scattered(capacity as u32)), Touch::New);

        assert_eq!(tracker.stats().evicted, 1);
        assert_eq!(tracker.len(), capacity);
        assert!(tracker.contains(&scattered(0)));
        assert!(!tracker.contains(&scattered(1)));
        for i in 2..=capacity as u32 {
            assert!(tracker.contains(&scattered(i)));
        }
    }

    #[test]
    fn test_shard_borrows_free_capacity() {
        let tracker = SessionTracker::with_shards(8, 2);
        let crowded = keys_in_shard(0, 8);
        for k in &crowded {
            assert_eq!(tracker.touch(*k), Touch::New);
        }
        assert_eq!(tracker.len(), 8);
        assert_eq!(tracker.stats().evicted, 0);

        // Full: the other shard's insert evicts the oldest key overall
        let other = keys_in_shard(1, 1)[0];
        assert_eq!(tracker.touch(other), Touch::New);
        assert_eq!(tracker.stats().evicted, 1);
        assert!(!tracker.contains(&crowded[0]));

        let dump = tracker.dump();
        assert_eq!(dump[0].len(), 7);
        assert_eq!(dump[0].last(), Some(&crowded[1]));
        assert_eq!(dump[1], vec![other]);
    }

    #[test]
    fn test_sharded_capacity_is_bounded() {
        let tracker = SessionTracker::with_shards(64, 2);
        for i in 0..1000 {
            tracker.touch(key(i));
        }
        assert_eq!(tracker.len(), 64);
        let stats = tracker.stats();
        assert_eq!(stats.created, 1000);
        assert_eq!(stats.evicted, 1000 - 64);
    }

    #[test]
    fn test_concurrent_touch() {
        let tracker = Arc::new(SessionTracker::with_shards(256, 4));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..500u16 {
                        tracker.touch(key(t * 1000 + i % 50));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stats = tracker.stats();
        assert_eq!(stats.created + stats.refreshed, 2000);
        assert!(tracker.len() <= 256);
    }

    #[test]
    fn test_key_hash() {
        let k = key(1234);
        let swapped = SessionKey::new(k.dst_ip, k.src_ip, k.dst_port, k.src_port, k.protocol);
        assert_eq!(k.hash(), key(1234).hash());
        assert_ne!(k.hash(), swapped.hash());
    }

    #[test]
    fn test_key_only_for_port_protocols() {
        let mut headers = ParsedHeaders {
            src_mac: Default::default(),
            dst_mac: Default::default(),
            src_ip: Ipv4Addr::new(10, 0, 0, 1),
            dst_ip: Ipv4Addr::new(10, 0, 0, 2),
            protocol: IpProtocol::TCP,
            ports: Some(crate::parser::Ports { src: 1, dst: 2 }),
        };
        assert!(SessionKey::from_headers(&headers).is_some());

        headers.protocol = IpProtocol::ICMP;
        assert!(SessionKey::from_headers(&headers).is_none());
    }
}
