//! Fixed-capacity block cache with least-recently-used eviction.
//!
//! Recency comes from a logical clock owned by the cache. It advances on
//! every hit, insert and update, and the touched entry is stamped with the
//! new value. When every slot is occupied, an insert replaces the entry with
//! the smallest stamp; equal stamps fall back to the lowest slot index.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use tracing::debug;

use crate::error::{JbodError, Result};
use crate::geometry::{Block, BlockAddr};

pub const MIN_ENTRIES: usize = 2;
pub const MAX_ENTRIES: usize = 4096;

/// Query and hit counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub queries: u64,
    pub hits: u64,
}

impl CacheStats {
    /// Hits as a percentage of queries; 0 before the first query.
    pub fn hit_rate(&self) -> f64 {
        if self.queries == 0 {
            0.0
        } else {
            100.0 * self.hits as f64 / self.queries as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hit rate: {:5.1}%", self.hit_rate())
    }
}

struct Slot {
    addr: BlockAddr,
    data: Block,
    access_time: u64,
}

pub struct BlockCache {
    // `None` marks a slot that has never been filled.
    slots: Vec<Option<Slot>>,
    index: HashMap<BlockAddr, usize>,
    // (access_time, slot) of every occupied slot; the first element is the
    // eviction victim.
    recency: BTreeSet<(u64, usize)>,
    clock: u64,
    stats: CacheStats,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Result<Self> {
        if !(MIN_ENTRIES..=MAX_ENTRIES).contains(&capacity) {
            return Err(JbodError::InvalidCacheCapacity(capacity));
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self {
            slots,
            index: HashMap::with_capacity(capacity),
            recency: BTreeSet::new(),
            clock: 0,
            stats: CacheStats::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Current logical clock value.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Access stamp of a cached block.
    pub fn access_time(&self, addr: BlockAddr) -> Option<u64> {
        let slot = *self.index.get(&addr)?;
        self.slots[slot].as_ref().map(|s| s.access_time)
    }

    /// Copy the cached content of `addr` into `out`. Returns whether it was a
    /// hit. Out-of-range addresses are rejected without counting a query.
    pub fn lookup(&mut self, addr: BlockAddr, out: &mut Block) -> bool {
        if !addr.in_range() {
            return false;
        }
        self.stats.queries += 1;
        let Some(&slot) = self.index.get(&addr) else {
            return false;
        };
        self.touch(slot);
        if let Some(entry) = &self.slots[slot] {
            out.copy_from_slice(&entry.data);
        }
        self.stats.hits += 1;
        true
    }

    /// Overwrite the content of `addr` if it is cached. Never inserts, and
    /// silently ignores out-of-range addresses.
    pub fn update(&mut self, addr: BlockAddr, data: &Block) {
        if !addr.in_range() {
            return;
        }
        if let Some(&slot) = self.index.get(&addr) {
            if let Some(entry) = self.slots[slot].as_mut() {
                entry.data.copy_from_slice(data);
            }
            self.touch(slot);
        }
    }

    /// Cache a block that is not yet present, evicting the least recently
    /// used entry if every slot is taken.
    pub fn insert(&mut self, addr: BlockAddr, data: &Block) -> Result<()> {
        if !addr.in_range() {
            return Err(JbodError::BlockOutOfRange {
                disk: addr.disk,
                block: addr.block,
            });
        }
        if self.index.contains_key(&addr) {
            return Err(JbodError::AlreadyCached {
                disk: addr.disk,
                block: addr.block,
            });
        }

        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .or_else(|| self.evict())
            .ok_or(JbodError::NoEvictableEntry)?;
        self.clock += 1;
        self.slots[slot] = Some(Slot {
            addr,
            data: *data,
            access_time: self.clock,
        });
        self.index.insert(addr, slot);
        self.recency.insert((self.clock, slot));
        Ok(())
    }

    /// Empty the least recently used slot and return its index.
    fn evict(&mut self) -> Option<usize> {
        let (stamp, slot) = self.recency.pop_first()?;
        if let Some(victim) = self.slots[slot].take() {
            debug!(
                disk = victim.addr.disk,
                block = victim.addr.block,
                stamp,
                "evicting cached block"
            );
            self.index.remove(&victim.addr);
        }
        Some(slot)
    }

    fn touch(&mut self, slot: usize) {
        self.clock += 1;
        if let Some(entry) = self.slots[slot].as_mut() {
            self.recency.remove(&(entry.access_time, slot));
            entry.access_time = self.clock;
            self.recency.insert((self.clock, slot));
        }
    }
}

impl fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCache")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("clock", &self.clock)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BLOCK_SIZE;

    fn addr(disk: u32, block: u32) -> BlockAddr {
        BlockAddr { disk, block }
    }

    fn filled(byte: u8) -> Block {
        [byte; BLOCK_SIZE]
    }

    #[test]
    fn test_capacity_bounds() {
        for bad in [0, 1, MAX_ENTRIES + 1] {
            assert!(matches!(
                BlockCache::new(bad),
                Err(JbodError::InvalidCacheCapacity(n)) if n == bad
            ));
        }
        assert_eq!(BlockCache::new(2).unwrap().capacity(), 2);
        assert_eq!(BlockCache::new(4096).unwrap().capacity(), 4096);
    }

    #[test]
    fn test_lookup_hit_and_miss() {
        let mut cache = BlockCache::new(4).unwrap();
        cache.insert(addr(1, 2), &filled(7)).unwrap();

        let mut out = [0u8; BLOCK_SIZE];
        assert!(cache.lookup(addr(1, 2), &mut out));
        assert_eq!(out, filled(7));
        assert!(!cache.lookup(addr(1, 3), &mut out));
        assert_eq!(cache.stats(), CacheStats { queries: 2, hits: 1 });
    }

    #[test]
    fn test_lookup_out_of_range_is_not_counted() {
        let mut cache = BlockCache::new(4).unwrap();
        let mut out = [0u8; BLOCK_SIZE];
        assert!(!cache.lookup(addr(16, 0), &mut out));
        assert!(!cache.lookup(addr(0, 256), &mut out));
        assert_eq!(cache.stats().queries, 0);
    }

    #[test]
    fn test_hit_refreshes_stamp() {
        let mut cache = BlockCache::new(4).unwrap();
        cache.insert(addr(0, 0), &filled(1)).unwrap();
        assert_eq!(cache.access_time(addr(0, 0)), Some(1));
        let mut out = [0u8; BLOCK_SIZE];
        cache.lookup(addr(0, 0), &mut out);
        assert_eq!(cache.access_time(addr(0, 0)), Some(2));
        assert_eq!(cache.clock(), 2);
    }

    #[test]
    fn test_duplicate_insert_fails_and_keeps_stamp() {
        let mut cache = BlockCache::new(4).unwrap();
        cache.insert(addr(3, 3), &filled(1)).unwrap();
        let before = cache.access_time(addr(3, 3));

        assert!(matches!(
            cache.insert(addr(3, 3), &filled(2)),
            Err(JbodError::AlreadyCached { disk: 3, block: 3 })
        ));
        assert_eq!(cache.access_time(addr(3, 3)), before);
        let mut out = [0u8; BLOCK_SIZE];
        cache.lookup(addr(3, 3), &mut out);
        assert_eq!(out, filled(1));
    }

    #[test]
    fn test_insert_rejects_out_of_range() {
        let mut cache = BlockCache::new(2).unwrap();
        assert!(cache.insert(addr(16, 0), &filled(0)).is_err());
        assert!(cache.insert(addr(0, 256), &filled(0)).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_full_cache_evicts_least_recent() {
        let n = 8;
        let mut cache = BlockCache::new(n).unwrap();
        for i in 0..n as u32 {
            cache.insert(addr(0, i), &filled(i as u8)).unwrap();
        }
        // Touch everything except block 3, making it the oldest.
        let mut out = [0u8; BLOCK_SIZE];
        for i in (0..n as u32).filter(|&i| i != 3) {
            assert!(cache.lookup(addr(0, i), &mut out));
        }

        cache.insert(addr(5, 5), &filled(0xee)).unwrap();
        assert_eq!(cache.len(), n);
        assert!(!cache.lookup(addr(0, 3), &mut out));
        assert!(cache.lookup(addr(5, 5), &mut out));
        assert_eq!(out, filled(0xee));
        for i in (0..n as u32).filter(|&i| i != 3) {
            assert!(cache.lookup(addr(0, i), &mut out), "block {i} was evicted");
        }
    }

    #[test]
    fn test_eviction_reuses_victim_slot() {
        let mut cache = BlockCache::new(2).unwrap();
        cache.insert(addr(0, 0), &filled(0)).unwrap();
        cache.insert(addr(0, 1), &filled(1)).unwrap();
        cache.insert(addr(0, 2), &filled(2)).unwrap();
        assert_eq!(cache.access_time(addr(0, 0)), None);
        assert_eq!(cache.index.get(&addr(0, 2)), Some(&0));
        cache.insert(addr(0, 3), &filled(3)).unwrap();
        assert_eq!(cache.access_time(addr(0, 1)), None);
        assert_eq!(cache.index.get(&addr(0, 3)), Some(&1));
    }

    #[test]
    fn test_insert_without_victim_fails() {
        let mut cache = BlockCache::new(2).unwrap();
        cache.insert(addr(0, 0), &filled(0)).unwrap();
        cache.insert(addr(0, 1), &filled(1)).unwrap();
        cache.recency.clear();
        assert!(matches!(
            cache.insert(addr(0, 2), &filled(2)),
            Err(JbodError::NoEvictableEntry)
        ));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_update_overwrites_but_never_inserts() {
        let mut cache = BlockCache::new(2).unwrap();
        cache.update(addr(0, 0), &filled(9));
        assert!(cache.is_empty());
        assert_eq!(cache.clock(), 0);

        cache.insert(addr(0, 0), &filled(1)).unwrap();
        cache.update(addr(0, 0), &filled(9));
        assert_eq!(cache.access_time(addr(0, 0)), Some(2));
        let mut out = [0u8; BLOCK_SIZE];
        cache.lookup(addr(0, 0), &mut out);
        assert_eq!(out, filled(9));

        cache.update(addr(99, 0), &filled(3));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_hit_rate_display() {
        let stats = CacheStats {
            queries: 8,
            hits: 3,
        };
        assert_eq!(stats.to_string(), "Hit rate:  37.5%");
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
