//! Simplified ABDADA: a small shared map of 32-bit move hashes that are
//! currently being searched, letting other workers defer duplicated work.
//!
//! Writes are racy on purpose; a stale read only costs one redundant
//! search.

use std::sync::atomic::{AtomicU32, Ordering};

/// Defer moves from this depth on.
pub const DEPTH_DEFER: i32 = 3;
/// Check for concurrent cutoffs from this depth on.
pub const DEPTH_CUTOFF: i32 = 4;

const SIZE: usize = 1 << 15;
const MASK: u32 = SIZE as u32 - 1;
const WAYS: usize = 4;

pub struct DeferMap {
    concurrent: Vec<[AtomicU32; WAYS]>,
}

impl DeferMap {
    #[must_use]
    pub fn new() -> Self {
        let mut concurrent = Vec::with_capacity(SIZE);
        concurrent.resize_with(SIZE, || [const { AtomicU32::new(0) }; WAYS]);
        DeferMap { concurrent }
    }

    #[inline]
    fn bucket(&self, mv_hash: u32) -> &[AtomicU32; WAYS] {
        &self.concurrent[(mv_hash & MASK) as usize]
    }

    /// True if another worker is already searching this move.
    #[must_use]
    pub fn defer(&self, mv_hash: u32) -> bool {
        self.bucket(mv_hash)
            .iter()
            .any(|slot| slot.load(Ordering::Relaxed) == mv_hash)
    }

    /// Announce that this worker starts searching the move.
    pub fn add(&self, mv_hash: u32) {
        let slots = self.bucket(mv_hash);
        for slot in slots {
            let entry = slot.load(Ordering::Relaxed);
            if entry == 0 {
                slot.store(mv_hash, Ordering::Relaxed);
                return;
            }
            if entry == mv_hash {
                return;
            }
        }
        slots[0].store(mv_hash, Ordering::Relaxed);
    }

    /// Withdraw the announcement.
    pub fn remove(&self, mv_hash: u32) {
        for slot in self.bucket(mv_hash) {
            if slot.load(Ordering::Relaxed) == mv_hash {
                slot.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Reset before a new search.
    pub fn clear(&self) {
        for slots in &self.concurrent {
            for slot in slots {
                slot.store(0, Ordering::Relaxed);
            }
        }
    }
}

impl Default for DeferMap {
    fn default() -> Self {
        DeferMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_defer_remove_cycle() {
        let map = DeferMap::new();
        assert!(!map.defer(0xabcd));
        map.add(0xabcd);
        assert!(map.defer(0xabcd));
        assert!(!map.defer(0xabce));
        map.remove(0xabcd);
        assert!(!map.defer(0xabcd));
    }

    #[test]
    fn bucket_overflow_overwrites_first_slot() {
        let map = DeferMap::new();
        // five hashes in the same bucket: the fifth evicts the first
        let base = 0x10u32;
        for i in 0..5 {
            map.add(base + (i << 16));
        }
        assert!(map.defer(base + (4 << 16)));
    }
}
