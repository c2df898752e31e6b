//! Shared transposition table.
//!
//! Two 64-bit words per slot, four slots per bucket, no locks: the key word
//! stores `position_key ^ data`, so a torn concurrent write makes the probe
//! miss instead of returning garbage. Memory is 2 MiB-aligned, which lets
//! the kernel back it with transparent huge pages.

use std::alloc::{self, Layout};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::board::Move;
use crate::score;

/// Slot count per bucket; probes scan a sliding window of four slots.
const SLOTS: usize = 4;
const ALIGN: usize = 2 * (1 << 20);
const MIN_ENTRIES: usize = 1 << 17; // 2 MiB of 16-byte slots

pub const MIN_SIZE_MB: usize = 2;
pub const MAX_SIZE_MB: usize = 65_536;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Bound {
    None = 0,
    Exact = 1,
    Upper = 2,
    Lower = 3,
}

impl Bound {
    #[inline]
    fn from_bits(bits: u64) -> Self {
        match bits & 0x3 {
            1 => Bound::Exact,
            2 => Bound::Upper,
            3 => Bound::Lower,
            _ => Bound::None,
        }
    }
}

/// Decoded probe result.
#[derive(Clone, Copy, Debug)]
pub struct TtHit {
    pub mv: Move,
    pub sc: i32,
    pub bd: Bound,
    pub dt: i32,
}

#[repr(C)]
struct Slot {
    key: AtomicU64,
    data: AtomicU64,
}

/// score(16) | move(24) | depth(7) | bound(2) | age(15)
fn compress(sc: i32, mv: Move, dt: i32, bd: Bound, age: u16) -> u64 {
    debug_assert!(score::valid(sc));
    debug_assert!(mv.raw() >> 24 == 0);
    debug_assert!((0..=score::MAX_DEPTH).contains(&dt));
    ((sc - score::NONE) as u64) << 48
        | u64::from(mv.raw()) << 24
        | (dt as u64) << 17
        | (bd as u64) << 15
        | u64::from(age) & 0x7fff
}

fn entry_score(data: u64) -> i32 {
    (data >> 48) as i32 + score::NONE
}

fn entry_move(data: u64) -> Move {
    Move::from_raw((data >> 24) as u32 & 0xff_ffff)
}

fn entry_depth(data: u64) -> i32 {
    (data >> 17) as i32 & 0x7f
}

fn entry_age(data: u64) -> u16 {
    (data & 0x7fff) as u16
}

pub struct TranspositionTable {
    table: *mut Slot,
    entries: usize,
    mask: u64,
}

unsafe impl Send for TranspositionTable {}
unsafe impl Sync for TranspositionTable {}

impl TranspositionTable {
    /// Allocate a table of at most `megabytes`, rounded down to a power of
    /// two of slots, minimum 2 MiB. On allocation failure the table degrades
    /// to an empty one that misses every probe.
    #[must_use]
    pub fn new(megabytes: usize) -> Self {
        let megabytes = megabytes.clamp(MIN_SIZE_MB, MAX_SIZE_MB);
        let max_entries = (megabytes << 20) / std::mem::size_of::<Slot>();

        let mut entries = MIN_ENTRIES;
        while entries * 2 <= max_entries {
            entries *= 2;
        }

        let layout = Layout::from_size_align(entries * std::mem::size_of::<Slot>(), ALIGN)
            .expect("valid TT layout");
        // zeroed memory is the all-empty table
        let table = unsafe { alloc::alloc_zeroed(layout) }.cast::<Slot>();
        if table.is_null() {
            log::warn!("hash table allocation of {megabytes} MB failed");
            return TranspositionTable {
                table: std::ptr::null_mut(),
                entries: 0,
                mask: 0,
            };
        }

        TranspositionTable {
            table,
            entries,
            mask: (entries - SLOTS) as u64,
        }
    }

    /// Allocated size in MiB.
    #[must_use]
    pub fn size_mb(&self) -> usize {
        (self.entries * std::mem::size_of::<Slot>()) >> 20
    }

    fn slots(&self) -> &[Slot] {
        if self.table.is_null() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.table, self.entries) }
        }
    }

    fn bucket(&self, key: u64) -> &[Slot] {
        let idx = (key & self.mask) as usize;
        &self.slots()[idx..idx + SLOTS]
    }

    /// Clear every entry. Callers must ensure no search is running.
    pub fn clear(&self) {
        for slot in self.slots() {
            slot.key.store(0, Ordering::Relaxed);
            slot.data.store(0, Ordering::Relaxed);
        }
    }

    /// Probe for `key`. On a hit the entry's age is refreshed and the score
    /// is converted from mate-distance-from-node to distance-from-root.
    #[must_use]
    pub fn probe(&self, key: u64, curr_dt: i32, age: u16) -> Option<TtHit> {
        if self.table.is_null() {
            return None;
        }
        for slot in self.bucket(key) {
            let data = slot.data.load(Ordering::Relaxed);
            let stored_key = slot.key.load(Ordering::Relaxed);
            if stored_key ^ data != key {
                continue;
            }

            let refreshed = data & !0x7fff | u64::from(age) & 0x7fff;
            slot.data.store(refreshed, Ordering::Relaxed);
            slot.key.store(key ^ refreshed, Ordering::Relaxed);

            let mut sc = entry_score(data);
            let bd = Bound::from_bits(data >> 15);
            if sc > score::LONGEST_MATE && bd != Bound::Upper {
                sc -= curr_dt;
            }
            if sc < -score::LONGEST_MATE && bd != Bound::Lower {
                sc += curr_dt;
            }
            return Some(TtHit {
                mv: entry_move(data),
                sc,
                bd,
                dt: entry_depth(data),
            });
        }
        None
    }

    /// Store a result. Replacement prefers a key match, then an empty slot,
    /// then the oldest and shallowest entry; entries stamped from the future
    /// (position rewound in analysis) are evicted immediately.
    pub fn store(&self, key: u64, mv: Move, sc: i32, bd: Bound, remaining_dt: i32, curr_dt: i32, age: u16) {
        if self.table.is_null() {
            return;
        }
        debug_assert!(score::valid(sc));

        let mut sc = sc;
        if sc > score::LONGEST_MATE && bd != Bound::Upper {
            sc += curr_dt;
        }
        if sc < -score::LONGEST_MATE && bd != Bound::Lower {
            sc -= curr_dt;
        }

        let bucket = self.bucket(key);
        let mut chosen = &bucket[0];
        let ceiling = score::MAX_DEPTH + (i32::from(age) << 8);
        let mut lowest = ceiling;

        for slot in bucket {
            let data = slot.data.load(Ordering::Relaxed);
            let stored_key = slot.key.load(Ordering::Relaxed);

            if stored_key ^ data == key || stored_key == 0 {
                chosen = slot;
                break;
            }

            let priority = entry_depth(data) + (i32::from(entry_age(data)) << 8);
            if priority <= lowest {
                lowest = priority;
                chosen = slot;
            } else if priority > ceiling {
                chosen = slot;
                break;
            }
        }

        let data = compress(sc, mv, remaining_dt, bd, age);
        chosen.data.store(data, Ordering::Relaxed);
        chosen.key.store(key ^ data, Ordering::Relaxed);
    }

    /// Occupancy per mille, sampled over the first thousand slots.
    #[must_use]
    pub fn hashfull(&self) -> u32 {
        let slots = self.slots();
        if slots.len() < 1000 {
            return 0;
        }
        slots[..1000]
            .iter()
            .filter(|slot| slot.key.load(Ordering::Relaxed) != 0)
            .count() as u32
    }

    /// Hint the cache that a bucket is about to be probed.
    #[inline]
    pub fn prefetch(&self, key: u64) {
        #[cfg(target_arch = "x86_64")]
        if !self.table.is_null() {
            let idx = (key & self.mask) as usize;
            unsafe {
                core::arch::x86_64::_mm_prefetch(
                    self.table.add(idx).cast::<i8>(),
                    core::arch::x86_64::_MM_HINT_T0,
                );
            }
        }
    }
}

impl Drop for TranspositionTable {
    fn drop(&mut self) {
        if !self.table.is_null() {
            let layout =
                Layout::from_size_align(self.entries * std::mem::size_of::<Slot>(), ALIGN)
                    .expect("valid TT layout");
            unsafe { alloc::dealloc(self.table.cast(), layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Color, MoveFlag, Piece, Square};

    fn some_move() -> Move {
        Move::new(
            Square::E1,
            Square::from_coords(4, 1),
            Piece::King,
            None,
            Color::White,
            MoveFlag::None,
        )
    }

    #[test]
    fn store_probe_round_trip() {
        let tt = TranspositionTable::new(2);
        let key = 0x1234_5678_9abc_def0;
        tt.store(key, some_move(), 123, Bound::Exact, 7, 3, 10);
        let hit = tt.probe(key, 3, 10).expect("hit");
        assert_eq!(hit.sc, 123);
        assert_eq!(hit.dt, 7);
        assert_eq!(hit.bd, Bound::Exact);
        assert_eq!(hit.mv, some_move());
        assert!(tt.probe(key ^ 1, 3, 10).is_none());
    }

    #[test]
    fn mate_scores_adjust_by_ply() {
        let tt = TranspositionTable::new(2);
        let key = 42;
        // mate found 5 plies into the search, stored at node depth 5
        let sc = score::MATE - 8;
        tt.store(key, Move::NULL, sc, Bound::Exact, 3, 5, 1);
        // probed from a node 2 plies deep: distance re-anchors
        let hit = tt.probe(key, 2, 1).expect("hit");
        assert_eq!(hit.sc, sc + 5 - 2);
    }

    #[test]
    fn xor_integrity_rejects_corruption() {
        let tt = TranspositionTable::new(2);
        let key = 0xfeed_f00d;
        tt.store(key, Move::NULL, 50, Bound::Lower, 4, 0, 1);
        assert!(tt.probe(key, 0, 1).is_some());
        // a write under a colliding key must not satisfy the original key
        tt.store(key ^ 0xffff, Move::NULL, -50, Bound::Upper, 9, 0, 1);
        if let Some(hit) = tt.probe(key, 0, 1) {
            assert_eq!(hit.sc, 50);
        }
    }

    #[test]
    fn rounds_down_to_power_of_two() {
        let tt = TranspositionTable::new(3);
        assert_eq!(tt.size_mb(), 2);
        let tt = TranspositionTable::new(9);
        assert_eq!(tt.size_mb(), 8);
    }

    #[test]
    fn hashfull_counts_stored_entries() {
        let tt = TranspositionTable::new(2);
        assert_eq!(tt.hashfull(), 0);
        for i in 0..5000u64 {
            tt.store(i.wrapping_mul(0x9e37_79b9_7f4a_7c15), Move::NULL, 0, Bound::Exact, 1, 0, 1);
        }
        assert!(tt.hashfull() > 0);
        tt.clear();
        assert_eq!(tt.hashfull(), 0);
    }
}
