//! Per-thread king-pawn hash: caches the pawn-structure fragments of the
//! evaluation keyed by the dedicated king-pawn Zobrist key.

use crate::board::Bitboard;

const SIZE: usize = 1 << 11;
const MASK: u64 = SIZE as u64 - 1;

/// Cached pawn evaluation fragment, 48 bytes.
#[derive(Clone, Copy, Default)]
pub struct KingPawnEntry {
    pub key: u64,
    /// Passed pawns per color.
    pub passed: [Bitboard; 2],
    /// Pawn attack coverage per color.
    pub attack: [Bitboard; 2],
    /// Partial scores, `[phase][color]`.
    pub score: [[i16; 2]; 2],
}

/// Small per-thread cache (~96 KB). Construction without backing memory is
/// supported for one-shot evaluations (root ordering, tools).
pub struct KingPawnHash {
    table: Vec<KingPawnEntry>,
}

impl KingPawnHash {
    #[must_use]
    pub fn new() -> Self {
        KingPawnHash {
            table: vec![KingPawnEntry::default(); SIZE],
        }
    }

    /// A cache that stores nothing; every probe misses.
    #[must_use]
    pub fn unallocated() -> Self {
        KingPawnHash { table: Vec::new() }
    }

    #[inline]
    #[must_use]
    pub fn probe(&self, key: u64) -> Option<KingPawnEntry> {
        if self.table.is_empty() {
            return None;
        }
        let entry = self.table[(key & MASK) as usize];
        (entry.key == key).then_some(entry)
    }

    #[inline]
    pub fn store(&mut self, entry: KingPawnEntry) {
        if !self.table.is_empty() {
            self.table[(entry.key & MASK) as usize] = entry;
        }
    }

    pub fn clear(&mut self) {
        for entry in &mut self.table {
            *entry = KingPawnEntry::default();
        }
    }
}

impl Default for KingPawnHash {
    fn default() -> Self {
        KingPawnHash::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_is_48_bytes() {
        assert_eq!(std::mem::size_of::<KingPawnEntry>(), 48);
    }

    #[test]
    fn store_then_probe() {
        let mut hash = KingPawnHash::new();
        let entry = KingPawnEntry {
            key: 0xdead_beef,
            passed: [1, 2],
            attack: [3, 4],
            score: [[5, 6], [7, 8]],
        };
        hash.store(entry);
        let found = hash.probe(0xdead_beef).unwrap();
        assert_eq!(found.passed, [1, 2]);
        assert!(hash.probe(0xdead_beef ^ MASK.wrapping_add(1)).is_none());
    }

    #[test]
    fn unallocated_never_hits() {
        let mut hash = KingPawnHash::unallocated();
        hash.store(KingPawnEntry {
            key: 42,
            ..Default::default()
        });
        assert!(hash.probe(42).is_none());
    }
}
