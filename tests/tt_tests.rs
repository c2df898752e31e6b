//! Concurrent transposition-table integrity.
//!
//! The table is lockless; the XOR of key and data words must turn every
//! torn or overwritten entry into a miss rather than a wrong hit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use basalt::board::{Color, Move, MoveFlag, Piece, Square};
use basalt::tt::{Bound, TranspositionTable};

/// Derive the only score this test ever stores under `key`, so a probe can
/// verify the returned value belongs to its key.
fn score_for(key: u64) -> i32 {
    (key % 4001) as i32 - 2000
}

fn move_for(key: u64) -> Move {
    Move::new(
        Square::from_index((key & 63) as usize),
        Square::from_index((key >> 6 & 63) as usize),
        Piece::from_index((key >> 12 & 3) as usize),
        None,
        Color::White,
        MoveFlag::None,
    )
}

#[test]
fn concurrent_probes_never_return_foreign_data() {
    let tt = Arc::new(TranspositionTable::new(2));
    let stop = Arc::new(AtomicBool::new(false));
    let threads = 4;

    let writers: Vec<_> = (0..threads)
        .map(|t| {
            let tt = Arc::clone(&tt);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut key = 0x9e37_79b9u64.wrapping_mul(t as u64 + 1);
                while !stop.load(Ordering::Relaxed) {
                    key = key.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                    tt.store(key, move_for(key), score_for(key), Bound::Exact, 5, 0, 1);
                    if let Some(hit) = tt.probe(key, 0, 1) {
                        // an entry under this key must carry this key's data
                        assert_eq!(hit.sc, score_for(key), "foreign score for key {key:#x}");
                        assert_eq!(hit.mv, move_for(key), "foreign move for key {key:#x}");
                        assert_eq!(hit.bd, Bound::Exact);
                        assert_eq!(hit.dt, 5);
                    }
                }
            })
        })
        .collect();

    std::thread::sleep(Duration::from_millis(500));
    stop.store(true, Ordering::Relaxed);
    for writer in writers {
        writer.join().unwrap();
    }
}

#[test]
fn replacement_evicts_the_oldest_shallowest_entry() {
    let tt = TranspositionTable::new(2);
    // the low two key bits are masked out, so keys 8..=11 share a bucket,
    // as does 8 + 2^17 (the table holds 2^17 slots at 2 MiB)
    let stale = 11;
    tt.store(stale, Move::NULL, 5, Bound::Exact, 1, 0, 2);
    tt.store(8, Move::NULL, 10, Bound::Exact, 20, 0, 30);
    tt.store(9, Move::NULL, 15, Bound::Exact, 15, 0, 30);
    tt.store(10, Move::NULL, 20, Bound::Exact, 10, 0, 30);

    // a fifth key in the full bucket must push out the stale entry
    let fifth = 8 + (1u64 << 17);
    tt.store(fifth, Move::NULL, 25, Bound::Exact, 5, 0, 30);
    assert!(tt.probe(stale, 0, 30).is_none(), "stale entry survived");
    for key in [8, 9, 10, fifth] {
        assert!(tt.probe(key, 0, 30).is_some(), "fresh entry {key} evicted");
    }
}

#[test]
fn future_entries_are_evicted_first() {
    let tt = TranspositionTable::new(2);
    // an entry stamped after a game rewind ("from the future")
    tt.store(16, Move::NULL, 10, Bound::Exact, 30, 0, 500);

    // storing at an earlier game age replaces it immediately
    tt.store(17, Move::NULL, 20, Bound::Exact, 1, 0, 3);
    assert!(tt.probe(16, 0, 3).is_none(), "future entry survived");
    assert!(tt.probe(17, 0, 3).is_some());
}
