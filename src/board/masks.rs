//! Precomputed geometric bitmask tables.
//!
//! Everything here depends only on board geometry and is built once on first
//! use.

use std::sync::LazyLock;

use super::types::bitboard::{self, Bitboard};
use super::types::{Color, Square};

/// Adjacent files per file index.
pub static ADJACENT_FILES: LazyLock<[Bitboard; 8]> = LazyLock::new(|| {
    let mut masks = [0u64; 8];
    for (fl, slot) in masks.iter_mut().enumerate() {
        if fl > 0 {
            *slot |= bitboard::FILES[fl - 1];
        }
        if fl < 7 {
            *slot |= bitboard::FILES[fl + 1];
        }
    }
    masks
});

/// Squares from which a pawn could capture en passant, indexed by the
/// double-pusher's color and the push file.
pub static EP_ADJACENT: LazyLock<[[Bitboard; 8]; 2]> = LazyLock::new(|| {
    let mut masks = [[0u64; 8]; 2];
    for fl in 0..8 {
        masks[0][fl] = ADJACENT_FILES[fl] & bitboard::RANKS[3];
        masks[1][fl] = ADJACENT_FILES[fl] & bitboard::RANKS[4];
    }
    masks
});

/// All squares on ranks strictly ahead of the square, per color.
pub static IN_FRONT: LazyLock<[[Bitboard; 64]; 2]> = LazyLock::new(|| {
    let mut masks = [[0u64; 64]; 2];
    for sq in 0..64 {
        let rank_mask = bitboard::RANKS[sq / 8];
        let sq_bit = 1u64 << sq;
        masks[0][sq] = !(sq_bit - 1) & !rank_mask;
        masks[1][sq] = (sq_bit - 1) & !rank_mask;
    }
    masks
});

/// The square's own file ahead of it, per color.
pub static FILE_IN_FRONT: LazyLock<[[Bitboard; 64]; 2]> = LazyLock::new(|| {
    let mut masks = [[0u64; 64]; 2];
    for sq in 0..64 {
        let file_mask = bitboard::FILES[sq % 8];
        masks[0][sq] = IN_FRONT[0][sq] & file_mask;
        masks[1][sq] = IN_FRONT[1][sq] & file_mask;
    }
    masks
});

/// Own plus adjacent files ahead of the square (passed-pawn detection).
pub static FRONT_SPAN: LazyLock<[[Bitboard; 64]; 2]> = LazyLock::new(|| {
    let mut masks = [[0u64; 64]; 2];
    for sq in 0..64 {
        let span = bitboard::FILES[sq % 8] | ADJACENT_FILES[sq % 8];
        masks[0][sq] = IN_FRONT[0][sq] & span;
        masks[1][sq] = IN_FRONT[1][sq] & span;
    }
    masks
});

/// Index range between two squares, endpoints included. Only meaningful for
/// castling path tests where both squares share a rank.
pub static BETWEEN: LazyLock<Box<[[Bitboard; 64]; 64]>> = LazyLock::new(|| {
    let mut masks = Box::new([[0u64; 64]; 64]);
    for a in 0..64usize {
        for b in 0..64usize {
            let (lo, hi) = (a.min(b), a.max(b));
            let upper = if hi == 63 { !0 } else { (1u64 << (hi + 1)) - 1 };
            masks[a][b] = upper & !((1u64 << lo) - 1);
        }
    }
    masks
});

/// Closed line segment from `a` to `b` when they share a rank, file or
/// diagonal; zero otherwise.
pub static RAY: LazyLock<Box<[[Bitboard; 64]; 64]>> = LazyLock::new(|| {
    let deltas: [(isize, isize); 8] = [
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
        (-1, 0),
        (-1, -1),
        (0, -1),
        (1, -1),
    ];
    let mut masks = Box::new([[0u64; 64]; 64]);
    for a in 0..64usize {
        for b in 0..64usize {
            if a == b {
                continue;
            }
            'dirs: for (dr, df) in deltas {
                let mut ray = 1u64 << a;
                let mut r = (a / 8) as isize;
                let mut f = (a % 8) as isize;
                loop {
                    r += dr;
                    f += df;
                    if !(0..8).contains(&r) || !(0..8).contains(&f) {
                        break;
                    }
                    ray |= 1u64 << (r * 8 + f);
                    if (r * 8 + f) as usize == b {
                        masks[a][b] = ray;
                        break 'dirs;
                    }
                }
            }
        }
    }
    masks
});

/// King neighborhood extended one rank forward, per color.
pub static KING_ZONE: LazyLock<[[Bitboard; 64]; 2]> = LazyLock::new(|| {
    let mut masks = [[0u64; 64]; 2];
    for sq in 0..64 {
        let attacks = super::attack_tables::KING_ATTACKS[sq];
        masks[0][sq] = attacks | bitboard::push(attacks, Color::White);
        masks[1][sq] = attacks | bitboard::push(attacks, Color::Black);
    }
    masks
});

/// Squares holding a friendly pawn that makes the pawn on `sq` connected:
/// same-rank neighbors (phalanx) or diagonal defenders.
pub static CONNECTED: LazyLock<[[Bitboard; 64]; 2]> = LazyLock::new(|| {
    let mut masks = [[0u64; 64]; 2];
    for sq in 0..64 {
        let phalanx = ADJACENT_FILES[sq % 8] & bitboard::RANKS[sq / 8];
        let sq_bit = 1u64 << sq;
        masks[0][sq] = phalanx | bitboard::pawn_attacks(sq_bit, Color::Black);
        masks[1][sq] = phalanx | bitboard::pawn_attacks(sq_bit, Color::White);
    }
    masks
});

#[inline]
#[must_use]
pub fn between(a: Square, b: Square) -> Bitboard {
    BETWEEN[a.index()][b.index()]
}

#[inline]
#[must_use]
pub fn ray(a: Square, b: Square) -> Bitboard {
    RAY[a.index()][b.index()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::types::bitboard::{bit, popcnt};

    #[test]
    fn ray_segments_are_closed() {
        // e1..e8: whole e-file
        assert_eq!(
            ray(Square::E1, Square::E8),
            bitboard::FILES[4],
        );
        // a1..h8 diagonal has 8 squares
        let diag = ray(Square::A1, Square::H8);
        assert_eq!(popcnt(diag), 8);
        assert!(diag & bit(Square::A1) != 0 && diag & bit(Square::H8) != 0);
        // unaligned squares have no ray
        assert_eq!(ray(Square::A1, Square::from_coords(1, 2)), 0);
    }

    #[test]
    fn front_span_covers_passed_pawn_zone() {
        let sq = Square::from_coords(4, 3); // e4
        let span = FRONT_SPAN[Color::White.index()][sq.index()];
        assert!(span & bit(Square::from_coords(3, 4)) != 0); // d5
        assert!(span & bit(Square::from_coords(5, 6)) != 0); // f7
        assert!(span & bit(Square::from_coords(4, 3)) == 0);
        assert!(span & bit(Square::from_coords(4, 2)) == 0);
    }

    #[test]
    fn between_is_an_index_range() {
        let range = between(Square::E1, Square::H1);
        assert_eq!(popcnt(range), 4);
        assert!(range & bit(Square::F1) != 0);
        assert!(range & bit(Square::E1) != 0);
    }
}
