//! Zobrist hashing for positions, king-pawn structures and material
//! signatures.

use std::sync::LazyLock;

use rand::prelude::*;

use super::masks;
use super::types::bitboard::{self, Bitboard};
use super::types::{Color, Move, Piece, Square, Wing};

pub struct ZobristKeys {
    /// `piece[color][piece][square]`
    pub piece: [[[u64; 64]; 6]; 2],
    /// `castle[color][wing]`
    pub castle: [[u64; 2]; 2],
    /// `ep[file]`
    pub ep: [u64; 8],
    /// side-to-move toggle
    pub turn: u64,
}

pub static KEYS: LazyLock<ZobristKeys> = LazyLock::new(|| {
    // fixed seed keeps hashes reproducible across runs
    let mut rng = StdRng::seed_from_u64(5489);
    let mut keys = ZobristKeys {
        piece: [[[0; 64]; 6]; 2],
        castle: [[0; 2]; 2],
        ep: [0; 8],
        turn: 0,
    };
    for cl in &mut keys.piece {
        for pc in cl.iter_mut() {
            for key in pc.iter_mut() {
                *key = rng.gen();
            }
        }
    }
    for cl in &mut keys.castle {
        for key in cl.iter_mut() {
            *key = rng.gen();
        }
    }
    for key in &mut keys.ep {
        *key = rng.gen();
    }
    keys.turn = rng.gen();
    keys
});

#[inline]
#[must_use]
pub fn piece_key(cl: Color, pc: Piece, sq: Square) -> u64 {
    KEYS.piece[cl.index()][pc.index()][sq.index()]
}

#[inline]
#[must_use]
pub fn castle_key(cl: Color, wing: Wing) -> u64 {
    KEYS.castle[cl.index()][wing.index()]
}

/// The en-passant file is hashed only when a capturer actually stands ready,
/// which keeps repetition detection free of phantom EP states.
#[inline]
#[must_use]
pub fn ep_key_if_capturable(
    pawns: Bitboard,
    capturer_side: Bitboard,
    pusher: Color,
    ep_rear: Bitboard,
) -> u64 {
    if ep_rear == 0 {
        return 0;
    }
    let file = bitboard::lsb(ep_rear).file();
    if pawns & capturer_side & masks::EP_ADJACENT[pusher.index()][file] != 0 {
        KEYS.ep[file]
    } else {
        0
    }
}

/// 32-bit move hash feeding the concurrent-search defer map.
#[inline]
#[must_use]
pub fn move_key32(mv: Move, pos_key: u64) -> u32 {
    (pos_key as u32) ^ mv.raw().wrapping_mul(1_664_525).wrapping_add(1_013_904_223)
}

/// TT key of a node while a singular candidate is excluded.
#[inline]
#[must_use]
pub fn singular_key(pos_key: u64, excluded: Move) -> u64 {
    pos_key ^ u64::from(excluded.raw())
}

/// Material signature over piece counts, used to address tablebase entries.
/// With `mirror` the colors are swapped before keying.
#[must_use]
pub fn material_key(counts: &[[u8; 6]; 2], mirror: bool) -> u64 {
    let mut key = 0u64;
    for key_cl in Color::BOTH {
        let cl = if mirror { !key_cl } else { key_cl };
        for pc in Piece::ALL {
            for n in 0..counts[cl.index()][pc.index()] {
                key ^= KEYS.piece[key_cl.index()][pc.index()][n as usize];
            }
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_distinct_and_stable() {
        assert_ne!(
            piece_key(Color::White, Piece::Pawn, Square::E1),
            piece_key(Color::Black, Piece::Pawn, Square::E1)
        );
        // same seed, same table
        assert_eq!(KEYS.turn, KEYS.turn);
        assert_ne!(KEYS.turn, 0);
    }

    #[test]
    fn material_key_mirror_swaps_colors() {
        let mut counts = [[0u8; 6]; 2];
        counts[0][Piece::King.index()] = 1;
        counts[1][Piece::King.index()] = 1;
        counts[0][Piece::Queen.index()] = 1;
        let kqk = material_key(&counts, false);
        let mut mirrored = [[0u8; 6]; 2];
        mirrored[1][Piece::King.index()] = 1;
        mirrored[0][Piece::King.index()] = 1;
        mirrored[1][Piece::Queen.index()] = 1;
        assert_eq!(material_key(&mirrored, true), kqk);
        assert_ne!(material_key(&mirrored, false), kqk);
    }

    #[test]
    fn singular_key_differs_from_plain() {
        let mv = Move::from_raw(0x1234);
        assert_ne!(singular_key(42, mv), 42);
        assert_eq!(singular_key(singular_key(42, mv), mv), 42);
    }
}
