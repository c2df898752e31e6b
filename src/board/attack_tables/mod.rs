//! Attack generation for all piece kinds.
//!
//! Leapers come from precomputed tables, sliders from the shared
//! magic-indexed attack table.

mod magics;
mod tables;

pub use magics::{bishop_attacks, rook_attacks};
pub use tables::{KING_ATTACKS, KNIGHT_ATTACKS, PAWN_ATTACKS};

use super::types::bitboard::Bitboard;
use super::types::{Color, Piece, Square};

#[inline]
#[must_use]
pub fn queen_attacks(sq: usize, occ: Bitboard) -> Bitboard {
    bishop_attacks(sq, occ) | rook_attacks(sq, occ)
}

/// All squares attacked by `pc` of color `cl` standing on `sq`.
#[inline]
#[must_use]
pub fn by_piece(pc: Piece, sq: Square, cl: Color, occ: Bitboard) -> Bitboard {
    let sq = sq.index();
    match pc {
        Piece::Pawn => PAWN_ATTACKS[cl.index()][sq],
        Piece::Knight => KNIGHT_ATTACKS[sq],
        Piece::Bishop => bishop_attacks(sq, occ),
        Piece::Rook => rook_attacks(sq, occ),
        Piece::Queen => queen_attacks(sq, occ),
        Piece::King => KING_ATTACKS[sq],
    }
}
