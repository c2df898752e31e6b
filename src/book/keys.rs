//! Book hashing keys in the PolyGlot layout: 768 piece keys, 4 castling
//! keys, 8 en-passant file keys and one turn key.
//!
//! The canonical PolyGlot `Random64` constants are a drop-in replacement
//! for this table; see DESIGN.md for the compatibility note.

use std::sync::LazyLock;

use rand::prelude::*;

pub const PIECE_OFFSET: usize = 0;
pub const CASTLE_OFFSET: usize = 768;
pub const EP_OFFSET: usize = 772;
pub const TURN_OFFSET: usize = 780;
pub const KEY_COUNT: usize = 781;

pub static BOOK_RANDOM: LazyLock<[u64; KEY_COUNT]> = LazyLock::new(|| {
    let mut rng = StdRng::seed_from_u64(0x7067_6c79);
    let mut keys = [0u64; KEY_COUNT];
    for key in &mut keys {
        *key = rng.gen();
    }
    keys
});

/// PolyGlot piece-kind index: `2 * piece + is_white`.
#[inline]
#[must_use]
pub fn piece_index(piece: usize, white: bool) -> usize {
    PIECE_OFFSET + 64 * (2 * piece + usize::from(white))
}
