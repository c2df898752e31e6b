//! Bitboard position model: types, attack tables, FEN, make-move, staged
//! move generation and static exchange evaluation.

pub mod attack_tables;
pub mod fen;
pub mod make_unmake;
pub mod masks;
pub mod movegen;
#[cfg(test)]
mod proptests;
pub mod see;
pub mod state;
pub mod types;
pub mod zobrist;

pub use fen::{FenError, START_FEN};
pub use make_unmake::NullState;
pub use movegen::{Generator, LegalGen, PseudoGen};
pub use state::{Board, REP_HISTORY};
pub use types::{
    Bitboard, CastleRights, Color, KillerPair, Move, MoveFlag, MoveList, Piece, Square, Wing,
    MAX_MOVES,
};
