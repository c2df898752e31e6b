//! Property-based tests: random legal games must preserve every board
//! invariant.

use proptest::prelude::*;
use rand::prelude::*;
use rand::Rng;

use super::movegen::{perft_legal, perft_pseudo, LegalGen};
use super::state::Board;
use super::types::bitboard;
use super::types::Piece;

const GAME_FENS: [&str; 4] = [
    super::fen::START_FEN,
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "bqnb1rkr/pp3ppp/3ppn2/2p5/5P2/P2P4/NPP1P1PP/BQ1BNRKR w HFhf - 2 9",
];

fn fen_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(GAME_FENS.as_slice())
}

/// Walk a random legal game, handing every intermediate position to `check`.
fn random_game(fen: &str, seed: u64, plies: usize, mut check: impl FnMut(&Board)) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pos = Board::from_fen(fen).expect("test FEN parses");
    check(&pos);

    for _ in 0..plies {
        let mut gen = LegalGen::new(&pos);
        if gen.gen_all() == 0 {
            break;
        }
        let mv = gen.list.get(rng.gen_range(0..gen.list.len()));
        pos.make_move(mv);
        check(&pos);
    }
}

proptest! {
    /// Incremental Zobrist keys always equal the from-scratch recomputation.
    #[test]
    fn prop_incremental_keys_match_scratch(
        fen in fen_strategy(),
        seed in any::<u64>(),
        plies in 1..60usize,
    ) {
        random_game(fen, seed, plies, |pos| {
            assert_eq!(pos.key(), pos.scratch_key());
            assert_eq!(pos.kingpawn_key(), pos.scratch_kingpawn_key());
        });
    }

    /// Make followed by a snapshot copy restores the position byte-exactly.
    #[test]
    fn prop_make_copy_restore_is_identity(
        fen in fen_strategy(),
        seed in any::<u64>(),
        plies in 1..60usize,
    ) {
        random_game(fen, seed, plies, |pos| {
            let mut gen = LegalGen::new(pos);
            gen.gen_all();
            let mut work = gen.pos;
            for &mv in gen.list.iter() {
                work.make_move(mv);
                gen.revert(&mut work);
                assert_eq!(&work, pos, "restore differs after {mv}");
            }
        });
    }

    /// The structural invariants of the board hold at every node.
    #[test]
    fn prop_board_invariants_hold(
        fen in fen_strategy(),
        seed in any::<u64>(),
        plies in 1..60usize,
    ) {
        random_game(fen, seed, plies, |pos| {
            use super::types::Color;

            assert_eq!(pos.side(Color::White) & pos.side(Color::Black), 0);
            assert_eq!(pos.side(Color::White) | pos.side(Color::Black), pos.occupied());
            for cl in Color::BOTH {
                let kings = pos.pieces_of(cl, Piece::King);
                assert_eq!(bitboard::popcnt(kings), 1);
                assert_eq!(bitboard::lsb(kings), pos.king(cl));
            }
            for sq in super::types::Square::all() {
                match pos.piece_on(sq) {
                    Some(pc) => assert!(pos.pieces(pc) & bitboard::bit(sq) != 0),
                    None => assert_eq!(pos.occupied() & bitboard::bit(sq), 0),
                }
            }
            // the previous mover must not have left its king attacked
            assert!(pos.legal());
        });
    }

    /// Legal generation and filtered pseudo-legal generation agree along
    /// random games, not only at curated positions.
    #[test]
    fn prop_generation_modes_agree(
        fen in fen_strategy(),
        seed in any::<u64>(),
        plies in 1..30usize,
    ) {
        random_game(fen, seed, plies, |pos| {
            assert_eq!(perft_legal(pos, 1), perft_pseudo(pos, 1));
        });
    }

    /// `gives_check` predicts the post-make in-check state exactly.
    #[test]
    fn prop_gives_check_matches_make(
        fen in fen_strategy(),
        seed in any::<u64>(),
        plies in 1..40usize,
    ) {
        random_game(fen, seed, plies, |pos| {
            let mut gen = LegalGen::new(pos);
            gen.gen_all();
            let mut work = gen.pos;
            for &mv in gen.list.iter() {
                let predicted = pos.gives_check(mv);
                work.make_move(mv);
                assert_eq!(predicted, work.in_check(), "gives_check wrong for {mv}");
                gen.revert(&mut work);
            }
        });
    }
}
