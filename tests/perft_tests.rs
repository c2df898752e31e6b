//! Perft verification of the move generator, legal and pseudo-legal.
//!
//! The canonical full-depth totals run under `--ignored`; the default
//! suite checks shallower prefixes of the same positions.

use basalt::board::movegen::{perft_legal, perft_pseudo};
use basalt::board::{Board, START_FEN};

struct PerftPosition {
    fen: &'static str,
    depths: &'static [(u32, u64)],
    full: (u32, u64),
}

const POSITIONS: &[PerftPosition] = &[
    PerftPosition {
        fen: START_FEN,
        depths: &[(1, 20), (2, 400), (3, 8_902), (4, 197_281), (5, 4_865_609)],
        full: (6, 119_060_324),
    },
    PerftPosition {
        fen: "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        depths: &[(1, 48), (2, 2_039), (3, 97_862), (4, 4_085_603)],
        full: (5, 193_690_690),
    },
    PerftPosition {
        fen: "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        depths: &[(1, 44), (2, 1_486), (3, 62_379), (4, 2_103_487)],
        full: (5, 89_941_194),
    },
    PerftPosition {
        fen: "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        depths: &[(1, 14), (2, 191), (3, 2_812), (4, 43_238), (5, 674_624)],
        full: (7, 178_633_661),
    },
    PerftPosition {
        fen: "8/5p2/8/2k3P1/p3K3/8/1P6/8 b - - 0 1",
        depths: &[(1, 9), (2, 85), (3, 795), (4, 7_658), (5, 72_120)],
        full: (8, 64_451_405),
    },
];

#[test]
fn perft_shallow() {
    for position in POSITIONS {
        let pos = Board::from_fen(position.fen).unwrap();
        for &(depth, expected) in position.depths {
            assert_eq!(
                perft_legal(&pos, depth),
                expected,
                "legal perft, {} depth {depth}",
                position.fen
            );
        }
    }
}

#[test]
fn legal_and_pseudo_agree() {
    for position in POSITIONS {
        let pos = Board::from_fen(position.fen).unwrap();
        for &(depth, expected) in position.depths.iter().take(4) {
            assert_eq!(perft_pseudo(&pos, depth), expected, "{}", position.fen);
        }
    }
}

#[test]
#[ignore = "full perft totals take minutes in debug builds"]
fn perft_full_totals() {
    for position in POSITIONS {
        let pos = Board::from_fen(position.fen).unwrap();
        let (depth, expected) = position.full;
        assert_eq!(perft_legal(&pos, depth), expected, "{}", position.fen);
        assert_eq!(perft_pseudo(&pos, depth), expected, "{}", position.fen);
    }
}

#[test]
fn frc_castling_positions() {
    // shuffled back ranks with castling rights on both wings
    let fens = [
        "bqnb1rkr/pp3ppp/3ppn2/2p5/5P2/P2P4/NPP1P1PP/BQ1BNRKR w HFhf - 2 9",
        "2nnrbkr/p1qppppp/8/1ppb4/6PP/3PP3/PPP2P2/BQNNRBKR w HEhe - 1 9",
        "b1q1rrkb/pppppppp/3nn3/8/P7/1PPP4/4PPPP/BQNNRKRB w GE - 1 9",
    ];
    for fen in fens {
        let pos = Board::from_fen(fen).unwrap();
        for depth in 1..=3 {
            assert_eq!(
                perft_legal(&pos, depth),
                perft_pseudo(&pos, depth),
                "{fen} depth {depth}"
            );
        }
    }
}
