//! Benchmark and perft harnesses behind the unofficial `bench` and `perft`
//! commands.

use std::time::Instant;

use crate::board::{movegen, Board};
use crate::logger;
use crate::uci::Engine;

/// Mixed opening/middlegame/endgame suite searched by `bench`.
pub const BENCH_POSITIONS: &[&str] = &[
    crate::board::START_FEN,
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "4rrk1/pp1n3p/3q2pQ/2p1pb2/2PP4/2P3N1/P2B2PP/4RRK1 b - - 7 19",
    "r3r1k1/2p2ppp/p1p1bn2/8/1q2P3/2NPQN2/PPP3PP/R4RK1 b - - 2 15",
    "2rqkb1r/ppp2p2/2npb1p1/1N1Nn2p/2P1PP2/8/PP2B1PP/R1BQK2R b KQ - 0 11",
    "3rr1k1/pp3pp1/1qn2np1/8/3p4/PP1R1P2/2P1NQPP/R1B3K1 b - - 4 20",
    "5B2/6P1/1p6/8/1N6/kP6/2K5/8 w - - 0 1",
    "8/8/p3R3/1p5p/1P5p/6rp/5K1p/7k w - - 0 1",
    "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1",
    "8/1kn5/pn6/P6P/6r1/5K2/2r5/8 w - - 99 120",
    "8/5p2/8/2k3P1/p3K3/8/1P6/8 b - - 0 1",
];

/// Search every bench position for `movetime` milliseconds and report the
/// accumulated node count.
pub fn run(engine: &mut Engine, movetime: u64) {
    let start = Instant::now();
    let mut nodes: i64 = 0;

    for (i, fen) in BENCH_POSITIONS.iter().enumerate() {
        logger::emit(&format!("position {}/{}", i + 1, BENCH_POSITIONS.len()));
        engine.set_bench_position(fen);
        nodes += engine.search_blocking(movetime);
    }
    engine.set_bench_position(crate::board::START_FEN);

    let elapsed = start.elapsed().as_millis().max(1) as i64;
    logger::emit("");
    logger::emit(&format!("time  : {elapsed} ms"));
    logger::emit(&format!("nodes : {nodes}"));
    logger::emit(&format!("nps   : {}", nodes * 1000 / elapsed));
}

/// Walk the move-generation tree and report per-depth node counts.
pub fn perft(pos: &Board, depth: u32, pseudo: bool) {
    for dt in 1..=depth {
        let start = Instant::now();
        let nodes = if pseudo {
            movegen::perft_pseudo(pos, dt)
        } else {
            movegen::perft_legal(pos, dt)
        };
        let ms = start.elapsed().as_millis().max(1) as u64;
        logger::emit(&format!(
            "depth {dt:2} nodes {nodes:12} time {ms:6} ms nps {}",
            nodes * 1000 / ms
        ));
    }
}
