//! Search behavior: mates, draws, repetition, stop latency.
//!
//! The long mate hunts (mate in 7 and the king-and-pawn mate in 22) run
//! under `--ignored`; the default suite keeps to depths that finish in a
//! few seconds even in debug builds.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use basalt::board::{Board, Move, REP_HISTORY};
use basalt::score;
use basalt::search::abdada::DeferMap;
use basalt::search::time::{MoveTime, HIT_THRESHOLD};
use basalt::search::{Limits, SearchJob, Shared, SyzygyConf, ThreadPool};
use basalt::syzygy::Tablebases;
use basalt::tt::TranspositionTable;

fn job(fen: &str, depth: i32, threads: usize, multipv: usize) -> SearchJob {
    let pos = Board::from_fen(fen).unwrap();
    let mut game_hash = [0u64; REP_HISTORY];
    game_hash[0] = pos.key();
    SearchJob {
        pos,
        shared: Arc::new(Shared {
            tt: Arc::new(TranspositionTable::new(16)),
            tbs: Arc::new(Tablebases::new()),
            defer: DeferMap::new(),
            stop: AtomicBool::new(false),
            infinite: AtomicBool::new(false),
            limits: Limits {
                depth,
                ..Default::default()
            },
            syzygy: SyzygyConf::default(),
            use_abdada: threads > 1,
            thread_cnt: threads,
            multipv,
            chess960: false,
            movetime: MoveTime::infinite(),
            hit_threshold: HIT_THRESHOLD,
            game_hash,
            mv_offset: 0,
            age: 1,
            nodes: (0..threads).map(|_| AtomicI64::new(0)).collect(),
            tbhits: (0..threads).map(|_| AtomicI64::new(0)).collect(),
        }),
    }
}

fn best_move(fen: &str, depth: i32) -> (Move, i32) {
    let pool = ThreadPool::new(1);
    let (best, _) = pool.run(job(fen, depth, 1, 1));
    (best, pool.best_score())
}

#[test]
fn mate_in_three_by_knight_promotion() {
    // the only mate starts with an underpromotion
    let (best, sc) = best_move("5B2/6P1/1p6/8/1N6/kP6/2K5/8 w - - 0 1", 10);
    assert_eq!(best.to_uci(false), "g7g8n");
    assert!(score::is_mate(sc), "expected a mate score, got {sc}");
    assert_eq!(score::mate_in(sc), 3);
}

#[test]
#[ignore = "mate in 7 needs depth 24; minutes in debug builds"]
fn mate_in_seven_rook_endgame() {
    let (best, sc) = best_move("8/8/p3R3/1p5p/1P5p/6rp/5K1p/7k w - - 0 1", 24);
    assert_eq!(best.to_uci(false), "e6e1");
    assert!(score::is_mate(sc));
}

#[test]
#[ignore = "king-and-pawn mate in 22 needs depth 25; minutes in debug builds"]
fn mate_in_twenty_two_kpk() {
    let (best, sc) = best_move("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1", 25);
    assert!(
        matches!(best.to_uci(false).as_str(), "e1d2" | "e1f2"),
        "expected a king march, got {best}"
    );
    assert!(score::is_mate(sc));
}

#[test]
fn stalemate_root_has_no_move() {
    // black has no legal move but is not in check; the search returns the
    // null move and the score stays unset (shown as "cp 0" over UCI)
    let (best, sc) = best_move("4k3/4P1p1/4K1P1/2p5/1pP5/1P1N2B1/8/8 b - - 0 1", 1);
    assert!(best.is_null());
    assert_eq!(sc, score::NONE);
}

#[test]
fn avoids_stalemating_a_won_position() {
    // Qb6 would be stalemate; Qb7 is mate on the spot
    let (best, sc) = best_move("k7/8/2K5/8/8/8/8/1Q6 w - - 0 1", 6);
    assert_ne!(best.to_uci(false), "b1b6");
    assert_eq!(best.to_uci(false), "b1b7");
    assert!(score::is_mate(sc));
    assert_eq!(score::mate_in(sc), 1);
}

#[test]
fn fifty_move_rule_scores_draw() {
    // any quiet reply reaches halfmove clock 100
    let (_, sc) = best_move("8/1kn5/pn6/P6P/6r1/5K2/2r5/8 w - - 99 120", 3);
    assert_eq!(sc, score::DRAW);
}

#[test]
fn repetition_is_a_draw_on_second_occurrence() {
    let mut pos = Board::startpos();
    let mut hist = [0u64; REP_HISTORY];
    let mut offset = 0;
    hist[offset] = pos.key();

    // knight shuffle back to the start position: the fourth move closes the
    // loop and counts as the (first) repetition
    for (i, token) in ["g1f3", "g8f6", "f3g1", "f6g8"].iter().enumerate() {
        let mut gen = basalt::board::LegalGen::new(&pos);
        gen.gen_all();
        let mv = gen
            .list
            .iter()
            .copied()
            .find(|mv| mv.to_uci(false) == *token)
            .expect("legal shuffle move");
        pos.make_move(mv);
        offset += 1;
        let repeated = pos.draw(&mut hist, offset);
        assert_eq!(repeated, i == 3, "unexpected draw state after {token}");
    }

    assert_eq!(pos.key(), hist[0], "shuffle must return to the start position");
    assert!(pos.repetition(&hist, offset));
}

#[test]
fn stop_is_observed_promptly() {
    let pool = Arc::new(ThreadPool::new(2));
    let deep = job(
        "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
        score::MAX_DEPTH,
        2,
        1,
    );
    let shared = Arc::clone(&deep.shared);

    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        shared.stop.store(true, Ordering::Relaxed);
    });

    let start = Instant::now();
    let (best, _) = pool.run(deep);
    stopper.join().unwrap();

    assert!(!best.is_null());
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "search must unwind within a node-check interval of the stop flag"
    );
}

#[test]
fn multipv_search_completes() {
    // two-line analysis walks the exclude/include root paths
    let pool = ThreadPool::new(1);
    let two_lines = job(
        "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4",
        6,
        1,
        2,
    );
    let (best, _) = pool.run(two_lines);
    assert!(!best.is_null());
}

#[test]
fn searchmoves_restricts_the_root() {
    let pos = Board::startpos();
    let mut gen = basalt::board::LegalGen::new(&pos);
    gen.gen_all();
    let only = gen
        .list
        .iter()
        .copied()
        .find(|mv| mv.to_uci(false) == "a2a3")
        .unwrap();

    let mut restricted = job(basalt::board::START_FEN, 4, 1, 1);
    Arc::get_mut(&mut restricted.shared).unwrap().limits.searchmoves = vec![only];

    let pool = ThreadPool::new(1);
    let (best, _) = pool.run(restricted);
    assert_eq!(best, only, "the search may only pick from searchmoves");
}
