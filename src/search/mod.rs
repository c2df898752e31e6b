//! Search: iterative-deepening principal-variation search with quiescence,
//! a staged move picker, pruning/reduction heuristics and multi-threading
//! (shared hash table or ABDADA).

pub mod abdada;
mod alphabeta;
pub mod history;
pub mod picker;
pub mod thread;
pub mod time;

pub use thread::{SearchJob, ThreadPool};

use std::sync::atomic::{AtomicBool, AtomicI64};
use std::sync::Arc;

use crate::board::{KillerPair, Move, NullState, REP_HISTORY, MAX_MOVES};
use crate::score;
use crate::syzygy::Tablebases;
use crate::tt::TranspositionTable;

use abdada::DeferMap;
use time::MoveTime;

pub(crate) const STACK_SIZE: usize = score::MAX_DEPTH as usize + 1;

/// Limits from the `go` command.
#[derive(Clone, Debug)]
pub struct Limits {
    pub searchmoves: Vec<Move>,
    pub nodes: i64,
    pub depth: i32,
    pub mate: i32,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            searchmoves: Vec::new(),
            nodes: i64::MAX,
            depth: score::MAX_DEPTH,
            mate: 0,
        }
    }
}

/// Syzygy probe configuration.
#[derive(Clone, Copy, Debug)]
pub struct SyzygyConf {
    pub pieces: i32,
    pub depth: i32,
}

impl Default for SyzygyConf {
    fn default() -> Self {
        SyzygyConf {
            pieces: crate::syzygy::MAX_PIECES,
            depth: 5,
        }
    }
}

/// Everything the workers share for one search.
pub struct Shared {
    pub tt: Arc<TranspositionTable>,
    pub tbs: Arc<Tablebases>,
    pub defer: DeferMap,
    pub stop: AtomicBool,
    /// `go infinite` / `go ponder`; cleared by `stop` and `ponderhit`.
    pub infinite: AtomicBool,
    pub limits: Limits,
    pub syzygy: SyzygyConf,
    pub use_abdada: bool,
    pub thread_cnt: usize,
    pub multipv: usize,
    pub chess960: bool,
    pub movetime: MoveTime,
    pub hit_threshold: i64,
    /// Game history for repetition detection, parallel to the UCI position
    /// stream.
    pub game_hash: [u64; REP_HISTORY],
    pub mv_offset: usize,
    /// Game half-move count, doubling as the TT age.
    pub age: u16,
    /// Per-worker node counters, flushed at every clock check.
    pub nodes: Vec<AtomicI64>,
    pub tbhits: Vec<AtomicI64>,
}

impl Shared {
    #[must_use]
    pub fn total_nodes(&self) -> i64 {
        self.nodes
            .iter()
            .map(|n| n.load(std::sync::atomic::Ordering::Relaxed))
            .sum()
    }

    #[must_use]
    pub fn total_tbhits(&self) -> i64 {
        self.tbhits
            .iter()
            .map(|n| n.load(std::sync::atomic::Ordering::Relaxed))
            .sum()
    }
}

/// One ply of the per-thread search stack.
#[derive(Clone)]
pub struct Frame {
    /// Ply index of this frame.
    pub dt: i32,
    /// Static eval at this ply, `score::NONE` when skipped.
    pub sc: i32,
    pub mv: Move,
    pub singular_mv: Move,
    pub killer: KillerPair,
    pub null_saved: Option<NullState>,
    pub quiet_mv: [Move; MAX_MOVES],
    pub defer_mv: [Move; MAX_MOVES],
    /// Original move counts of deferred moves, replayed in the second pass.
    pub mv_cnt: [i32; MAX_MOVES],
    pub pruning: bool,
}

impl Frame {
    fn fresh(dt: i32) -> Self {
        Frame {
            dt,
            sc: score::NONE,
            mv: Move::NULL,
            singular_mv: Move::NULL,
            killer: [Move::NULL; 2],
            null_saved: None,
            quiet_mv: [Move::NULL; MAX_MOVES],
            defer_mv: [Move::NULL; MAX_MOVES],
            mv_cnt: [0; MAX_MOVES],
            pruning: true,
        }
    }
}

/// Provisional variation bubbling up during the search.
#[derive(Clone)]
pub struct Variation {
    pub mv: [Move; STACK_SIZE],
    pub cnt: usize,
}

impl Variation {
    #[must_use]
    pub fn new() -> Self {
        Variation {
            mv: [Move::NULL; STACK_SIZE],
            cnt: 0,
        }
    }

    /// Prepend `mv` to the child's variation.
    pub fn assemble(&mut self, mv: Move, next: &Variation) {
        self.cnt = 1 + next.cnt;
        self.mv[0] = mv;
        self.mv[1..=next.cnt].copy_from_slice(&next.mv[..next.cnt]);
    }
}

impl Default for Variation {
    fn default() -> Self {
        Variation::new()
    }
}

/// A committed principal variation (one per multi-PV slot).
#[derive(Clone)]
pub struct MoveVar {
    pub mv: [Move; STACK_SIZE],
    pub cnt: usize,
    pub dt: i32,
    pub seldt: i32,
    pub sc: i32,
    /// Set when a tablebase verdict overrode the search score; the PV is
    /// then truncated to its first move.
    pub wrong: bool,
}

impl MoveVar {
    #[must_use]
    pub fn new() -> Self {
        MoveVar {
            mv: [Move::NULL; STACK_SIZE],
            cnt: 0,
            dt: 0,
            seldt: 0,
            sc: score::NONE,
            wrong: false,
        }
    }

    /// Commit a new best root move with its continuation.
    pub fn commit(&mut self, mv: Move, next: &Variation) {
        self.cnt = 1 + next.cnt;
        self.mv[0] = mv;
        self.mv[1..=next.cnt].copy_from_slice(&next.mv[..next.cnt]);
    }
}

impl Default for MoveVar {
    fn default() -> Self {
        MoveVar::new()
    }
}

/// Per-worker mutable state, persistent across searches.
pub struct WorkerState {
    pub id: usize,
    pub hist: history::Histories,
    pub counters: history::CounterMoves,
    pub kingpawn: crate::eval::kingpawn::KingPawnHash,
    pub stack: Vec<Frame>,
    pub rep_hash: [u64; REP_HISTORY],
    pub pv: Vec<MoveVar>,
    pub chrono: time::Chronometer,
    pub nodes: i64,
    pub tbhits: i64,
    pub seldepth: i32,
    pub use_syzygy: bool,
}

impl WorkerState {
    #[must_use]
    pub fn new(id: usize) -> Self {
        WorkerState {
            id,
            hist: history::Histories::new(),
            counters: history::new_counter_moves(),
            kingpawn: crate::eval::kingpawn::KingPawnHash::new(),
            stack: (0..STACK_SIZE as i32).map(Frame::fresh).collect(),
            rep_hash: [0; REP_HISTORY],
            pv: Vec::new(),
            chrono: time::Chronometer::new(),
            nodes: 0,
            tbhits: 0,
            seldepth: 0,
            use_syzygy: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_main(&self) -> bool {
        self.id == 0
    }

    /// Reset the per-search state; histories survive between moves of a
    /// game, `ucinewgame` clears them separately.
    pub fn new_search(&mut self, ctx: &Shared) {
        self.nodes = 0;
        self.tbhits = 0;
        self.seldepth = 0;
        self.rep_hash[..=ctx.mv_offset].copy_from_slice(&ctx.game_hash[..=ctx.mv_offset]);
        for (dt, frame) in self.stack.iter_mut().enumerate() {
            *frame = Frame::fresh(dt as i32);
        }
        for cl in self.counters.iter_mut() {
            for pc in cl.iter_mut() {
                pc.fill(Move::NULL);
            }
        }
        self.pv.clear();
        self.pv.resize(ctx.multipv, MoveVar::new());
        self.chrono.set(ctx.movetime, ctx.hit_threshold);
    }

    /// Clear the long-lived tables for a new game.
    pub fn new_game(&mut self) {
        self.hist.clear();
        self.kingpawn.clear();
    }

    /// Sort the multi-PV slots by score for display.
    pub fn rearrange_pv(&mut self, mv_cnt: usize) {
        let end = self.pv.len().min(mv_cnt);
        self.pv[..end].sort_by(|a, b| b.sc.cmp(&a.sc));
    }
}
