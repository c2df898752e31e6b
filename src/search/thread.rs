//! The worker pool.
//!
//! Workers are created once and cycle between idling on a condition
//! variable and searching; the main worker runs on the caller's thread. A
//! pool-wide `searching` counter gates the post-search join.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::board::{Board, Move};

use super::alphabeta::Searcher;
use super::{Shared, WorkerState};

/// A search order handed to every worker.
#[derive(Clone)]
pub struct SearchJob {
    pub pos: Board,
    pub shared: Arc<Shared>,
}

struct Gate {
    job: Option<SearchJob>,
    seq: u64,
    searching: usize,
    exit: bool,
}

struct PoolSync {
    gate: Mutex<Gate>,
    cv: Condvar,
}

pub struct ThreadPool {
    sync: Arc<PoolSync>,
    states: Vec<Arc<Mutex<WorkerState>>>,
    handles: Vec<JoinHandle<()>>,
}

fn worker_loop(id: usize, sync: Arc<PoolSync>, state: Arc<Mutex<WorkerState>>) {
    let mut seen = 0u64;
    loop {
        let job = {
            let mut gate = sync.gate.lock();
            sync.cv.wait_while(&mut gate, |g| !g.exit && g.seq == seen);
            if gate.exit {
                return;
            }
            seen = gate.seq;
            gate.job.clone()
        };
        let Some(job) = job else { continue };

        {
            let mut state = state.lock();
            debug_assert_eq!(state.id, id);
            state.new_search(&job.shared);
            let mut searcher = Searcher {
                w: &mut *state,
                ctx: &job.shared,
            };
            searcher.iterative_deepening(&job.pos);
        }

        let mut gate = sync.gate.lock();
        gate.searching -= 1;
        drop(gate);
        sync.cv.notify_all();
    }
}

impl ThreadPool {
    /// Create a pool of `size` workers; worker 0 runs on the caller thread
    /// during [`ThreadPool::run`], the rest idle until woken.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let sync = Arc::new(PoolSync {
            gate: Mutex::new(Gate {
                job: None,
                seq: 0,
                searching: 0,
                exit: false,
            }),
            cv: Condvar::new(),
        });

        let states: Vec<_> = (0..size)
            .map(|id| Arc::new(Mutex::new(WorkerState::new(id))))
            .collect();

        let handles = states
            .iter()
            .enumerate()
            .skip(1)
            .map(|(id, state)| {
                let sync = Arc::clone(&sync);
                let state = Arc::clone(state);
                std::thread::Builder::new()
                    .name(format!("basalt-worker-{id}"))
                    .stack_size(16 << 20)
                    .spawn(move || worker_loop(id, sync, state))
                    .expect("spawn search worker")
            })
            .collect();

        ThreadPool {
            sync,
            states,
            handles,
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.states.len()
    }

    /// Run a search to completion: wake the helpers, search on the caller
    /// thread, join, and return best and ponder moves.
    pub fn run(&self, job: SearchJob) -> (Move, Move) {
        job.shared.defer.clear();

        {
            let mut gate = self.sync.gate.lock();
            gate.job = Some(job.clone());
            gate.seq += 1;
            gate.searching = self.states.len();
        }
        self.sync.cv.notify_all();

        {
            let mut main = self.states[0].lock();
            main.new_search(&job.shared);
            let mut searcher = Searcher {
                w: &mut *main,
                ctx: &job.shared,
            };
            searcher.iterative_deepening(&job.pos);
        }

        // the main worker is done; release the others and wait for them
        job.shared.stop.store(true, Ordering::Relaxed);
        job.shared.infinite.store(false, Ordering::Relaxed);
        {
            let mut gate = self.sync.gate.lock();
            gate.searching -= 1;
            while gate.searching > 0 {
                self.sync.cv.wait(&mut gate);
            }
            gate.job = None;
        }

        self.best_move()
    }

    /// Best and ponder move: taken from the worker that completed the
    /// deepest iteration with a move to show.
    fn best_move(&self) -> (Move, Move) {
        let mut best = (Move::NULL, Move::NULL);
        let mut depth = 0;
        for state in &self.states {
            let state = state.lock();
            if let Some(pv) = state.pv.first() {
                if pv.dt > depth && !pv.mv[0].is_null() {
                    depth = pv.dt;
                    best = (pv.mv[0], pv.mv[1]);
                }
            }
        }
        best
    }

    /// Score of the main worker's first PV line after a search.
    #[must_use]
    pub fn best_score(&self) -> i32 {
        self.states[0]
            .lock()
            .pv
            .first()
            .map_or(crate::score::NONE, |pv| pv.sc)
    }

    /// Clear the long-lived per-worker tables between games. Only valid
    /// while no search runs.
    pub fn new_game(&self) {
        for state in &self.states {
            state.lock().new_game();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut gate = self.sync.gate.lock();
            gate.exit = true;
        }
        self.sync.cv.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::time::MoveTime;
    use crate::search::{Limits, Shared, SyzygyConf};
    use crate::syzygy::Tablebases;
    use crate::tt::TranspositionTable;
    use std::sync::atomic::{AtomicBool, AtomicI64};

    fn job_for(fen: &str, depth: i32, threads: usize) -> SearchJob {
        let pos = Board::from_fen(fen).unwrap();
        let mut game_hash = [0u64; crate::board::REP_HISTORY];
        game_hash[0] = pos.key();
        SearchJob {
            pos,
            shared: Arc::new(Shared {
                tt: Arc::new(TranspositionTable::new(16)),
                tbs: Arc::new(Tablebases::new()),
                defer: crate::search::abdada::DeferMap::new(),
                stop: AtomicBool::new(false),
                infinite: AtomicBool::new(false),
                limits: Limits {
                    depth,
                    ..Default::default()
                },
                syzygy: SyzygyConf::default(),
                use_abdada: threads > 1,
                thread_cnt: threads,
                multipv: 1,
                chess960: false,
                movetime: MoveTime::infinite(),
                hit_threshold: crate::search::time::HIT_THRESHOLD,
                game_hash,
                mv_offset: 0,
                age: 1,
                nodes: (0..threads).map(|_| AtomicI64::new(0)).collect(),
                tbhits: (0..threads).map(|_| AtomicI64::new(0)).collect(),
            }),
        }
    }

    #[test]
    fn single_thread_finds_a_move() {
        let pool = ThreadPool::new(1);
        let (best, _) = pool.run(job_for(crate::board::START_FEN, 5, 1));
        assert!(!best.is_null());
    }

    #[test]
    fn finds_back_rank_mate() {
        let pool = ThreadPool::new(1);
        let (best, _) = pool.run(job_for("6k1/5ppp/8/8/8/8/8/4R2K w - - 0 1", 6, 1));
        assert_eq!(best.to_uci(false), "e1e8");
    }

    #[test]
    fn two_workers_share_the_table() {
        let pool = ThreadPool::new(2);
        let (best, _) = pool.run(job_for(crate::board::START_FEN, 4, 2));
        assert!(!best.is_null());
    }
}
