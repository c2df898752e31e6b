//! UCI front-end: the command loop, option registry and search control.
//!
//! Malformed input is dropped silently; unknown options are ignored; no
//! command ever aborts the process.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::board::{Board, LegalGen, Move, REP_HISTORY, START_FEN};
use crate::book::{Book, DEFAULT_NAME};
use crate::logger;
use crate::score;
use crate::search::abdada::DeferMap;
use crate::search::time::{self, MoveTime, TimeManage};
use crate::search::{Limits, SearchJob, Shared, SyzygyConf, ThreadPool};
use crate::syzygy::Tablebases;
use crate::tt::{self, TranspositionTable};

const NAME: &str = "basalt";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const MAX_THREADS: usize = 128;
const MAX_MULTIPV: usize = crate::board::MAX_MOVES;
const MAX_OVERHEAD: u64 = 5000;

/// The engine root object: owns every component the search borrows.
pub struct Engine {
    pos: Board,
    pool: Arc<ThreadPool>,
    tt: Arc<TranspositionTable>,
    tbs: Arc<Tablebases>,
    book: Book,

    // options
    threads: usize,
    use_abdada: bool,
    ponder: bool,
    chess960: bool,
    multipv: usize,
    overhead: u64,
    use_book: bool,
    syzygy: SyzygyConf,

    // game bookkeeping for repetition detection and TT aging
    game_hash: [u64; REP_HISTORY],
    mv_offset: usize,
    mv_cnt: u32,

    // the running search, if any
    controller: Option<JoinHandle<()>>,
    active: Option<Arc<Shared>>,
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        let mut engine = Engine {
            pos: Board::startpos(),
            pool: Arc::new(ThreadPool::new(1)),
            tt: Arc::new(TranspositionTable::new(128)),
            tbs: Arc::new(Tablebases::new()),
            book: Book::closed(),
            threads: 1,
            use_abdada: false,
            ponder: false,
            chess960: false,
            multipv: 1,
            overhead: 0,
            use_book: true,
            syzygy: SyzygyConf::default(),
            game_hash: [0; REP_HISTORY],
            mv_offset: 0,
            mv_cnt: 0,
            controller: None,
            active: None,
        };
        engine
            .book
            .open(&logger::binary_dir().join(DEFAULT_NAME));
        engine.reset_game();
        engine
    }

    fn searching(&self) -> bool {
        self.controller.is_some()
    }

    /// The current position, as set by the `position` command.
    #[must_use]
    pub fn position(&self) -> &Board {
        &self.pos
    }

    /// Allocated hash size in MiB.
    #[must_use]
    pub fn hash_mb(&self) -> usize {
        self.tt.size_mb()
    }

    /// Stop any running search and wait for its bestmove.
    fn stop_search(&mut self) {
        if let Some(shared) = self.active.take() {
            shared.stop.store(true, Ordering::Relaxed);
            shared.infinite.store(false, Ordering::Relaxed);
        }
        if let Some(handle) = self.controller.take() {
            let _ = handle.join();
        }
    }

    fn reset_game(&mut self) {
        self.mv_cnt = 0;
        self.mv_offset = 0;
        self.game_hash = [0; REP_HISTORY];
        self.game_hash[0] = self.pos.key();
    }

    /// Track the game history the way the search's repetition ring expects.
    fn save_move(&mut self) {
        self.mv_cnt += 1;
        self.mv_offset = if self.pos.half_move_clock() != 0 {
            self.mv_offset + 1
        } else {
            0
        };
        debug_assert!(self.mv_offset <= self.pos.half_move_clock() as usize);
        self.game_hash[self.mv_offset] = self.pos.key();
    }

    fn set_position(&mut self, fen: &str) {
        match Board::from_fen(fen) {
            Ok(pos) => {
                self.pos = pos;
                self.reset_game();
            }
            Err(err) => log::warn!("{err}"),
        }
    }

    /// Resolve a coordinate-notation token against the legal moves;
    /// both castling encodings (king-to-rook and king-to-g/c) match.
    fn convert_move(&self, token: &str) -> Option<Move> {
        let mut gen = LegalGen::new(&self.pos);
        gen.gen_all();
        gen.list
            .iter()
            .copied()
            .find(|mv| mv.to_uci(self.chess960) == token || mv.to_uci(true) == token)
    }

    fn cmd_uci(&self) {
        logger::emit(&format!("id name {NAME} {VERSION}"));
        logger::emit("id author basalt contributors");
        logger::emit("");
        logger::emit(&format!(
            "option name Threads type spin default {} min 1 max {MAX_THREADS}",
            self.threads
        ));
        logger::emit(&format!(
            "option name SMP type combo default {} var ABDADA var SHT",
            if self.use_abdada { "ABDADA" } else { "SHT" }
        ));
        logger::emit(&format!("option name Ponder type check default {}", self.ponder));
        logger::emit(&format!(
            "option name Hash type spin default {} min {} max {}",
            self.tt.size_mb(),
            tt::MIN_SIZE_MB,
            tt::MAX_SIZE_MB
        ));
        logger::emit("option name Clear Hash type button");
        logger::emit(&format!(
            "option name UCI_Chess960 type check default {}",
            self.chess960
        ));
        logger::emit(&format!(
            "option name MultiPV type spin default {} min 1 max {MAX_MULTIPV}",
            self.multipv
        ));
        logger::emit(&format!(
            "option name Move Overhead type spin default {} min 0 max {MAX_OVERHEAD}",
            self.overhead
        ));
        logger::emit("option name Log type check default false");
        logger::emit(&format!(
            "option name OwnBook type check default {}",
            self.use_book
        ));
        logger::emit(&format!("option name Book File type string default {DEFAULT_NAME}"));
        logger::emit("option name SyzygyPath type string default <empty>");
        logger::emit(&format!(
            "option name SyzygyProbeDepth type spin default {} min 1 max {}",
            self.syzygy.depth,
            score::MAX_DEPTH
        ));
        logger::emit(&format!(
            "option name SyzygyProbeLimit type spin default {} min 0 max {}",
            self.syzygy.pieces,
            crate::syzygy::MAX_PIECES
        ));
        logger::emit("uciok");
    }

    fn cmd_ucinewgame(&mut self) {
        self.book.hit = self.use_book;
        self.tt.clear();
        self.pool.new_game();
        self.pos = Board::startpos();
        self.reset_game();
    }

    fn cmd_setoption(&mut self, tokens: &[&str]) {
        // setoption name <X> [value <Y>]
        let mut name = Vec::new();
        let mut value = Vec::new();
        let mut in_value = false;
        for &token in tokens {
            match token {
                "name" => {}
                "value" => in_value = true,
                _ if in_value => value.push(token),
                _ => name.push(token),
            }
        }
        let name = name.join(" ");
        let value = value.join(" ");

        match name.as_str() {
            "Hash" => {
                let mb = value.parse().unwrap_or(128);
                self.tt = Arc::new(TranspositionTable::new(mb));
            }
            "Clear Hash" => self.tt.clear(),
            "Threads" => {
                self.threads = value.parse().unwrap_or(1).clamp(1, MAX_THREADS);
                self.pool = Arc::new(ThreadPool::new(self.threads));
            }
            "SMP" => self.use_abdada = value == "ABDADA",
            "Ponder" => self.ponder = value == "true",
            "Move Overhead" => {
                self.overhead = value.parse().unwrap_or(0).min(MAX_OVERHEAD);
            }
            "UCI_Chess960" => self.chess960 = value == "true",
            "MultiPV" => {
                self.multipv = value.parse().unwrap_or(1).clamp(1, MAX_MULTIPV);
            }
            "OwnBook" => {
                self.use_book = value == "true";
                self.book.hit = self.use_book;
            }
            "Book File" => {
                if !self.book.open(&logger::binary_dir().join(&value)) {
                    log::warn!("could not open book file '{value}'");
                }
            }
            "Log" => logger::set_enabled(value == "true"),
            "SyzygyPath" => self.tbs.set_path(&value),
            "SyzygyProbeDepth" => {
                self.syzygy.depth = value.parse().unwrap_or(5).clamp(1, score::MAX_DEPTH);
            }
            "SyzygyProbeLimit" => {
                self.syzygy.pieces =
                    value.parse().unwrap_or(crate::syzygy::MAX_PIECES).clamp(0, crate::syzygy::MAX_PIECES);
            }
            _ => {}
        }
    }

    fn cmd_position(&mut self, tokens: &[&str]) {
        let mut iter = tokens.iter();
        match iter.next() {
            Some(&"startpos") => self.set_position(START_FEN),
            Some(&"fen") => {
                let fen: Vec<&str> = iter
                    .clone()
                    .take_while(|&&t| t != "moves")
                    .copied()
                    .collect();
                self.set_position(&fen.join(" "));
            }
            _ => return,
        }

        if let Some(moves_at) = tokens.iter().position(|&t| t == "moves") {
            for token in &tokens[moves_at + 1..] {
                match self.convert_move(token) {
                    Some(mv) => {
                        self.pos.make_move(mv);
                        self.save_move();
                    }
                    None => {
                        log::warn!("illegal move '{token}' ignored");
                        break;
                    }
                }
            }
        }
    }

    fn cmd_go(&mut self, tokens: &[&str]) {
        let mut manage = TimeManage::default();
        let mut limits = Limits::default();
        let mut infinite = false;
        let mut hit_threshold = time::HIT_THRESHOLD;

        let number = |i: &mut usize, default: u64| -> u64 {
            match tokens.get(*i).and_then(|t| t.parse().ok()) {
                Some(value) => {
                    *i += 1;
                    value
                }
                None => default,
            }
        };

        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            i += 1;
            match token {
                "movestogo" => manage.movestogo = number(&mut i, 0) as u32,
                "wtime" => {
                    manage.time[0] = number(&mut i, 0);
                    manage.restricted = false;
                }
                "btime" => {
                    manage.time[1] = number(&mut i, 0);
                    manage.restricted = false;
                }
                "winc" => manage.incr[0] = number(&mut i, 0),
                "binc" => manage.incr[1] = number(&mut i, 0),
                "ponder" => {
                    infinite = true;
                    manage.restricted = false;
                }
                "nodes" => {
                    limits.nodes = number(&mut i, u64::MAX / 2) as i64;
                    hit_threshold =
                        hit_threshold.min((limits.nodes / self.threads as i64).max(1));
                }
                "depth" => {
                    limits.depth = (number(&mut i, 1) as i32).clamp(1, score::MAX_DEPTH);
                }
                "mate" => limits.mate = number(&mut i, 0) as i32,
                "movetime" => {
                    manage.movetime = MoveTime {
                        target: number(&mut i, 0),
                        tolerable: 0,
                    };
                }
                "infinite" => infinite = true,
                "searchmoves" => {
                    while let Some(mv) = tokens.get(i).and_then(|t| self.convert_move(t)) {
                        limits.searchmoves.push(mv);
                        i += 1;
                    }
                }
                _ => {}
            }
        }

        // the opening book answers before any search starts
        if self.use_book {
            if let Some(mv) = self.book.get_move(&self.pos) {
                logger::emit("info string book hit");
                logger::emit(&format!("bestmove {}", mv.to_uci(self.chess960)));
                return;
            }
            self.book.hit = false;
        }

        let movetime = manage.compute(self.pos.stm(), self.overhead, self.ponder);
        let shared = Arc::new(Shared {
            tt: Arc::clone(&self.tt),
            tbs: Arc::clone(&self.tbs),
            defer: DeferMap::new(),
            stop: AtomicBool::new(false),
            infinite: AtomicBool::new(infinite),
            limits,
            syzygy: self.syzygy,
            use_abdada: self.use_abdada,
            thread_cnt: self.threads,
            multipv: self.multipv,
            chess960: self.chess960,
            movetime,
            hit_threshold,
            game_hash: self.game_hash,
            mv_offset: self.mv_offset,
            age: (self.mv_cnt & 0x7fff) as u16,
            nodes: (0..self.threads).map(|_| AtomicI64::new(0)).collect(),
            tbhits: (0..self.threads).map(|_| AtomicI64::new(0)).collect(),
        });

        self.active = Some(Arc::clone(&shared));
        let job = SearchJob {
            pos: self.pos,
            shared,
        };

        // the controller thread runs the pool and reports the best move
        let pool = Arc::clone(&self.pool);
        let chess960 = self.chess960;
        let handle = std::thread::Builder::new()
            .name("basalt-search".to_string())
            .stack_size(16 << 20)
            .spawn(move || {
                let (best, ponder) = pool.run(job);
                let mut line = format!("bestmove {}", best.to_uci(chess960));
                if !ponder.is_null() {
                    line.push_str(&format!(" ponder {}", ponder.to_uci(chess960)));
                }
                logger::emit(&line);
            })
            .expect("spawn search controller");
        self.controller = Some(handle);
    }

    /// Dispatch one protocol line; returns false on `quit`.
    pub fn handle(&mut self, line: &str) -> bool {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            return true;
        };

        match command {
            "uci" => self.cmd_uci(),
            "isready" => logger::emit("readyok"),
            "ucinewgame" => {
                if self.searching() {
                    self.stop_search();
                }
                self.cmd_ucinewgame();
            }
            "position" => {
                if self.searching() {
                    self.stop_search();
                }
                self.cmd_position(&tokens[1..]);
            }
            "setoption" => {
                if self.searching() {
                    self.stop_search();
                }
                self.cmd_setoption(&tokens[1..]);
            }
            "go" => {
                if self.searching() {
                    self.stop_search();
                }
                self.cmd_go(&tokens[1..]);
            }
            "stop" => self.stop_search(),
            "ponderhit" => {
                if let Some(shared) = &self.active {
                    shared.infinite.store(false, Ordering::Relaxed);
                }
            }
            "quit" => {
                self.stop_search();
                return false;
            }

            // unofficial debugging commands
            "bench" => {
                if !self.searching() {
                    let movetime = tokens.get(1).and_then(|t| t.parse().ok()).unwrap_or(1000);
                    crate::bench::run(self, movetime);
                }
            }
            "perft" => {
                if !self.searching() {
                    let depth = tokens.get(1).and_then(|t| t.parse().ok()).unwrap_or(5);
                    let pseudo = tokens.get(2) == Some(&"pseudo");
                    crate::bench::perft(&self.pos, depth, pseudo);
                }
            }
            "eval" => {
                if !self.searching() {
                    let mut cache = crate::eval::kingpawn::KingPawnHash::unallocated();
                    let sc = crate::eval::static_eval(&self.pos, &mut cache);
                    logger::emit(&format!("{}", f64::from(sc) / 100.0));
                }
            }
            "board" => {
                if !self.searching() {
                    logger::emit(&format!("{:?}", self.pos));
                }
            }
            _ => {}
        }
        true
    }

    /// Hand the pool a single blocking search (used by bench).
    pub(crate) fn search_blocking(&mut self, movetime: u64) -> i64 {
        let shared = Arc::new(Shared {
            tt: Arc::clone(&self.tt),
            tbs: Arc::clone(&self.tbs),
            defer: DeferMap::new(),
            stop: AtomicBool::new(false),
            infinite: AtomicBool::new(false),
            limits: Limits::default(),
            syzygy: self.syzygy,
            use_abdada: self.use_abdada,
            thread_cnt: self.threads,
            multipv: 1,
            chess960: self.chess960,
            movetime: MoveTime {
                target: movetime,
                tolerable: 0,
            },
            hit_threshold: time::HIT_THRESHOLD,
            game_hash: self.game_hash,
            mv_offset: self.mv_offset,
            age: (self.mv_cnt & 0x7fff) as u16,
            nodes: (0..self.threads).map(|_| AtomicI64::new(0)).collect(),
            tbhits: (0..self.threads).map(|_| AtomicI64::new(0)).collect(),
        });
        let job = SearchJob {
            pos: self.pos,
            shared: Arc::clone(&shared),
        };
        let _ = self.pool.run(job);
        shared.total_nodes()
    }

    pub(crate) fn set_bench_position(&mut self, fen: &str) {
        self.set_position(fen);
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

/// Blocking UCI loop on standard input. Returns on `quit`.
pub fn run_loop() {
    logger::init();
    let mut engine = Engine::new();
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        logger::record_input(&line);
        if !engine.handle(&line) {
            break;
        }
    }
}
