//! History tables: main, counter-move and continuation history with the
//! gravity update rule, plus killer and counter-move bookkeeping.

use crate::board::{Color, KillerPair, Move, Square};

/// Clamp for history entries.
const MAX: i32 = 0x2aaa_aaaa;

/// History scores of a quiet move, gathered once per move.
#[derive(Clone, Copy, Default)]
pub struct HistoryScores {
    pub main: i32,
    pub counter: i32,
    pub continuation: i32,
}

impl HistoryScores {
    #[inline]
    #[must_use]
    pub fn sum(&self) -> i64 {
        i64::from(self.main) + i64::from(self.counter) + i64::from(self.continuation)
    }
}

/// Per-thread history set. Indexed by `[color][piece][to]` for the main
/// table and `[prev_piece][prev_to][piece][to]` for the two-ply tables.
pub struct Histories {
    main: Box<[[[i32; 64]; 6]; 2]>,
    counter: Box<[[[[i32; 64]; 6]; 64]; 6]>,
    continuation: Box<[[[[i32; 64]; 6]; 64]; 6]>,
}

impl Histories {
    #[must_use]
    pub fn new() -> Self {
        Histories {
            main: vec![[[0; 64]; 6]; 2].try_into().expect("exact length"),
            counter: vec![[[[0; 64]; 6]; 64]; 6].try_into().expect("exact length"),
            continuation: vec![[[[0; 64]; 6]; 64]; 6].try_into().expect("exact length"),
        }
    }

    pub fn clear(&mut self) {
        for cl in self.main.iter_mut() {
            for pc in cl.iter_mut() {
                pc.fill(0);
            }
        }
        for table in [&mut self.counter, &mut self.continuation] {
            for pc1 in table.iter_mut() {
                for sq1 in pc1.iter_mut() {
                    for pc2 in sq1.iter_mut() {
                        pc2.fill(0);
                    }
                }
            }
        }
    }

    /// Gather the scores steering quiet-move ordering and pruning.
    #[must_use]
    pub fn get(&self, mv: Move, prev1: Move, prev2: Move) -> HistoryScores {
        debug_assert!(!mv.is_null());
        let pc = mv.piece().index();
        let to = mv.to().index();
        HistoryScores {
            main: self.main[mv.color().index()][pc][to],
            counter: if prev1.is_null() {
                0
            } else {
                self.counter[prev1.piece().index()][prev1.to().index()][pc][to]
            },
            continuation: if prev2.is_null() {
                0
            } else {
                self.continuation[prev2.piece().index()][prev2.to().index()][pc][to]
            },
        }
    }

    #[inline]
    #[must_use]
    pub fn main_score(&self, cl: Color, mv: Move) -> i32 {
        self.main[cl.index()][mv.piece().index()][mv.to().index()]
    }

    /// Gravity update: grows with the weight but decays proportionally to
    /// the current magnitude, so entries saturate instead of running away.
    fn bump(entry: &mut i32, weight: i32) {
        let decay = (i64::from(*entry) * i64::from(weight.abs()) / 128) as i32;
        *entry += 32 * weight - decay;
        *entry = (*entry).clamp(-MAX, MAX);
    }

    fn set_main(&mut self, mv: Move, weight: i32) {
        Self::bump(
            &mut self.main[mv.color().index()][mv.piece().index()][mv.to().index()],
            weight,
        );
    }

    fn set_counter(&mut self, mv: Move, prev: Move, weight: i32) {
        if prev.is_null() {
            return;
        }
        debug_assert!(prev.color() != mv.color());
        Self::bump(
            &mut self.counter[prev.piece().index()][prev.to().index()][mv.piece().index()]
                [mv.to().index()],
            weight,
        );
    }

    fn set_continuation(&mut self, mv: Move, prev: Move, weight: i32) {
        if prev.is_null() {
            return;
        }
        debug_assert!(prev.color() == mv.color());
        Self::bump(
            &mut self.continuation[prev.piece().index()][prev.to().index()][mv.piece().index()]
                [mv.to().index()],
            weight,
        );
    }

    /// A quiet move failed high: reward it, punish the quiets tried before
    /// it at this node.
    pub fn update(&mut self, mv: Move, prev1: Move, prev2: Move, quiets: &[Move], dt: i32) {
        debug_assert!(dt >= 1);
        debug_assert_eq!(quiets.last().copied(), Some(mv));

        let bonus = (dt * dt).min(500);
        let malus = -dt;

        self.set_main(mv, bonus);
        self.set_counter(mv, prev1, bonus);
        self.set_continuation(mv, prev2, bonus);

        for &quiet in &quiets[..quiets.len() - 1] {
            self.set_main(quiet, malus);
            self.set_counter(quiet, prev1, malus);
            self.set_continuation(quiet, prev2, malus);
        }
    }
}

impl Default for Histories {
    fn default() -> Self {
        Histories::new()
    }
}

/// Counter-move slots per `[color][prev_piece][prev_to]`.
pub type CounterMoves = Box<[[[Move; 64]; 6]; 2]>;

#[must_use]
pub fn new_counter_moves() -> CounterMoves {
    vec![[[Move::NULL; 64]; 6]; 2].try_into().expect("exact length")
}

/// Shift-and-insert killer update on a fail-high quiet.
#[inline]
pub fn update_killers(killer: &mut KillerPair, mv: Move) {
    if mv != killer[0] {
        killer[1] = killer[0];
        killer[0] = mv;
    }
}

/// Counter-move slot addressed by the previous move.
#[inline]
#[must_use]
pub fn counter_slot(counters: &CounterMoves, cl: Color, prev: Move) -> Move {
    if prev.is_null() {
        return Move::NULL;
    }
    counters[cl.index()][prev.piece().index()][prev.to().index()]
}

#[inline]
pub fn set_counter_slot(counters: &mut CounterMoves, cl: Color, prev: Move, mv: Move) {
    if !prev.is_null() {
        counters[cl.index()][prev.piece().index()][prev.to().index()] = mv;
    }
}
