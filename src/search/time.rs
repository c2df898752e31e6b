//! Search time management.

use std::time::Instant;

use crate::board::Color;

/// Default interval (in nodes) between clock checks.
pub const HIT_THRESHOLD: i64 = 256;

/// Practically infinite milliseconds.
pub const INFINITE_MS: u64 = u64::MAX / 4;

/// Target and tolerable budget for the current move, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveTime {
    pub target: u64,
    pub tolerable: u64,
}

impl MoveTime {
    #[must_use]
    pub const fn infinite() -> Self {
        MoveTime {
            target: INFINITE_MS,
            tolerable: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        self.target == INFINITE_MS
    }

    /// `go movetime` leaves no tolerable slack: the target is used as
    /// precisely as possible.
    #[inline]
    #[must_use]
    pub const fn is_fixed(&self) -> bool {
        self.tolerable == 0 && !self.is_infinite()
    }
}

/// Inputs of the budget computation, filled from the `go` command.
#[derive(Clone, Copy, Debug)]
pub struct TimeManage {
    /// Remaining clock per color.
    pub time: [u64; 2],
    /// Increment per color.
    pub incr: [u64; 2],
    pub movestogo: u32,
    /// True until a clock field arrives; restricted searches use `movetime`
    /// as-is.
    pub restricted: bool,
    pub movetime: MoveTime,
}

impl Default for TimeManage {
    fn default() -> Self {
        TimeManage {
            time: [0; 2],
            incr: [0; 2],
            movestogo: 0,
            restricted: true,
            movetime: MoveTime::infinite(),
        }
    }
}

impl TimeManage {
    /// Compute the budget for the move. Pondering assumes extra time will
    /// arrive through ponder hits.
    #[must_use]
    pub fn compute(&self, cl: Color, overhead: u64, ponder: bool) -> MoveTime {
        if self.restricted {
            return MoveTime {
                target: if self.movetime.is_infinite() {
                    self.movetime.target
                } else {
                    self.movetime.target.saturating_sub(overhead)
                },
                tolerable: 0,
            };
        }

        let moves = if self.movestogo != 0 {
            u64::from(self.movestogo / 2 + 1)
        } else {
            25
        };
        let max_time = self.time[cl.index()].saturating_sub(overhead);
        let mut target = (self.time[cl.index()] / moves + self.incr[cl.index()])
            .saturating_sub(overhead);
        if ponder {
            target = target * 4 / 3;
        }
        let tolerable = (target + (max_time.saturating_sub(target)) / 5).min(max_time);

        // safety margin against flag falls
        let margin = (target / 20).min(200).max(2);
        let tolerable = tolerable.saturating_sub(margin);
        let target = target.min(tolerable).max(1);
        MoveTime { target, tolerable }
    }
}

/// Per-worker clock: counts node-check hits and answers elapsed-time
/// queries against the shared search start.
pub struct Chronometer {
    start: Instant,
    pub movetime: MoveTime,
    pub hits: i64,
    pub hit_threshold: i64,
}

impl Chronometer {
    #[must_use]
    pub fn new() -> Self {
        Chronometer {
            start: Instant::now(),
            movetime: MoveTime::infinite(),
            hits: 0,
            hit_threshold: HIT_THRESHOLD,
        }
    }

    /// Reset the counter and restart the clock for a new search.
    pub fn set(&mut self, movetime: MoveTime, hit_threshold: i64) {
        self.start = Instant::now();
        self.movetime = movetime;
        self.hits = 0;
        self.hit_threshold = hit_threshold;
    }

    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Extend the target when the score drops between iterations; never
    /// beyond the tolerable bound.
    pub fn extend(&mut self, drop: i32) {
        if self.movetime.is_infinite() || self.movetime.is_fixed() {
            return;
        }
        debug_assert!(drop <= -25);
        let mut target = self.movetime.target * 6 / 5;
        if drop <= -50 {
            target = target * 6 / 5;
        }
        self.movetime.target = target.min(self.movetime.tolerable);
    }
}

impl Default for Chronometer {
    fn default() -> Self {
        Chronometer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_movetime_subtracts_overhead() {
        let manage = TimeManage {
            restricted: true,
            movetime: MoveTime {
                target: 1000,
                tolerable: 0,
            },
            ..Default::default()
        };
        let mt = manage.compute(Color::White, 30, false);
        assert_eq!(mt.target, 970);
        assert!(mt.is_fixed());
    }

    #[test]
    fn infinite_stays_infinite() {
        let manage = TimeManage::default();
        let mt = manage.compute(Color::Black, 30, false);
        assert!(mt.is_infinite());
    }

    #[test]
    fn sudden_death_budget() {
        let manage = TimeManage {
            time: [60_000, 60_000],
            incr: [1_000, 1_000],
            movestogo: 0,
            restricted: false,
            movetime: MoveTime::infinite(),
        };
        let mt = manage.compute(Color::White, 10, false);
        // 60s/25 + 1s - overhead, slack up to a fifth of the rest
        assert!(mt.target >= 3_000 && mt.target <= 4_000);
        assert!(mt.tolerable > mt.target);
        assert!(mt.tolerable < 60_000);
    }

    #[test]
    fn ponder_stretches_target() {
        let manage = TimeManage {
            time: [60_000, 60_000],
            incr: [0, 0],
            movestogo: 20,
            restricted: false,
            movetime: MoveTime::infinite(),
        };
        let plain = manage.compute(Color::White, 0, false);
        let ponder = manage.compute(Color::White, 0, true);
        assert!(ponder.target > plain.target);
    }

    #[test]
    fn score_drop_extends_but_caps() {
        let mut chrono = Chronometer::new();
        chrono.set(
            MoveTime {
                target: 1000,
                tolerable: 1100,
            },
            HIT_THRESHOLD,
        );
        chrono.extend(-30);
        assert_eq!(chrono.movetime.target, 1100);
        chrono.extend(-60);
        assert_eq!(chrono.movetime.target, 1100);
    }
}
