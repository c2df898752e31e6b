//! The search proper: quiescence, main alpha-beta, root PVS, aspiration
//! windows and the iterative-deepening driver.

use std::sync::atomic::Ordering;
use std::sync::LazyLock;

use crate::board::{see, zobrist, Board, Move, MAX_MOVES};
use crate::eval;
use crate::score;
use crate::tt::Bound;

use super::abdada;
use super::history;
use super::picker::{MovePicker, RootPick};
use super::{Shared, Variation, WorkerState};

/// Cooperative-cancellation sentinel; unwinds to the iteration loop.
pub(crate) struct Stop;

pub(crate) type SearchResult = Result<i32, Stop>;

/// Late move pruning counts, `[critical][depth]`.
const LMP_CNT: [[i32; 7]; 2] = [[0, 3, 4, 7, 11, 17, 24], [0, 6, 8, 12, 18, 30, 44]];

/// Late move reductions by depth and move count.
static LMR: LazyLock<Box<[[i32; MAX_MOVES + 1]; score::MAX_DEPTH as usize + 1]>> =
    LazyLock::new(|| {
        let mut red = vec![[0i32; MAX_MOVES + 1]; score::MAX_DEPTH as usize + 1];
        for (dt, row) in red.iter_mut().enumerate() {
            for (mv, slot) in row.iter_mut().enumerate() {
                *slot = (0.75 + 0.5 * (dt as f64).ln() * (mv as f64).ln()) as i32;
            }
        }
        red.try_into().expect("exact length")
    });

fn alpha_bound(alpha: i32, ply: i32) -> i32 {
    alpha.max(ply - score::MATE)
}

fn beta_bound(beta: i32, ply: i32) -> i32 {
    beta.min(score::MATE - (ply + 1))
}

/// Has the `go mate N` request been satisfied?
fn good_enough_mate(sc: i32, mate_limit: i32) -> bool {
    mate_limit > 0 && score::MATE - sc <= mate_limit * 2
}

fn wdl_to_score(wdl: i32, ply: i32) -> (i32, Bound) {
    debug_assert!((-2..=2).contains(&wdl));
    match wdl {
        2 => (score::TB_WIN - ply, Bound::Lower),
        -2 => (score::TB_LOSS + ply, Bound::Upper),
        _ => (score::DRAW + wdl, Bound::Exact),
    }
}

/// One worker's view of a running search.
pub(crate) struct Searcher<'a> {
    pub w: &'a mut WorkerState,
    pub ctx: &'a Shared,
}

impl Searcher<'_> {
    /// Count a node and watch the clock; stop requests surface here within
    /// one check interval.
    fn visit_node(&mut self, ply: usize) -> Result<(), Stop> {
        self.w.nodes += 1;
        self.w.seldepth = self.w.seldepth.max(ply as i32);

        if self.ctx.stop.load(Ordering::Relaxed) {
            return Err(Stop);
        }
        self.w.chrono.hits += 1;
        if self.w.chrono.hits < self.w.chrono.hit_threshold {
            return Ok(());
        }
        self.w.chrono.hits = 0;
        self.ctx.nodes[self.w.id].store(self.w.nodes, Ordering::Relaxed);
        self.ctx.tbhits[self.w.id].store(self.w.tbhits, Ordering::Relaxed);

        if self.ctx.infinite.load(Ordering::Relaxed) {
            return Ok(());
        }
        if self.ctx.total_nodes() >= self.ctx.limits.nodes
            || self.w.chrono.elapsed() >= self.w.chrono.movetime.target
        {
            self.ctx.stop.store(true, Ordering::Relaxed);
            return Err(Stop);
        }
        Ok(())
    }

    /// Quiescence search at the leaves.
    #[allow(clippy::too_many_arguments)]
    fn qsearch(
        &mut self,
        pos: &mut Board,
        pv: &mut Variation,
        in_check: bool,
        ply: usize,
        dt: i32,
        mut alpha: i32,
        beta: i32,
    ) -> SearchResult {
        debug_assert!(-score::MATE <= alpha && alpha < beta && beta <= score::MATE);
        debug_assert!(dt <= 0);
        pv.cnt = 0;
        self.visit_node(ply)?;

        if pos.draw(&mut self.w.rep_hash, self.ctx.mv_offset + ply) {
            return Ok(score::DRAW);
        }

        // mate distance pruning
        let alpha_bd = alpha_bound(alpha, ply as i32);
        let beta_bd = beta_bound(beta, ply as i32);
        if alpha_bd >= beta_bd {
            return Ok(alpha_bd);
        }
        alpha = alpha_bd;
        let beta = beta_bd;

        // transposition cutoff at the first quiescence ply
        if dt == 0 {
            if let Some(tt) = self.ctx.tt.probe(pos.key(), ply as i32, self.ctx.age) {
                if tt.bd == Bound::Exact
                    || (tt.bd == Bound::Lower && tt.sc >= beta)
                    || (tt.bd == Bound::Upper && tt.sc <= alpha)
                {
                    return Ok(tt.sc);
                }
            }
        }

        let stand_pat = eval::static_eval(pos, &mut self.w.kingpawn);
        let mut best_sc = stand_pat;

        if !in_check && stand_pat > alpha {
            if stand_pat >= beta {
                return Ok(stand_pat);
            }
            alpha = stand_pat;
        }

        let mut pv_next = Variation::new();
        let mut picker = MovePicker::qsearch(pos, in_check);
        while let Some(mv) = picker.next(&self.w.hist, &[]) {
            debug_assert!(dt == 0 || !mv.is_quiet());

            if !in_check && !mv.is_quiet() {
                // depth limit: beyond -6 only recaptures keep the search hot
                if dt <= -6 && !pos.recapture(mv) {
                    continue;
                }
                // delta pruning
                let victim = mv.victim().map_or(0, |vc| see::SEE_VALUE[vc.index()]);
                if stand_pat + victim + 100 < alpha && !mv.is_promo() {
                    continue;
                }
                // SEE pruning
                if !see::see_above(pos, mv, 0) {
                    continue;
                }
            }

            pos.make_move(mv);
            debug_assert!(pos.legal());

            let sc = -self.qsearch(pos, &mut pv_next, false, ply + 1, dt - 1, -beta, -alpha)?;
            picker.gen.revert(pos);

            if sc > best_sc {
                best_sc = sc;
                if sc > alpha {
                    if sc >= beta {
                        return Ok(sc);
                    }
                    alpha = sc;
                    pv.assemble(mv, &pv_next);
                }
            }
        }

        // mate detection is possible only in the evasion ply directly under
        // the main search
        if in_check && picker.hits == 0 {
            return Ok(ply as i32 - score::MATE);
        }
        Ok(best_sc)
    }

    /// Main alpha-beta search.
    #[allow(clippy::too_many_arguments, clippy::too_many_lines)]
    fn alphabeta(
        &mut self,
        pos: &mut Board,
        ply: usize,
        pv: &mut Variation,
        in_check: bool,
        cut_node: bool,
        dt: i32,
        mut alpha: i32,
        beta: i32,
    ) -> SearchResult {
        debug_assert!(-score::MATE <= alpha && alpha < beta && beta <= score::MATE);
        debug_assert!(!(beta != alpha + 1 && cut_node));
        debug_assert!(dt <= score::MAX_DEPTH);

        if dt <= 0 || ply >= score::MAX_DEPTH as usize {
            return self.qsearch(pos, pv, in_check, ply, 0, alpha, beta);
        }

        pv.cnt = 0;
        self.visit_node(ply)?;

        if pos.draw(&mut self.w.rep_hash, self.ctx.mv_offset + ply) {
            return Ok(score::DRAW);
        }

        // mate distance pruning
        let alpha_bd = alpha_bound(alpha, ply as i32);
        let beta_bd = beta_bound(beta, ply as i32);
        if alpha_bd >= beta_bd {
            return Ok(alpha_bd);
        }
        alpha = alpha_bd;
        let beta = beta_bd;
        let pv_node = beta != alpha + 1;

        // transposition table, keyed apart while proving singularity
        let key = zobrist::singular_key(pos.key(), self.w.stack[ply].singular_mv);
        let mut tt = self.ctx.tt.probe(key, ply as i32, self.ctx.age);
        if let Some(hit) = tt {
            if !pv_node
                && hit.dt >= dt
                && (hit.bd == Bound::Exact
                    || (hit.bd == Bound::Lower && hit.sc >= beta)
                    || (hit.bd == Bound::Upper && hit.sc <= alpha))
            {
                return Ok(hit.sc);
            }
        }

        // tablebase probe at zeroing nodes
        if self.w.use_syzygy {
            let pop = crate::board::types::bitboard::popcnt(pos.occupied());
            if pop <= self.ctx.syzygy.pieces
                && (dt >= self.ctx.syzygy.depth || pop < self.ctx.syzygy.pieces.min(5))
                && pos.half_move_clock() == 0
            {
                // probing is slow; force a clock check right after
                self.w.chrono.hits = self.w.chrono.hit_threshold;
                if let Some(wdl) = self.ctx.tbs.probe_wdl(pos) {
                    self.w.tbhits += 1;
                    let (sc, bd) = wdl_to_score(wdl, ply as i32);
                    self.ctx.tt.store(
                        key,
                        Move::NULL,
                        sc,
                        bd,
                        score::MAX_DEPTH - 1,
                        ply as i32,
                        self.ctx.age,
                    );
                    return Ok(sc);
                }
            }
        }

        // static evaluation and pruning eligibility
        let sc_static = if pv_node || in_check {
            score::NONE
        } else {
            eval::static_eval(pos, &mut self.w.kingpawn)
        };
        self.w.stack[ply].sc = sc_static;

        let pruning =
            !pv_node && !in_check && self.w.stack[ply].pruning && !score::is_mate(beta);
        let critical = pv_node
            || in_check
            || ply <= 2
            || self.w.stack[ply - 2].sc == score::NONE
            || self.w.stack[ply - 2].sc < sc_static;

        // static null move pruning
        if pruning && dt <= 3 && sc_static - 50 * dt >= beta {
            return Ok(beta);
        }

        // razoring
        if pruning && dt <= 2 && sc_static + 200 + 100 * dt <= alpha {
            let raz_alpha = alpha - 200 - 100 * dt;
            let new_sc = self.qsearch(pos, pv, in_check, ply, 0, raz_alpha, raz_alpha + 1)?;
            if new_sc <= raz_alpha {
                return Ok(new_sc);
            }
        }

        let mut pv_next = Variation::new();

        // null move pruning
        if pruning
            && dt >= 2
            && self.w.stack[ply].singular_mv.is_null()
            && !pos.lone_pawns()
            && sc_static >= beta
        {
            let red = 2 + dt / 5 + ((sc_static - beta) / 150).min(3);
            let saved = pos.make_null();
            self.w.stack[ply].null_saved = Some(saved);
            self.w.stack[ply].mv = Move::NULL;
            self.w.stack[ply + 1].pruning = false;

            let null_sc = -self.alphabeta(
                pos,
                ply + 1,
                &mut pv_next,
                false,
                !cut_node,
                dt - 1 - red,
                -beta,
                1 - beta,
            )?;

            pos.revert_null(saved);
            self.w.stack[ply].null_saved = None;
            self.w.stack[ply + 1].pruning = true;

            if null_sc >= beta {
                return Ok(beta);
            }
        }

        // internal iterative deepening populates the hash move at PV nodes
        if self.w.stack[ply].pruning
            && pv_node
            && tt.map_or(true, |hit| hit.mv.is_null())
            && dt >= 3
        {
            self.w.stack[ply].pruning = false;
            self.alphabeta(pos, ply, &mut pv_next, in_check, cut_node, dt - 2, alpha, beta)?;
            self.w.stack[ply].pruning = true;
            tt = self.ctx.tt.probe(key, ply as i32, self.ctx.age);
        }

        // move loop bookkeeping: the two previous moves drive the history
        // tables and the counter-move slot
        let tt_mv = tt.map_or(Move::NULL, |hit| hit.mv);
        let prev1 = self.w.stack[ply - 1].mv;
        let prev2 = if self.w.stack[ply].dt >= 2 {
            self.w.stack[ply - 2].mv
        } else {
            Move::NULL
        };
        let counter = history::counter_slot(&self.w.counters, pos.stm(), prev1);

        let mut best_mv = Move::NULL;
        let mut best_sc = -score::MATE;
        let futility_sc = sc_static + 50 + 100 * dt;
        let old_alpha = alpha;

        let mut defer_cnt: usize = 0;
        let mut quiet_cnt: usize = 0;
        let mut second_pass: usize = 0;

        let multithreaded = self.ctx.thread_cnt > 1;
        let mut picker = MovePicker::main(
            pos,
            tt_mv,
            prev1,
            prev2,
            counter,
            self.w.stack[ply].killer,
            multithreaded,
            self.ctx.use_abdada,
        );

        loop {
            let deferred = &self.w.stack[ply].defer_mv[..defer_cnt];
            let Some(mv) = picker.next(&self.w.hist, deferred) else {
                break;
            };
            debug_assert!(picker.hits >= 1 && picker.hits <= MAX_MOVES);

            // cutoff found by a concurrent worker
            if self.ctx.use_abdada && defer_cnt > 0 && !pv_node && dt >= abdada::DEPTH_CUTOFF {
                debug_assert!(multithreaded);
                if let Some(hit) = self.ctx.tt.probe(key, ply as i32, self.ctx.age) {
                    if hit.bd == Bound::Lower && hit.sc >= beta {
                        return Ok(hit.sc);
                    }
                }
            }

            // the singular candidate is searched by the caller, not here
            if mv == self.w.stack[ply].singular_mv {
                picker.hits -= 1;
                continue;
            }

            let mv_cnt = if picker.stage_deferred() {
                let n = self.w.stack[ply].mv_cnt[second_pass];
                second_pass += 1;
                n
            } else {
                picker.hits as i32
            };
            debug_assert!(second_pass <= defer_cnt);

            let gives_check = pos.gives_check(mv);
            let quiet = mv.is_quiet();
            let mut hist = history::HistoryScores::default();
            if quiet {
                self.w.stack[ply].quiet_mv[quiet_cnt] = mv;
                quiet_cnt += 1;
                hist = self.w.hist.get(mv, prev1, prev2);
            }

            // pruning quiet moves at shallow depth
            if !pv_node
                && quiet
                && best_sc > -score::LONGEST_MATE
                && !gives_check
                && !in_check
            {
                // late move pruning
                if dt <= 6 && mv_cnt >= LMP_CNT[usize::from(critical)][dt as usize] {
                    continue;
                }
                // futility pruning
                if dt <= 6 && futility_sc <= alpha {
                    continue;
                }
                // history pruning
                if dt <= 2 && (hist.counter < -500 || hist.continuation < -3000) {
                    continue;
                }
                // SEE pruning of quiets
                if dt <= 10 && !see::see_above(pos, mv, 0) {
                    continue;
                }
            }

            // SEE pruning of bad tactical moves
            if !pv_node
                && !quiet
                && best_sc > -score::LONGEST_MATE
                && dt <= 3
                && !see::see_above(pos, mv, -100 * dt)
            {
                continue;
            }

            // deferring moves currently searched by other workers
            let mv_hash = zobrist::move_key32(mv, pos.key());
            if self.ctx.use_abdada
                && picker.hits > 1
                && picker.can_defer()
                && dt >= abdada::DEPTH_DEFER
                && self.ctx.defer.defer(mv_hash)
            {
                self.w.stack[ply].mv_cnt[defer_cnt] = picker.hits as i32;
                self.w.stack[ply].defer_mv[defer_cnt] = mv;
                defer_cnt += 1;
                continue;
            }

            // singular extension: verify the hash move is the only one to
            // hold its bound by searching everything else at reduced depth
            let mut singular = false;
            if mv == tt_mv && dt >= 6 && defer_cnt == 0 {
                if let Some(hit) = tt {
                    if hit.bd == Bound::Lower && hit.dt >= dt {
                        debug_assert_eq!(picker.hits, 1);
                        let alpha_bd = (hit.sc - 2 * dt).max(-score::MATE);
                        self.w.stack[ply].singular_mv = mv;
                        let sc = self.alphabeta(
                            pos,
                            ply,
                            &mut pv_next,
                            in_check,
                            cut_node,
                            dt - 4,
                            alpha_bd,
                            alpha_bd + 1,
                        )?;
                        debug_assert_eq!(self.w.stack[ply].singular_mv, mv);
                        self.w.stack[ply].singular_mv = Move::NULL;
                        if quiet {
                            debug_assert_eq!(quiet_cnt, 1);
                            self.w.stack[ply].quiet_mv[0] = mv;
                        }
                        singular = sc <= alpha_bd;
                    }
                }
            }

            // extensions: singular, check, PV recapture or push to the 7th
            let ext = i32::from(
                singular
                    || gives_check
                    || (pv_node && (pos.recapture(mv) || mv.push_to_7th())),
            );

            // speculative prefetch of the child's TT bucket
            self.ctx.tt.prefetch(pos.child_key(mv));

            pos.make_move(mv);
            if !pos.legal() {
                picker.revert(pos);
                continue;
            }
            self.w.stack[ply].mv = mv;
            debug_assert!(gives_check == pos.in_check());

            // late move reductions
            let mut red = 0;
            if mv_cnt >= 4 && dt >= 3 {
                if quiet {
                    red = LMR[dt as usize][mv_cnt as usize]
                        + i32::from(cut_node)
                        + i32::from(!pv_node)
                        + i32::from(!critical)
                        + (hist.sum() / -7500) as i32;
                    if !cut_node && see::escape(&picker.gen.pos, mv) {
                        red -= 1;
                    }
                    red = red.clamp(0, 6);
                } else {
                    let victim = mv.victim().map_or(0, |vc| see::SEE_VALUE[vc.index()]);
                    if cut_node
                        || self.w.stack[ply].sc + victim <= alpha
                        || mv_cnt >= LMP_CNT[usize::from(critical)][dt.min(6) as usize]
                    {
                        red = 1;
                    }
                }
            }

            let new_dt = dt - 1 + ext;
            let new_alpha = if pv_node && picker.hits > 1 { -alpha - 1 } else { -beta };
            let new_cut = if pv_node && picker.hits == 1 { false } else { !cut_node };

            let mut sc = 0;
            if red > 0 {
                sc = -self.alphabeta(
                    pos,
                    ply + 1,
                    &mut pv_next,
                    gives_check,
                    true,
                    new_dt - red,
                    -alpha - 1,
                    -alpha,
                )?;
            }

            // principal variation search, re-searching failed reductions
            if red == 0 || sc > alpha {
                if self.ctx.use_abdada
                    && picker.hits > 1
                    && picker.can_defer()
                    && dt > abdada::DEPTH_DEFER
                {
                    self.ctx.defer.add(mv_hash);
                    let searched = self.alphabeta(
                        pos,
                        ply + 1,
                        &mut pv_next,
                        gives_check,
                        new_cut,
                        new_dt,
                        new_alpha,
                        -alpha,
                    );
                    self.ctx.defer.remove(mv_hash);
                    sc = -searched?;
                } else {
                    sc = -self.alphabeta(
                        pos,
                        ply + 1,
                        &mut pv_next,
                        gives_check,
                        new_cut,
                        new_dt,
                        new_alpha,
                        -alpha,
                    )?;
                }

                if picker.hits > 1 && pv_node && sc > alpha {
                    sc = -self.alphabeta(
                        pos,
                        ply + 1,
                        &mut pv_next,
                        gives_check,
                        false,
                        new_dt,
                        -beta,
                        -alpha,
                    )?;
                }
            }

            picker.gen.revert(pos);
            debug_assert!(score::valid(sc));

            if sc > best_sc {
                best_sc = sc;
                if sc > alpha {
                    best_mv = mv;
                    if sc >= beta {
                        if quiet {
                            self.w.hist.update(
                                mv,
                                prev1,
                                prev2,
                                &self.w.stack[ply].quiet_mv[..quiet_cnt],
                                dt,
                            );
                            history::update_killers(&mut self.w.stack[ply].killer, mv);
                            history::set_counter_slot(
                                &mut self.w.counters,
                                pos.stm(),
                                prev1,
                                mv,
                            );
                        }
                        break;
                    }
                    alpha = sc;
                    pv.assemble(mv, &pv_next);
                }
            }
        }

        // checkmate, stalemate, or a refuted singular exclusion
        if picker.hits == 0 {
            debug_assert_eq!(alpha, old_alpha);
            return Ok(if !self.w.stack[ply].singular_mv.is_null() {
                alpha
            } else if in_check {
                ply as i32 - score::MATE
            } else {
                score::DRAW
            });
        }

        if self.w.stack[ply].singular_mv.is_null() {
            let bd = if best_sc <= old_alpha {
                Bound::Upper
            } else if best_sc >= beta {
                Bound::Lower
            } else {
                Bound::Exact
            };
            self.ctx.tt.store(key, best_mv, best_sc, bd, dt, ply as i32, self.ctx.age);
        }

        debug_assert!(score::valid(best_sc));
        Ok(best_sc)
    }

    /// Root PVS over the (already ordered) root move list.
    fn alphabeta_root(
        &mut self,
        pos: &mut Board,
        pick: &mut RootPick,
        dt: i32,
        mut alpha: i32,
        beta: i32,
        multipv: usize,
    ) -> SearchResult {
        debug_assert!((1..=score::MAX_DEPTH).contains(&dt));
        debug_assert!(-score::MATE <= alpha && alpha < beta && beta <= score::MATE);

        let mut pv = Variation::new();
        let mut wrong_pv = false;
        let mut mv_n = 0;

        for i in 0..pick.root.len() {
            if pick.root[i].skip {
                continue;
            }
            mv_n += 1;
            let mv = pick.root[i].mv;
            let gives_check = pick.root[i].check;

            self.info_currmove(multipv, mv, mv_n);
            pick.root[i].nodes -= self.w.nodes;

            pos.make_move(mv);
            self.w.stack[0].mv = mv;
            debug_assert!(pos.legal());

            // check extension
            let new_dt = dt - 1 + i32::from(gives_check);
            let new_alpha = if mv_n > 1 { -alpha - 1 } else { -beta };

            let mut sc = -self.alphabeta(
                pos,
                1,
                &mut pv,
                gives_check,
                mv_n > 1,
                new_dt,
                new_alpha,
                -alpha,
            )?;
            if mv_n > 1 && sc > alpha {
                sc = -self.alphabeta(pos, 1, &mut pv, gives_check, false, new_dt, -beta, -alpha)?;
            }

            pick.root[i].nodes += self.w.nodes;
            *pos = *pick.position();
            debug_assert!(pick.root[i].nodes >= 0);
            debug_assert!(score::valid(sc));

            if pick.tb_pos {
                // the tablebase verdict wins when search and table disagree
                // about the game-theoretical outcome
                let dtz_sc = pick.root[i].weight as i32;
                wrong_pv = (score::is_tb_mate(dtz_sc) && !score::is_mate(sc))
                    || (!score::is_tb_mate(dtz_sc) && !score::is_draw(sc));
                if wrong_pv {
                    sc = dtz_sc;
                }
            }

            if sc > alpha {
                if sc >= beta {
                    return Ok(sc);
                }
                alpha = sc;
                self.w.pv[multipv].commit(mv, &pv);
                self.w.pv[multipv].seldt = self.w.seldepth;
                pick.root[i].nodes += self.w.nodes;
                if pick.tb_pos {
                    self.w.pv[multipv].wrong = wrong_pv;
                }
            }
        }
        Ok(alpha)
    }

    /// Aspiration window around the previous iteration's score, widening on
    /// failures; tablebase roots and proven mates search with an open
    /// window.
    fn aspiration_window(
        &mut self,
        pos: &mut Board,
        pick: &mut RootPick,
        base_dt: i32,
        multipv: usize,
    ) -> SearchResult {
        let sc_old = self.w.pv[multipv].sc;
        let mut dt = base_dt;
        let mut alpha = -score::MATE;
        let mut beta = score::MATE;
        let mut margin = 35;

        if dt >= 4 && !pick.tb_pos && !score::is_tb_mate(sc_old) && !score::is_mate(sc_old) {
            alpha = (sc_old - margin).max(-score::MATE);
            beta = (sc_old + margin).min(score::MATE);
        }

        loop {
            debug_assert!(-score::MATE <= alpha && alpha < beta && beta <= score::MATE);
            let sc = self.alphabeta_root(pos, pick, dt.max(1), alpha, beta, multipv)?;

            margin *= 4;
            let bd = if sc <= alpha {
                beta = (beta + alpha) / 2;
                alpha = (sc - margin).max(-score::MATE);
                dt = base_dt;
                Bound::Upper
            } else if sc >= beta {
                beta = (sc + margin).min(score::MATE);
                dt -= 1;
                Bound::Lower
            } else {
                return Ok(sc);
            };

            if margin > 140 {
                alpha = -score::MATE;
                beta = score::MATE;
            }
            self.info_bound(multipv, sc, bd);
        }
    }

    /// Early-exit conditions between iterations.
    fn abort(&self, pick: &RootPick, stability: i32) -> bool {
        if self.ctx.infinite.load(Ordering::Relaxed) {
            return false;
        }
        let sc = self.w.pv[0].sc;
        if good_enough_mate(sc, self.ctx.limits.mate) {
            return true;
        }
        let time = self.w.chrono.elapsed();
        let target = self.w.chrono.movetime.target;
        if self.w.chrono.movetime.is_fixed() {
            return time >= target;
        }

        time > target / 2
            || (time > target / 8 && sc > score::LONGEST_MATE)
            || (time > target / 8 && pick.tb_pos)
            || (time > target / 16 && stability >= 8)
            || (time > target / 32 && pick.single_reply())
    }

    /// Iterative deepening over all multi-PV slots; the base of the search
    /// hierarchy for one worker.
    pub fn iterative_deepening(&mut self, root: &Board) {
        let mut pos = *root;
        let mut pick = RootPick::new(&pos, &self.ctx.limits.searchmoves);

        // tablebase-backed roots get their moves weighted up front
        self.w.use_syzygy = self.ctx.tbs.count() > 0;
        if self.w.use_syzygy
            && crate::board::types::bitboard::popcnt(pos.occupied()) <= self.ctx.syzygy.pieces
        {
            if self.ctx.tbs.probe_dtz_root(
                &pos,
                &mut pick,
                &self.ctx.game_hash,
                self.ctx.mv_offset,
            ) {
                pick.tb_pos = true;
                self.w.use_syzygy = false;
            } else if self.ctx.tbs.probe_wdl_root(&pos, &mut pick) {
                pick.tb_pos = true;
                if !pick.tb_win() {
                    self.w.use_syzygy = false;
                }
            }
        }
        self.w.tbhits += i64::from(pick.tb_pos);

        let mut stability = 0;
        let mut last_best = Move::NULL;

        for dt in 1..=self.ctx.limits.depth {
            if self.ctx.stop.load(Ordering::Relaxed) {
                break;
            }
            let slots = self.ctx.multipv.min(pick.mv_cnt());
            for i in 0..slots {
                if self.ctx.stop.load(Ordering::Relaxed) {
                    break;
                }
                let pv_mv = self.w.pv[i].mv[0];
                let exclude = if i > 0 { self.w.pv[i - 1].mv[0] } else { Move::NULL };
                pick.rearrange_list(pv_mv, exclude);
                self.w.pv[i].dt = dt;

                match self.aspiration_window(&mut pos, &mut pick, dt, i) {
                    Ok(sc) => {
                        // extend the budget when the score is dropping
                        if dt >= 4 && sc - self.w.pv[i].sc <= -25 {
                            self.w.chrono.extend(sc - self.w.pv[i].sc);
                        }
                        if sc != -score::MATE {
                            self.w.pv[i].sc = sc;
                        }
                    }
                    Err(Stop) => {
                        pos = *pick.position();
                        self.w.pv[i].dt -= 1;
                    }
                }
            }

            if self.w.pv[0].mv[0] == last_best && !last_best.is_null() {
                stability += 1;
            } else {
                stability = 0;
            }
            last_best = self.w.pv[0].mv[0];

            self.info_iteration(pick.mv_cnt());
            if self.abort(&pick, stability) {
                break;
            }
        }

        self.ctx.nodes[self.w.id].store(self.w.nodes, Ordering::Relaxed);
        self.ctx.tbhits[self.w.id].store(self.w.tbhits, Ordering::Relaxed);
    }

    // ------------------------------------------------------------------
    // UCI info emission; only the main worker writes to stdout.

    fn show_score(sc: i32, bd: Bound) -> String {
        if sc == score::NONE {
            return "cp 0".to_string();
        }
        let mut out = if score::is_mate(sc) {
            format!("mate {}", score::mate_in(sc))
        } else {
            format!("cp {sc}")
        };
        match bd {
            Bound::Upper => out.push_str(" upperbound"),
            Bound::Lower => out.push_str(" lowerbound"),
            _ => {}
        }
        out
    }

    fn show_multipv(&self, slot: usize) -> String {
        if self.ctx.multipv > 1 {
            format!(" multipv {}", slot + 1)
        } else {
            String::new()
        }
    }

    fn show_hashfull(&self, time: u64) -> String {
        if time >= 1000 {
            format!(" hashfull {}", self.ctx.tt.hashfull())
        } else {
            String::new()
        }
    }

    fn info_iteration(&mut self, mv_cnt: usize) {
        if !self.w.is_main() {
            return;
        }
        if self.ctx.multipv > 1 {
            self.w.rearrange_pv(mv_cnt);
        }
        let time = self.w.chrono.elapsed();
        let nodes = self.ctx.total_nodes().max(self.w.nodes);

        for i in 0..self.ctx.multipv.min(mv_cnt) {
            let pv = &self.w.pv[i];
            let line: String = if pv.wrong {
                format!("{} ", pv.mv[0].to_uci(self.ctx.chess960))
            } else {
                pv.mv[..pv.cnt]
                    .iter()
                    .map(|mv| format!("{} ", mv.to_uci(self.ctx.chess960)))
                    .collect()
            };
            crate::logger::emit(&format!(
                "info depth {} seldepth {}{} score {} time {} nodes {} nps {}{} tbhits {} pv {}",
                pv.dt,
                pv.seldt,
                self.show_multipv(i),
                Self::show_score(pv.sc, Bound::None),
                time,
                nodes,
                nodes * 1000 / time.max(1) as i64,
                self.show_hashfull(time),
                self.ctx.total_tbhits().max(self.w.tbhits),
                line.trim_end(),
            ));
        }
    }

    fn info_bound(&mut self, slot: usize, sc: i32, bd: Bound) {
        if !self.w.is_main() {
            return;
        }
        let time = self.w.chrono.elapsed();
        let nodes = self.ctx.total_nodes().max(self.w.nodes);
        crate::logger::emit(&format!(
            "info depth {} seldepth {}{} score {} time {} nodes {} nps {}{}",
            self.w.pv[slot].dt,
            self.w.pv[slot].seldt,
            self.show_multipv(slot),
            Self::show_score(sc, bd),
            time,
            nodes,
            nodes * 1000 / time.max(1) as i64,
            self.show_hashfull(time),
        ));
    }

    fn info_currmove(&mut self, slot: usize, mv: Move, mv_n: usize) {
        if !self.w.is_main() || self.w.chrono.elapsed() <= 5000 {
            return;
        }
        crate::logger::emit(&format!(
            "info depth {} seldepth {}{} currmove {} currmovenumber {}",
            self.w.pv[slot].dt,
            self.w.pv[slot].seldt,
            self.show_multipv(slot),
            mv.to_uci(self.ctx.chess960),
            mv_n,
        ));
    }
}
