//! Staged move picking.
//!
//! The picker asks the generator for one stage at a time, weights the batch
//! and hands out moves highest-weight first. Weight zero marks consumed or
//! skipped entries (duplicates of earlier stages, stashed loosing
//! captures).

use crate::board::{see, Board, KillerPair, LegalGen, Move, PseudoGen, MAX_MOVES};
use crate::eval::kingpawn::KingPawnHash;
use crate::score;

use super::history::Histories;

/// Attacker value in pawn units for MVV-LVA.
const PAWN_UNITS: [i64; 6] = [1, 3, 3, 5, 9, 0];

/// Offset keeping composite history weights strictly positive.
const HIST_OFFSET: i64 = 3 * 0x2aaa_aaaa + 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Stage {
    Hash,
    Winning,
    Killer,
    Quiet,
    Loosing,
    Deferred,
    Tactical,
    Evasion,
}

const MAIN_STAGES: [Stage; 6] = [
    Stage::Hash,
    Stage::Winning,
    Stage::Killer,
    Stage::Quiet,
    Stage::Loosing,
    Stage::Deferred,
];
const QS_STAGES: [Stage; 2] = [Stage::Tactical, Stage::Evasion];

fn mvv_lva(mv: Move) -> i64 {
    let victim = mv.victim().expect("capture");
    i64::from(see::SEE_VALUE[victim.index()]) - PAWN_UNITS[mv.piece().index()]
}

fn mvv_lva_promo(mv: Move) -> i64 {
    debug_assert!(mv.is_promo());
    let victim = mv.victim().map_or(0, |vc| i64::from(see::SEE_VALUE[vc.index()]));
    let promo = mv.promo_piece().expect("promotion");
    victim + i64::from(see::SEE_VALUE[promo.index()]) - 2 * i64::from(see::SEE_VALUE[0])
}

/// Staged picker used by the main alpha-beta search (pseudo-legal) and the
/// quiescence search (legal).
pub struct MovePicker<const LEGAL: bool> {
    pub gen: crate::board::Generator<LEGAL>,
    weights: [i64; MAX_MOVES],
    stages: &'static [Stage],
    cycle: usize,
    started: bool,
    attempts: usize,
    /// Moves handed out so far (the running move count).
    pub hits: usize,
    hash_mv: Move,
    prev1: Move,
    prev2: Move,
    counter: Move,
    killer: KillerPair,
    multithreaded: bool,
}

impl MovePicker<false> {
    /// Picker for a main-search node.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn main(
        pos: &Board,
        hash_mv: Move,
        prev1: Move,
        prev2: Move,
        counter: Move,
        killer: KillerPair,
        multithreaded: bool,
        use_abdada: bool,
    ) -> Self {
        let stages: &'static [Stage] = if multithreaded && use_abdada {
            &MAIN_STAGES
        } else {
            &MAIN_STAGES[..5]
        };
        MovePicker {
            gen: PseudoGen::new(pos),
            weights: [0; MAX_MOVES],
            stages,
            cycle: 0,
            started: false,
            attempts: 0,
            hits: 0,
            hash_mv,
            prev1,
            prev2,
            counter,
            killer,
            multithreaded,
        }
    }
}

impl MovePicker<true> {
    /// Picker for a quiescence node: tactical moves, plus evasions when in
    /// check.
    #[must_use]
    pub fn qsearch(pos: &Board, in_check: bool) -> Self {
        MovePicker {
            gen: LegalGen::new(pos),
            weights: [0; MAX_MOVES],
            stages: if in_check { &QS_STAGES } else { &QS_STAGES[..1] },
            cycle: 0,
            started: false,
            attempts: 0,
            hits: 0,
            hash_mv: Move::NULL,
            prev1: Move::NULL,
            prev2: Move::NULL,
            counter: Move::NULL,
            killer: [Move::NULL; 2],
            multithreaded: false,
        }
    }
}

impl<const LEGAL: bool> MovePicker<LEGAL> {
    /// Restore the position snapshot and uncount the move (used when a
    /// pseudo-legal move turns out illegal).
    pub fn revert(&mut self, pos: &mut Board) {
        self.gen.revert(pos);
        self.hits -= 1;
    }

    #[inline]
    #[must_use]
    pub fn stage_deferred(&self) -> bool {
        self.started && self.stages[self.cycle] == Stage::Deferred
    }

    /// Whether moves may be deferred right now: only with multiple workers
    /// and never while replaying already-deferred moves.
    #[inline]
    #[must_use]
    pub fn can_defer(&self) -> bool {
        self.multithreaded && !self.stage_deferred()
    }

    /// Pick the next move, advancing through the stages as they run dry.
    pub fn next(&mut self, hist: &Histories, deferred: &[Move]) -> Option<Move> {
        loop {
            while self.attempts == 0 {
                if self.started {
                    self.cycle += 1;
                } else {
                    self.started = true;
                }
                if self.cycle >= self.stages.len() {
                    return None;
                }
                self.gen_weight(hist, deferred);
                self.attempts = self.gen.list.len();
            }

            // highest-weighted move of the current batch
            let mut best: Option<(usize, i64)> = None;
            for i in 0..self.gen.list.len() {
                if self.weights[i] > best.map_or(0, |(_, w)| w) {
                    best = Some((i, self.weights[i]));
                }
            }

            match best {
                Some((idx, _)) => {
                    self.attempts -= 1;
                    self.hits += 1;
                    self.weights[idx] = 0;
                    return Some(self.gen.list.get(idx));
                }
                None => {
                    // the rest of the batch is duplicates or stashed
                    // loosing captures; move on
                    self.attempts = 0;
                }
            }
        }
    }

    fn gen_weight(&mut self, hist: &Histories, deferred: &[Move]) {
        self.gen.list.reset_stage();
        match self.stages[self.cycle] {
            Stage::Hash => {
                self.gen.gen_hash(&mut self.hash_mv);
                self.weight_hash();
            }
            Stage::Winning => {
                self.gen.gen_captures();
                self.gen.gen_promos(false);
                self.weight_tactical_see();
            }
            Stage::Killer => {
                self.gen.gen_killers(&self.killer, self.counter);
                self.weight_killer();
            }
            Stage::Quiet => {
                self.gen.gen_quiets();
                self.weight_quiet(hist);
            }
            Stage::Loosing => {
                self.gen.restore_loosing();
                self.weight_loosing();
            }
            Stage::Deferred => {
                self.gen.restore_deferred(deferred);
                self.weight_deferred();
            }
            Stage::Tactical => {
                self.gen.gen_captures();
                self.gen.gen_promos(true);
                self.weight_tactical();
            }
            Stage::Evasion => {
                self.gen.gen_quiets();
                self.weight_evasion();
            }
        }
    }

    fn weight_hash(&mut self) {
        if !self.gen.list.is_empty() {
            debug_assert_eq!(self.gen.list.len(), 1);
            self.weights[0] = 1;
        }
    }

    /// Captures by MVV-LVA; loosing ones (negative SEE) are stashed for a
    /// later stage. Promotions follow, valued by their replacement piece.
    fn weight_tactical_see(&mut self) {
        let captures = self.gen.list.cnt.capture;
        for i in 0..captures {
            let mv = self.gen.list.get(i);
            debug_assert!(mv.is_capture());
            if mv == self.hash_mv {
                self.weights[i] = 0;
                self.gen.list.cnt.duplicate += 1;
            } else if !see::see_above(&self.gen.pos, mv, 0) {
                self.weights[i] = 0;
                self.gen.list.stash_loosing(i);
            } else {
                self.weights[i] = mvv_lva(mv);
            }
        }
        for i in captures..self.gen.list.len() {
            let mv = self.gen.list.get(i);
            debug_assert!(mv.is_promo());
            if mv == self.hash_mv {
                self.weights[i] = 0;
                self.gen.list.cnt.duplicate += 1;
            } else {
                self.weights[i] = mvv_lva_promo(mv);
            }
        }
    }

    /// Killer[0], killer[1], counter, in fixed priority.
    fn weight_killer(&mut self) {
        debug_assert!(self.gen.list.len() <= 3);
        for i in 0..self.gen.list.len() {
            let mv = self.gen.list.get(i);
            debug_assert!(mv.is_quiet());
            if mv == self.hash_mv {
                self.weights[i] = 0;
                self.gen.list.cnt.duplicate += 1;
            } else {
                self.weights[i] = (self.gen.list.len() - i) as i64;
            }
        }
    }

    fn already_served(&self, mv: Move) -> bool {
        mv == self.hash_mv || mv == self.killer[0] || mv == self.killer[1] || mv == self.counter
    }

    /// Composite history weighting of quiet moves.
    fn weight_quiet(&mut self, hist: &Histories) {
        for i in 0..self.gen.list.len() {
            let mv = self.gen.list.get(i);
            debug_assert!(mv.is_quiet());
            if self.already_served(mv) {
                self.weights[i] = 0;
                self.gen.list.cnt.duplicate += 1;
            } else {
                let scores = hist.get(mv, self.prev1, self.prev2);
                self.weights[i] = HIST_OFFSET + scores.sum();
                debug_assert!(self.weights[i] > 0);
            }
        }
    }

    fn weight_loosing(&mut self) {
        for i in 0..self.gen.list.len() {
            let mv = self.gen.list.get(i);
            debug_assert!(mv.is_capture() && !mv.is_promo());
            debug_assert!(mv != self.hash_mv);
            self.weights[i] = mvv_lva(mv);
        }
    }

    /// Deferred moves replay in insertion order.
    fn weight_deferred(&mut self) {
        for i in 0..self.gen.list.len() {
            self.weights[i] = 1;
        }
    }

    fn weight_tactical(&mut self) {
        let captures = self.gen.list.cnt.capture;
        for i in 0..captures {
            self.weights[i] = mvv_lva(self.gen.list.get(i));
        }
        for i in captures..self.gen.list.len() {
            self.weights[i] = mvv_lva_promo(self.gen.list.get(i));
        }
    }

    fn weight_evasion(&mut self) {
        for i in 0..self.gen.list.len() {
            debug_assert!(self.gen.list.get(i).is_quiet());
            self.weights[i] = 1;
        }
    }
}

/// One root move with its bookkeeping.
#[derive(Clone, Copy, Debug)]
pub struct RootNode {
    pub mv: Move,
    pub nodes: i64,
    pub weight: i64,
    pub check: bool,
    pub skip: bool,
}

/// Root move list: statically ordered at first, re-weighted by subtree size
/// each iteration, with multi-PV exclusions.
pub struct RootPick {
    pub root: Vec<RootNode>,
    pub tb_pos: bool,
    pos: Board,
}

impl RootPick {
    #[must_use]
    pub fn new(pos: &Board, searchmoves: &[Move]) -> Self {
        let mut gen = LegalGen::new(pos);
        if searchmoves.is_empty() {
            gen.gen_all();
        } else {
            for &mv in searchmoves {
                gen.list.push(mv);
            }
        }

        // a base order from one-ply static evaluations
        let mut cache = KingPawnHash::unallocated();
        let mut work = gen.pos;
        let mut root = Vec::with_capacity(gen.list.len());
        for &mv in gen.list.iter() {
            work.make_move(mv);
            root.push(RootNode {
                mv,
                nodes: 0,
                weight: i64::from(-crate::eval::static_eval(&work, &mut cache)),
                check: work.in_check(),
                skip: false,
            });
            gen.revert(&mut work);
        }

        RootPick {
            root,
            tb_pos: false,
            pos: *pos,
        }
    }

    #[inline]
    #[must_use]
    pub fn mv_cnt(&self) -> usize {
        self.root.len()
    }

    #[inline]
    #[must_use]
    pub fn single_reply(&self) -> bool {
        self.root.len() == 1
    }

    /// True when the best root move carries an exact tablebase-win weight
    /// (only meaningful after a WDL root probe).
    #[must_use]
    pub fn tb_win(&self) -> bool {
        self.root.first().map_or(false, |node| node.weight == i64::from(score::TB_WIN))
    }

    #[must_use]
    pub fn position(&self) -> &Board {
        &self.pos
    }

    pub fn sort_moves(&mut self) {
        self.root.sort_by(|a, b| b.weight.cmp(&a.weight));
    }

    /// Iteration upkeep: refresh weights from visited node counts, push the
    /// previous PV move to the front, or exclude an already-searched
    /// multi-PV move.
    pub fn rearrange_list(&mut self, pv_mv: Move, multipv_mv: Move) {
        if !multipv_mv.is_null() {
            self.exclude_move(multipv_mv);
        } else if !self.tb_pos {
            self.dynamical(pv_mv);
        } else {
            self.include_moves();
        }
    }

    fn dynamical(&mut self, pv_mv: Move) {
        const PV_BONUS: i64 = 1 << 62;
        for node in &mut self.root {
            debug_assert!(node.nodes >= 0);
            node.weight += node.nodes;
            node.weight /= 2;
            node.skip = false;
            if node.mv == pv_mv {
                node.weight = PV_BONUS;
            }
        }
        self.sort_moves();
    }

    fn exclude_move(&mut self, multipv_mv: Move) {
        for node in &mut self.root {
            if node.mv == multipv_mv {
                node.skip = true;
                return;
            }
        }
        debug_assert!(false, "excluded move not in root list");
    }

    fn include_moves(&mut self) {
        for node in &mut self.root {
            node.skip = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Color, MoveFlag, Piece, Square};

    fn picker_for(fen: &str, hash_mv: Move) -> MovePicker<false> {
        let pos = Board::from_fen(fen).unwrap();
        MovePicker::main(
            &pos,
            hash_mv,
            Move::NULL,
            Move::NULL,
            Move::NULL,
            [Move::NULL; 2],
            false,
            false,
        )
    }

    fn drain(picker: &mut MovePicker<false>, hist: &Histories) -> Vec<Move> {
        let mut out = Vec::new();
        while let Some(mv) = picker.next(hist, &[]) {
            out.push(mv);
        }
        out
    }

    #[test]
    fn hash_move_served_first_and_once() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let pos = Board::from_fen(fen).unwrap();
        let hash_mv = Move::new(
            "e2".parse::<Square>().unwrap(),
            "a6".parse::<Square>().unwrap(),
            Piece::Bishop,
            Some(Piece::Bishop),
            Color::White,
            MoveFlag::None,
        );
        assert!(pos.pseudolegal(hash_mv));

        let mut picker = picker_for(fen, hash_mv);
        let hist = Histories::new();
        let all = drain(&mut picker, &hist);
        assert_eq!(all[0], hash_mv);
        assert_eq!(all.iter().filter(|&&mv| mv == hash_mv).count(), 1);
    }

    #[test]
    fn winning_captures_before_loosing() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let pos = Board::from_fen(fen).unwrap();
        let mut picker = picker_for(fen, Move::NULL);
        let hist = Histories::new();
        let all = drain(&mut picker, &hist);

        // all moves exactly once
        let mut pseudo = PseudoGen::new(&pos);
        pseudo.gen_all();
        assert_eq!(all.len(), pseudo.list.len());

        // captures with non-negative SEE come before every loosing capture
        let first_loosing = all
            .iter()
            .position(|&mv| mv.is_capture() && !see::see_above(&pos, mv, 0));
        let last_winning = all
            .iter()
            .rposition(|&mv| mv.is_capture() && !mv.is_promo() && see::see_above(&pos, mv, 0));
        if let (Some(loosing), Some(winning)) = (first_loosing, last_winning) {
            assert!(winning < loosing);
        }
    }

    #[test]
    fn quiets_follow_history_order() {
        let fen = "4k3/8/8/8/8/8/8/RN2K3 w - - 0 1";
        let pos = Board::from_fen(fen).unwrap();
        let mut hist = Histories::new();
        // teach the history that Nc3 is great
        let nc3 = Move::new(
            "b1".parse::<Square>().unwrap(),
            "c3".parse::<Square>().unwrap(),
            Piece::Knight,
            None,
            Color::White,
            MoveFlag::None,
        );
        hist.update(nc3, Move::NULL, Move::NULL, &[nc3], 10);

        let mut picker = MovePicker::main(
            &pos,
            Move::NULL,
            Move::NULL,
            Move::NULL,
            Move::NULL,
            [Move::NULL; 2],
            false,
            false,
        );
        let all = drain(&mut picker, &hist);
        let quiets: Vec<Move> = all.into_iter().filter(|m| m.is_quiet()).collect();
        assert_eq!(quiets[0], nc3);
    }

    #[test]
    fn killers_precede_plain_quiets() {
        let fen = "4k3/8/8/8/8/8/8/RN2K3 w - - 0 1";
        let pos = Board::from_fen(fen).unwrap();
        let killer = Move::new(
            "a1".parse::<Square>().unwrap(),
            "a4".parse::<Square>().unwrap(),
            Piece::Rook,
            None,
            Color::White,
            MoveFlag::None,
        );
        assert!(pos.pseudolegal(killer));
        let mut picker = MovePicker::main(
            &pos,
            Move::NULL,
            Move::NULL,
            Move::NULL,
            Move::NULL,
            [killer, Move::NULL],
            false,
            false,
        );
        let hist = Histories::new();
        let all = drain(&mut picker, &hist);
        let quiets: Vec<Move> = all.into_iter().filter(|m| m.is_quiet()).collect();
        assert_eq!(quiets[0], killer);
        assert_eq!(quiets.iter().filter(|&&mv| mv == killer).count(), 1);
    }

    #[test]
    fn qsearch_picker_yields_tactical_only() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let pos = Board::from_fen(fen).unwrap();
        let mut picker = MovePicker::qsearch(&pos, false);
        let hist = Histories::new();
        while let Some(mv) = picker.next(&hist, &[]) {
            assert!(mv.is_capture() || mv.promo_piece() == Some(Piece::Queen));
        }
    }
}
