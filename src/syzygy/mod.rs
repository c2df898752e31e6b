//! Syzygy endgame tablebase probing (WDL + DTZ).
//!
//! Tables are discovered at `SyzygyPath` configuration time by testing all
//! material signatures, memory-mapped read-only, and parsed lazily behind a
//! per-entry double-checked lock. Probing is pure; cancellation is the
//! caller's business.

mod encode;
mod entry;
mod pairs;

use std::path::PathBuf;

use parking_lot::RwLock;

use crate::board::types::bitboard;
use crate::board::{zobrist, Board, Color, LegalGen, Piece, MoveFlag, REP_HISTORY};
use crate::score;
use crate::search::picker::RootPick;

use encode::{encode, Enc, FLAP, FL_TO_FL, MAX_PC};
use entry::{test_table, BaseEntry, DTZ, SUFFIX, WDL};

/// Largest supported table size in pieces.
pub const MAX_PIECES: i32 = 7;

const HASH_BITS: u32 = 12;
const HASH_SIZE: usize = 1 << HASH_BITS;

const WDL_TO_SCORE: [i32; 5] = [score::TB_LOSS, -2, score::DRAW, 2, score::TB_WIN];
const WDL_TO_DTZ: [i32; 5] = [-1, -101, 0, 101, 1];
const WDL_TO_MAP: [usize; 5] = [1, 3, 0, 2, 0];
const PA_FLAGS: [u8; 5] = [8, 0, 0, 0, 4];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Fail {
    /// No table covers this position.
    Missing,
    /// The DTZ table stores only the other side to move.
    OtherSide,
}

#[derive(Clone, Copy, Default)]
struct HashSlot {
    key: u64,
    entry: Option<usize>,
}

struct Inner {
    paths: Vec<PathBuf>,
    entries: Vec<BaseEntry>,
    hash: Vec<HashSlot>,
    cnt_wdl: usize,
    cnt_dtz: usize,
    max_pc: i32,
}

impl Inner {
    fn empty() -> Self {
        Inner {
            paths: Vec::new(),
            entries: Vec::new(),
            hash: vec![HashSlot::default(); HASH_SIZE],
            cnt_wdl: 0,
            cnt_dtz: 0,
            max_pc: 0,
        }
    }

    fn add_to_hash(&mut self, entry: usize, key: u64) {
        let mut idx = (key >> (64 - HASH_BITS)) as usize;
        while self.hash[idx].entry.is_some() {
            idx = (idx + 1) & (HASH_SIZE - 1);
        }
        self.hash[idx] = HashSlot {
            key,
            entry: Some(entry),
        };
    }

    fn lookup(&self, key: u64) -> Option<&BaseEntry> {
        let mut idx = (key >> (64 - HASH_BITS)) as usize;
        while self.hash[idx].key != 0 && self.hash[idx].key != key {
            idx = (idx + 1) & (HASH_SIZE - 1);
        }
        self.hash[idx].entry.map(|i| &self.entries[i])
    }

    /// Register one material signature if its WDL file exists.
    fn register(&mut self, white: &[u8], black: &[u8]) {
        let letter = |pc: u8| b"PNBRQK"[pc as usize] as char;
        let mut acronym = String::new();
        for &pc in white {
            acronym.push(letter(pc));
        }
        acronym.push('v');
        for &pc in black {
            acronym.push(letter(pc));
        }

        if !test_table(&self.paths, &format!("{acronym}{}", SUFFIX[WDL])) {
            return;
        }

        let mut counts = [[0u8; 6]; 2];
        for &pc in white {
            counts[0][pc as usize] += 1;
        }
        for &pc in black {
            counts[1][pc as usize] += 1;
        }

        let key1 = zobrist::material_key(&counts, false);
        let key2 = zobrist::material_key(&counts, true);

        let num = (white.len() + black.len()) as u8;
        let has_pawns = counts[0][0] > 0 || counts[1][0] > 0;
        let has_dtz = test_table(&self.paths, &format!("{acronym}{}", SUFFIX[DTZ]));

        let mut pawns = [counts[0][0], counts[1][0]];
        if pawns[1] > 0 && (pawns[0] == 0 || pawns[1] < pawns[0]) {
            pawns.swap(0, 1);
        }

        let singles = counts
            .iter()
            .flatten()
            .filter(|&&n| n == 1)
            .count();

        self.entries.push(BaseEntry::new(
            key1,
            acronym,
            num,
            key1 == key2,
            has_pawns,
            has_dtz,
            singles == 2,
            pawns,
        ));
        let idx = self.entries.len() - 1;
        self.cnt_wdl += 1;
        self.cnt_dtz += usize::from(has_dtz);
        self.max_pc = self.max_pc.max(i32::from(num));

        self.add_to_hash(idx, key1);
        if key2 != key1 {
            self.add_to_hash(idx, key2);
        }
    }
}

/// The tablebase front-end shared by all search workers.
pub struct Tablebases {
    inner: RwLock<Inner>,
}

impl Tablebases {
    #[must_use]
    pub fn new() -> Self {
        Tablebases {
            inner: RwLock::new(Inner::empty()),
        }
    }

    /// Number of registered tables.
    #[must_use]
    pub fn count(&self) -> usize {
        let inner = self.inner.read();
        inner.cnt_wdl + inner.cnt_dtz
    }

    #[must_use]
    pub fn max_pieces(&self) -> i32 {
        self.inner.read().max_pc
    }

    /// Reconfigure the search path and re-register every reachable material
    /// combination. Must not run concurrently with probing.
    pub fn set_path(&self, path: &str) {
        let mut inner = self.inner.write();
        *inner = Inner::empty();

        if path.is_empty() || path == "<empty>" {
            return;
        }
        let sep = if cfg!(windows) { ';' } else { ':' };
        inner.paths = path.split(sep).filter(|p| !p.is_empty()).map(PathBuf::from).collect();

        // enumerate all signatures up to MAX_PIECES men
        const K: u8 = 5;
        for p1 in 0..=4u8 {
            inner.register(&[K, p1], &[K]);
            for p2 in 0..=p1 {
                inner.register(&[K, p1], &[K, p2]);
                inner.register(&[K, p1, p2], &[K]);
                for p3 in 0..=4u8 {
                    inner.register(&[K, p1, p2], &[K, p3]);
                }
                for p3 in 0..=p2 {
                    inner.register(&[K, p1, p2, p3], &[K]);
                    for p4 in 0..=4u8 {
                        inner.register(&[K, p1, p2, p3], &[K, p4]);
                        for p5 in 0..=p4 {
                            inner.register(&[K, p1, p2, p3], &[K, p4, p5]);
                        }
                    }
                    for p4 in 0..=p3 {
                        inner.register(&[K, p1, p2, p3, p4], &[K]);
                        for p5 in 0..=4u8 {
                            inner.register(&[K, p1, p2, p3, p4], &[K, p5]);
                        }
                        for p5 in 0..=p4 {
                            inner.register(&[K, p1, p2, p3, p4, p5], &[K]);
                        }
                    }
                }
                for p3 in 0..=p1 {
                    let p4_max = if p3 == p1 { p2 } else { p3 };
                    for p4 in 0..=p4_max {
                        inner.register(&[K, p1, p2], &[K, p3, p4]);
                    }
                }
            }
        }

        log::info!(
            "tablebases found: {} DTZ, {} WDL",
            inner.cnt_dtz,
            inner.cnt_wdl
        );
    }

    /// Probe the WDL value of `pos` (-2 loss .. 2 win), resolving en
    /// passant and capture lines by a small search.
    #[must_use]
    pub fn probe_wdl(&self, pos: &Board) -> Option<i32> {
        let inner = self.inner.read();
        probe_wdl_inner(&inner, pos).map(|(wdl, _)| wdl)
    }

    /// Probe the DTZ value of `pos` (see the Syzygy conventions: ±1 mate or
    /// zeroing win, ±100 boundary, beyond ±100 cursed).
    #[must_use]
    pub fn probe_dtz(&self, pos: &Board) -> Option<i32> {
        let inner = self.inner.read();
        probe_dtz_inner(&inner, pos)
    }

    /// Weight and order the root moves by DTZ, preserving the 50-move rule.
    /// Returns false when any probe failed (root stays untouched).
    pub fn probe_dtz_root(
        &self,
        pos: &Board,
        pick: &mut RootPick,
        game_hash: &[u64; REP_HISTORY],
        offset: usize,
    ) -> bool {
        let inner = self.inner.read();
        if probe_dtz_inner(&inner, pos).is_none() {
            return false;
        }
        let repetition = pos.repetition(game_hash, offset);

        for i in 0..pick.root.len() {
            let mv = pick.root[i].mv;
            let mut work = *pos;
            work.make_move(mv);

            let mut sc = if work.half_move_clock() == 0 {
                // zeroing move: the WDL verdict converts directly
                match probe_wdl_inner(&inner, &work) {
                    Some((wdl, _)) => WDL_TO_DTZ[(-wdl + 2) as usize],
                    None => return false,
                }
            } else {
                match probe_dtz_inner(&inner, &work) {
                    Some(dtz) => {
                        let sc = -dtz;
                        sc + sc.signum()
                    }
                    None => return false,
                }
            };

            // a mating move scores exactly 1
            if work.in_check() && sc == 2 && is_mate(&work) {
                sc = 1;
            }

            let half = pos.half_move_clock() as i32;
            let weight = if sc > 0 {
                if half + sc <= 100 && !repetition {
                    score::TB_WIN - sc
                } else {
                    score::DRAW + sc / 10
                }
            } else if sc < 0 {
                if half - sc <= 100 {
                    score::TB_LOSS - sc
                } else {
                    score::DRAW + sc / 10
                }
            } else {
                score::DRAW
            };
            pick.root[i].weight = i64::from(weight);
        }
        pick.sort_moves();
        true
    }

    /// WDL fallback for missing DTZ tables: weight the root moves by the
    /// child WDL verdicts.
    pub fn probe_wdl_root(&self, pos: &Board, pick: &mut RootPick) -> bool {
        let inner = self.inner.read();
        if probe_wdl_inner(&inner, pos).is_none() {
            return false;
        }
        for i in 0..pick.root.len() {
            let mv = pick.root[i].mv;
            let mut work = *pos;
            work.make_move(mv);
            match probe_wdl_inner(&inner, &work) {
                Some((wdl, _)) => {
                    pick.root[i].weight = i64::from(WDL_TO_SCORE[(-wdl + 2) as usize]);
                }
                None => return false,
            }
        }
        pick.sort_moves();
        true
    }
}

impl Default for Tablebases {
    fn default() -> Self {
        Tablebases::new()
    }
}

fn is_mate(pos: &Board) -> bool {
    let mut gen = LegalGen::new(pos);
    gen.gen_all() == 0
}

/// Place the squares of the piece group at `pieces[i]` into `p`.
fn fill_squares(
    pos: &Board,
    pieces: &[u8; MAX_PC],
    flip: bool,
    mirror: usize,
    p: &mut [usize; MAX_PC],
    mut i: usize,
) -> usize {
    let code = pieces[i];
    let cl = Color::from_index(usize::from(code >> 3) ^ usize::from(flip));
    let pc = Piece::from_index(usize::from(code & 7) - 1);
    let mut bb = pos.side(cl) & pos.pieces(pc);
    debug_assert!(bb != 0);
    while bb != 0 {
        p[i] = bitboard::pop_lsb(&mut bb).index() ^ mirror;
        i += 1;
    }
    i
}

/// Core table probe. `s` is the WDL value for DTZ map selection.
fn probe_table(inner: &Inner, pos: &Board, s: i32, type_: usize) -> Result<i32, Fail> {
    // tables hold no castling positions
    if pos
        .castle_right
        .iter()
        .flatten()
        .any(Option::is_some)
    {
        return Err(Fail::Missing);
    }
    if type_ == WDL && pos.pieces(Piece::King) == pos.occupied() {
        return Ok(0);
    }

    let key = zobrist::material_key(&pos.piece_counts(), false);
    let Some(be) = inner.lookup(key) else {
        return Err(Fail::Missing);
    };
    if type_ == DTZ && !be.has_dtz {
        return Err(Fail::Missing);
    }
    let Some(table) = be.table(type_, &inner.paths) else {
        return Err(Fail::Missing);
    };

    let (flip, bside) = if be.symmetric {
        (pos.stm() != Color::White, false)
    } else {
        let flip = key != be.key;
        (flip, (pos.stm() == Color::White) == flip)
    };

    let num = usize::from(be.num);
    let mut p = [0usize; MAX_PC];

    let (ei_idx, t, flags) = if !be.has_pawns {
        let flags = table.dtz_flags[0];
        if type_ == DTZ && (flags & 1 != 0) != bside && !be.symmetric {
            return Err(Fail::OtherSide);
        }
        let ei_idx = if type_ == WDL { usize::from(bside) } else { 0 };
        let mut i = 0;
        while i < num {
            i = fill_squares(pos, &table.ei[ei_idx].pieces, flip, 0, &mut p, i);
        }
        (ei_idx, 0, flags)
    } else {
        let mirror = if flip { 0x38 } else { 0 };
        let mut i = fill_squares(pos, &table.ei[0].pieces, flip, mirror, &mut p, 0);

        // leading pawn file decides the sub-table
        for j in 1..usize::from(be.pawns[0]) {
            if FLAP[p[0]] > FLAP[p[j]] {
                p.swap(0, j);
            }
        }
        let t = FL_TO_FL[p[0] & 7];

        let flags = table.dtz_flags[t];
        if type_ == DTZ && (flags & 1 != 0) != bside && !be.symmetric {
            return Err(Fail::OtherSide);
        }
        let ei_idx = if type_ == WDL { t + 4 * usize::from(bside) } else { t };
        while i < num {
            i = fill_squares(pos, &table.ei[ei_idx].pieces, flip, mirror, &mut p, i);
        }
        (ei_idx, t, flags)
    };

    let ei = &table.ei[ei_idx];
    let enc = if be.has_pawns { Enc::File } else { Enc::Piece };
    let idx = encode(&mut p, ei, num, be.kk_enc, be.pawns, enc);
    let w = pairs::decompress(&ei.precomp, table.bytes(), idx);

    if type_ == WDL {
        return Ok(i32::from(w[0]) - 2);
    }

    let mut v = i32::from(w[0]) + (i32::from(w[1] & 0x0f) << 8);
    if flags & 2 != 0 {
        let m = WDL_TO_MAP[(s + 2) as usize];
        let map_idx = usize::from(table.dtz_map_idx[t][m]) + v as usize;
        v = if flags & 16 == 0 {
            i32::from(table.bytes()[table.dtz_map + map_idx])
        } else {
            i32::from(pairs::read_u16_le(table.bytes(), table.dtz_map + 2 * map_idx))
        };
    }
    if flags & PA_FLAGS[(s + 2) as usize] == 0 || (s & 1) != 0 {
        v *= 2;
    }
    Ok(v)
}

fn probe_wdl_table(inner: &Inner, pos: &Board) -> Option<i32> {
    probe_table(inner, pos, 0, WDL).ok()
}

fn probe_dtz_table(inner: &Inner, pos: &Board, wdl: i32) -> Result<i32, Fail> {
    probe_table(inner, pos, wdl, DTZ)
}

/// Capture-resolution alpha-beta over legal captures, WDL-valued.
fn probe_ab(inner: &Inner, pos: &Board, mut alpha: i32, beta: i32) -> Option<i32> {
    let mut gen = LegalGen::new(pos);
    gen.gen_captures();
    gen.gen_promos(false);

    let mut work = gen.pos;
    for &mv in gen.list.iter() {
        if !mv.is_capture() {
            continue;
        }
        work.make_move(mv);
        debug_assert!(work.legal());
        let sc = -probe_ab(inner, &work, -beta, -alpha)?;
        gen.revert(&mut work);
        if sc > alpha {
            if sc >= beta {
                return Some(sc);
            }
            alpha = sc;
        }
    }

    let sc = probe_wdl_table(inner, pos)?;
    Some(alpha.max(sc))
}

/// Full WDL probe. The second value is 2 when a winning (or decisive
/// en-passant) capture carries the result, which lets the DTZ probe take a
/// shortcut.
fn probe_wdl_inner(inner: &Inner, pos: &Board) -> Option<(i32, i32)> {
    let mut gen = LegalGen::new(pos);
    gen.gen_captures();
    gen.gen_promos(false);

    let mut best_capture = -3;
    let mut best_ep = -3;
    let mut work = gen.pos;

    for &mv in gen.list.iter() {
        if !mv.is_capture() {
            continue;
        }
        work.make_move(mv);
        debug_assert!(work.legal());
        let sc = -probe_ab(inner, &work, -2, -best_capture)?;
        gen.revert(&mut work);

        if sc > best_capture {
            if sc == 2 {
                return Some((2, 2));
            }
            if !mv.is_en_passant() {
                best_capture = sc;
            } else if sc > best_ep {
                best_ep = sc;
            }
        }
    }

    let wdl = probe_wdl_table(inner, pos)?;

    // max(wdl, best_capture) is the value without en-passant rights; an
    // en-passant capture may improve it, and a position that is stalemate
    // without the en-passant move takes its value from it
    if best_ep > best_capture {
        if best_ep > wdl {
            return Some((best_ep, 2));
        }
        best_capture = best_ep;
    }

    if best_capture >= wdl {
        return Some((best_capture, 1 + i32::from(best_capture > 0)));
    }

    if best_ep > -3 && wdl == 0 {
        let has_non_ep_capture = gen
            .list
            .iter()
            .any(|mv| mv.is_capture() && mv.flag() != MoveFlag::EnPassant);
        if !has_non_ep_capture && !pos.in_check() {
            let before = gen.list.len();
            gen.gen_quiets();
            if gen.list.len() == before {
                // stalemate without the en-passant move: its value decides
                return Some((best_ep, 2));
            }
        }
    }

    Some((wdl, 1))
}

fn probe_dtz_inner(inner: &Inner, pos: &Board) -> Option<i32> {
    let (wdl, success) = probe_wdl_inner(inner, pos)?;

    if wdl == 0 {
        return Some(0);
    }
    // winning capture (or decisive en-passant): the zeroing move bounds DTZ
    if success == 2 {
        return Some(WDL_TO_DTZ[(wdl + 2) as usize]);
    }

    let mut gen = LegalGen::new(pos);
    let mut work = gen.pos;

    // a winning pawn move zeroes the counter as well
    if wdl > 0 {
        gen.gen_all();
        for i in 0..gen.list.len() {
            let mv = gen.list.get(i);
            if mv.piece() != Piece::Pawn || mv.is_capture() {
                continue;
            }
            work.make_move(mv);
            let v = -probe_wdl_inner(inner, &work)?.0;
            gen.revert(&mut work);
            if v == wdl {
                return Some(WDL_TO_DTZ[(v + 2) as usize]);
            }
        }
    }

    match probe_dtz_table(inner, pos, wdl) {
        Ok(dtz) => {
            return Some(WDL_TO_DTZ[(wdl + 2) as usize] + if wdl > 0 { dtz } else { -dtz })
        }
        Err(Fail::Missing) => return None,
        Err(Fail::OtherSide) => {}
    }

    // the table stores the other side to move: take the best child DTZ
    let mut best = if wdl > 0 {
        i32::MAX
    } else {
        // losing captures and pawn moves bottom out at -1 / -101
        WDL_TO_DTZ[(wdl + 2) as usize]
    };
    if wdl <= 0 && gen.list.is_empty() {
        gen.gen_all();
    }

    for i in 0..gen.list.len() {
        let mv = gen.list.get(i);
        // captures and pawn moves were covered above or by `best`
        if mv.is_capture() || mv.piece() == Piece::Pawn {
            continue;
        }
        work.make_move(mv);
        let v = -probe_dtz_inner(inner, &work)?;
        if wdl > 0 {
            if v > 0 && v + 1 < best {
                best = v + 1;
            }
        } else if v - 1 < best {
            best = v - 1;
        }
        if v == 1 && work.in_check() && is_mate(&work) {
            best = 1;
        }
        gen.revert(&mut work);
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_registers_nothing() {
        let tbs = Tablebases::new();
        tbs.set_path("<empty>");
        assert_eq!(tbs.count(), 0);
        assert_eq!(tbs.max_pieces(), 0);
    }

    #[test]
    fn probes_fail_gracefully_without_tables() {
        let tbs = Tablebases::new();
        let pos = Board::from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").unwrap();
        assert!(tbs.probe_wdl(&pos).is_none());
        assert!(tbs.probe_dtz(&pos).is_none());
    }

    #[test]
    fn castling_positions_are_never_probed() {
        let inner = Inner::empty();
        let pos = Board::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        assert_eq!(probe_table(&inner, &pos, 0, WDL), Err(Fail::Missing));
    }

    #[test]
    fn nonexistent_directory_is_harmless() {
        let tbs = Tablebases::new();
        tbs.set_path("/nonexistent/syzygy/dir");
        assert_eq!(tbs.count(), 0);
    }
}
