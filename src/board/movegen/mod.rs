//! Staged move generation, legal or pseudo-legal.
//!
//! The generator keeps a fixed copy of the position; after a make, callers
//! restore through [`Generator::revert`]. Legal mode precomputes pin rays
//! and a check-evasion mask so every generated move is already legal;
//! pseudo-legal mode defers the king-safety test to the caller.

use super::attack_tables;
use super::masks;
use super::state::Board;
use super::types::bitboard::{self, Bitboard};
use super::types::{Color, KillerPair, Move, MoveFlag, MoveList, Piece, Square, Wing};

/// Pin rays for the side to move. Up to 8 pieces can be pinned at once; a
/// per-square slot number indexes the shared mask array, so lookups during
/// generation are O(1). Masks hold the *forbidden* target squares.
#[derive(Clone)]
pub struct PinMasks {
    forbidden: [Bitboard; 9],
    slot: [u8; 64],
    cnt: usize,
}

impl PinMasks {
    fn none() -> Self {
        PinMasks {
            forbidden: [0; 9],
            slot: [0; 64],
            cnt: 0,
        }
    }

    #[inline]
    fn forbidden(&self, sq: Square) -> Bitboard {
        self.forbidden[self.slot[sq.index()] as usize]
    }

    fn add(&mut self, sq: Square, mask: Bitboard) {
        let slot = &mut self.slot[sq.index()];
        if *slot != 0 {
            self.forbidden[*slot as usize] |= mask;
        } else {
            self.cnt += 1;
            debug_assert!(self.cnt <= 8);
            *slot = self.cnt as u8;
            self.forbidden[self.cnt] = mask;
        }
    }

    /// Find all pieces of the side to move pinned to their king and record
    /// their legal-move restrictions, including the en-passant rank pin.
    fn find(pos: &Board) -> Self {
        let mut pins = PinMasks::none();
        let cl = pos.stm();
        let enemy = !cl;
        let king = pos.king(cl);
        let king_bb = bitboard::bit(king);

        let diag_enemy = pos.side(enemy) & (pos.pieces(Piece::Bishop) | pos.pieces(Piece::Queen));
        let line_enemy = pos.side(enemy) & (pos.pieces(Piece::Rook) | pos.pieces(Piece::Queen));

        // sliders x-raying the king through anything
        let mut sliders = (diag_enemy & attack_tables::bishop_attacks(king.index(), diag_enemy))
            | (line_enemy & attack_tables::rook_attacks(king.index(), line_enemy));

        while sliders != 0 {
            let slider = bitboard::pop_lsb(&mut sliders);
            let ray = masks::ray(king, slider) ^ king_bb;
            let own = (ray ^ bitboard::bit(slider)) & pos.side(cl);
            let blockers = bitboard::popcnt(ray & pos.occupied());

            if blockers == 2 && own != 0 {
                pins.add(bitboard::lsb(own), !ray);
            } else if pos.ep_rear() != 0
                && blockers == 3
                && ray & pos.pieces_of(cl, Piece::Pawn) != 0
                && ray & pos.pieces_of(enemy, Piece::Pawn) != 0
            {
                // two pawns of opposite color side by side in the ray: an
                // en-passant capture would clear both and expose the king
                let pc = ray & pos.side(cl) & pos.pieces(Piece::Pawn);
                let vc = ray & pos.side(enemy) & pos.pieces(Piece::Pawn);
                if (pc << 1 == vc || pc >> 1 == vc)
                    && pos.ep_rear() == bitboard::push(vc, cl)
                {
                    pins.add(bitboard::lsb(pc), pos.ep_rear());
                }
            }
        }
        pins
    }
}

/// Check-evasion target zone: all squares when not in check, the checker's
/// capture-or-block ray against a single checker, empty under double check.
fn evasion_zone(pos: &Board) -> Bitboard {
    let cl = pos.stm();
    let king = pos.king(cl);
    let checkers = pos.attackers_to(king, pos.occupied()) & pos.side(!cl);

    match bitboard::popcnt(checkers) {
        0 => bitboard::FULL,
        1 => {
            if checkers & (pos.pieces(Piece::Knight) | pos.pieces(Piece::Pawn)) != 0 {
                checkers
            } else {
                masks::ray(king, bitboard::lsb(checkers)) ^ bitboard::bit(king)
            }
        }
        _ => bitboard::EMPTY,
    }
}

enum PawnStage {
    Quiet,
    PromoAll,
    PromoQueen,
    Capture,
    CapturePromoAll,
    CapturePromoQueen,
    EnPassant,
}

/// Staged move generator. `LEGAL` selects the generation mode at compile
/// time.
pub struct Generator<const LEGAL: bool> {
    /// Fixed snapshot of the position; [`Generator::revert`] copies it back.
    pub pos: Board,
    pub list: MoveList,
    evasions: Bitboard,
    pins: PinMasks,
}

pub type LegalGen = Generator<true>;
pub type PseudoGen = Generator<false>;

impl<const LEGAL: bool> Generator<LEGAL> {
    #[must_use]
    pub fn new(pos: &Board) -> Self {
        let (pins, evasions) = if LEGAL {
            (PinMasks::find(pos), evasion_zone(pos))
        } else {
            (PinMasks::none(), bitboard::FULL)
        };
        Generator {
            pos: *pos,
            list: MoveList::new(),
            evasions,
            pins,
        }
    }

    /// Copy the fixed snapshot back over a searched position.
    #[inline]
    pub fn revert(&self, pos: &mut Board) {
        *pos = self.pos;
    }

    /// Generate every move of the position.
    pub fn gen_all(&mut self) -> usize {
        debug_assert!(self.list.is_empty());
        self.pawns(PawnStage::Quiet);
        self.pawns(PawnStage::Capture);
        self.pawns(PawnStage::EnPassant);
        self.pawns(PawnStage::PromoAll);
        self.pawns(PawnStage::CapturePromoAll);
        self.piece_moves(&Piece::ALL[1..], true);
        self.piece_moves(&Piece::ALL[1..], false);
        self.castle();
        self.list.len()
    }

    /// "Generate" the hash move: validate it structurally, clearing the
    /// caller's copy when it does not fit the position.
    pub fn gen_hash(&mut self, hash_mv: &mut Move) -> usize {
        debug_assert!(self.list.is_empty());
        if !hash_mv.is_null() {
            if self.pos.pseudolegal(*hash_mv) {
                self.list.push(*hash_mv);
            } else {
                *hash_mv = Move::NULL;
            }
        }
        self.list.len()
    }

    /// All captures, including en passant, excluding promotions.
    pub fn gen_captures(&mut self) -> usize {
        debug_assert!(self.list.is_empty());
        self.pawns(PawnStage::Capture);
        self.pawns(PawnStage::EnPassant);
        self.piece_moves(
            &[Piece::King, Piece::Queen, Piece::Rook, Piece::Bishop, Piece::Knight],
            true,
        );
        self.list.cnt.capture = self.list.len();
        self.list.len()
    }

    /// Promotions; capture generation must run first so the counters line
    /// up.
    pub fn gen_promos(&mut self, queen_only: bool) -> usize {
        if queen_only {
            self.pawns(PawnStage::CapturePromoQueen);
            self.pawns(PawnStage::PromoQueen);
        } else {
            self.pawns(PawnStage::CapturePromoAll);
            self.pawns(PawnStage::PromoAll);
        }
        self.list.cnt.promo = self.list.len() - self.list.cnt.capture;
        self.list.cnt.promo
    }

    /// "Generate" the killer and counter moves that fit the position.
    pub fn gen_killers(&mut self, killers: &KillerPair, counter: Move) -> usize {
        debug_assert!(self.list.is_empty());
        for &kill in killers {
            if self.pos.pseudolegal(kill) {
                self.list.push(kill);
            }
        }
        if counter != killers[0] && counter != killers[1] && self.pos.pseudolegal(counter) {
            self.list.push(counter);
        }
        self.list.len()
    }

    /// All quiet moves, castling included.
    pub fn gen_quiets(&mut self) -> usize {
        self.piece_moves(
            &[Piece::King, Piece::Queen, Piece::Rook, Piece::Bishop, Piece::Knight],
            false,
        );
        self.castle();
        self.pawns(PawnStage::Quiet);
        self.list.len()
    }

    /// Bring the stashed loosing captures back to the front.
    pub fn restore_loosing(&mut self) -> usize {
        self.list.restore_loosing()
    }

    /// Reload a deferred-move buffer in insertion order.
    pub fn restore_deferred(&mut self, deferred: &[Move]) -> usize {
        debug_assert!(self.list.is_empty());
        for &mv in deferred {
            self.list.push(mv);
        }
        self.list.len()
    }

    fn pawns(&mut self, stage: PawnStage) {
        let cl = self.pos.stm();
        let pawns = self.pos.pieces_of(cl, Piece::Pawn);
        let empty = !self.pos.occupied();
        let enemy = self.pos.side(!cl);
        // one-step pushes already prove the middle square of a double empty
        let single = bitboard::push(pawns, cl) & empty;

        let push_delta = match cl {
            Color::White => 8,
            Color::Black => -8,
        };
        let (west_delta, east_delta) = match cl {
            Color::White => (7, 9),
            Color::Black => (-9, -7),
        };
        let west = |set: Bitboard| match cl {
            Color::White => (set & !bitboard::FILE_A) << 7,
            Color::Black => (set & !bitboard::FILE_A) >> 9,
        };
        let east = |set: Bitboard| match cl {
            Color::White => (set & !bitboard::FILE_H) << 9,
            Color::Black => (set & !bitboard::FILE_H) >> 7,
        };

        match stage {
            PawnStage::Quiet => {
                let one = single & self.evasions & !bitboard::PROMO_RANKS;
                let two = bitboard::push(single & bitboard::DOUBLE_PUSH_RANKS[cl.index()], cl)
                    & empty
                    & self.evasions;
                self.emit_pawns(one, push_delta, MoveFlag::None, false);
                self.emit_pawns(two, 2 * push_delta, MoveFlag::None, false);
            }
            PawnStage::PromoAll | PawnStage::PromoQueen => {
                let targets = single & self.evasions & bitboard::PROMO_RANKS;
                let all = matches!(stage, PawnStage::PromoAll);
                self.emit_pawns(targets, push_delta, MoveFlag::PromoQueen, all);
            }
            PawnStage::Capture => {
                let mask = enemy & self.evasions & !bitboard::PROMO_RANKS;
                self.emit_pawns(west(pawns) & mask, west_delta, MoveFlag::None, false);
                self.emit_pawns(east(pawns) & mask, east_delta, MoveFlag::None, false);
            }
            PawnStage::CapturePromoAll | PawnStage::CapturePromoQueen => {
                let mask = enemy & self.evasions & bitboard::PROMO_RANKS;
                let all = matches!(stage, PawnStage::CapturePromoAll);
                self.emit_pawns(west(pawns) & mask, west_delta, MoveFlag::PromoQueen, all);
                self.emit_pawns(east(pawns) & mask, east_delta, MoveFlag::PromoQueen, all);
            }
            PawnStage::EnPassant => {
                // capturing en passant can also evade a check by the
                // double-pushed pawn, hence the shifted evasion mask
                let mask = bitboard::push(self.evasions, cl) & self.pos.ep_rear();
                self.emit_pawns(west(pawns) & mask, west_delta, MoveFlag::EnPassant, false);
                self.emit_pawns(east(pawns) & mask, east_delta, MoveFlag::EnPassant, false);
            }
        }
    }

    fn emit_pawns(&mut self, mut targets: Bitboard, delta: i32, flag: MoveFlag, all_promos: bool) {
        let cl = self.pos.stm();
        while targets != 0 {
            let to = bitboard::pop_lsb(&mut targets);
            let from = Square::from_index((to.index() as i32 - delta) as usize);
            if bitboard::bit(to) & self.pins.forbidden(from) != 0 {
                continue;
            }
            let victim = if flag == MoveFlag::EnPassant {
                Some(Piece::Pawn)
            } else {
                self.pos.piece_on(to)
            };
            if all_promos {
                for promo in [
                    MoveFlag::PromoQueen,
                    MoveFlag::PromoRook,
                    MoveFlag::PromoBishop,
                    MoveFlag::PromoKnight,
                ] {
                    self.list.push(Move::new(from, to, Piece::Pawn, victim, cl, promo));
                }
            } else {
                self.list.push(Move::new(from, to, Piece::Pawn, victim, cl, flag));
            }
        }
    }

    fn piece_moves(&mut self, kinds: &[Piece], captures: bool) {
        let cl = self.pos.stm();
        let mask = if captures {
            self.pos.side(!cl)
        } else {
            !self.pos.occupied()
        };

        for &pc in kinds {
            let mut from_set = self.pos.pieces_of(cl, pc);
            while from_set != 0 {
                let from = bitboard::pop_lsb(&mut from_set);
                let evasions = if pc == Piece::King { bitboard::FULL } else { self.evasions };
                let mut targets = attack_tables::by_piece(pc, from, cl, self.pos.occupied())
                    & mask
                    & evasions
                    & !self.pins.forbidden(from);
                if pc == Piece::King {
                    targets = self.pos.unattacked(cl, targets);
                }
                while targets != 0 {
                    let to = bitboard::pop_lsb(&mut targets);
                    self.list.push(Move::new(
                        from,
                        to,
                        pc,
                        self.pos.piece_on(to),
                        cl,
                        MoveFlag::None,
                    ));
                }
            }
        }
    }

    /// Castling moves; generation is always fully legal.
    fn castle(&mut self) {
        let cl = self.pos.stm();
        for wing in Wing::BOTH {
            let Some(rook) = self.pos.castle_right[cl.index()][wing.index()] else {
                continue;
            };
            if self.pos.castle_path_clear(cl, wing) {
                let flag = match wing {
                    Wing::East => MoveFlag::CastleEast,
                    Wing::West => MoveFlag::CastleWest,
                };
                self.list.push(Move::new(
                    self.pos.king(cl),
                    rook,
                    Piece::King,
                    None,
                    cl,
                    flag,
                ));
            }
        }
    }
}

/// Perft with fully legal generation.
#[must_use]
pub fn perft_legal(pos: &Board, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let mut gen = LegalGen::new(pos);
    gen.gen_all();
    if depth == 1 {
        return gen.list.len() as u64;
    }
    let mut nodes = 0;
    let mut work = gen.pos;
    for &mv in gen.list.iter() {
        work.make_move(mv);
        debug_assert!(work.legal());
        nodes += perft_legal(&work, depth - 1);
        gen.revert(&mut work);
    }
    nodes
}

/// Perft with pseudo-legal generation plus post-make legality filtering.
#[must_use]
pub fn perft_pseudo(pos: &Board, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let mut gen = PseudoGen::new(pos);
    gen.gen_all();
    let mut nodes = 0;
    let mut work = gen.pos;
    for &mv in gen.list.iter() {
        work.make_move(mv);
        if work.legal() {
            nodes += if depth == 1 {
                1
            } else {
                perft_pseudo(&work, depth - 1)
            };
        }
        gen.revert(&mut work);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::fen::START_FEN;

    #[test]
    fn twenty_moves_from_start() {
        let pos = Board::from_fen(START_FEN).unwrap();
        let mut gen = LegalGen::new(&pos);
        assert_eq!(gen.gen_all(), 20);
    }

    #[test]
    fn legal_and_pseudo_agree_shallow() {
        let fens = [
            START_FEN,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        ];
        for fen in fens {
            let pos = Board::from_fen(fen).unwrap();
            for depth in 1..=3 {
                assert_eq!(
                    perft_legal(&pos, depth),
                    perft_pseudo(&pos, depth),
                    "{fen} depth {depth}"
                );
            }
        }
    }

    #[test]
    fn evasions_only_when_in_check() {
        // white king in check from the rook: every generated move must
        // resolve the check
        let pos = Board::from_fen("4k3/8/8/8/4r3/8/3P4/4K3 w - - 0 1").unwrap();
        let mut gen = LegalGen::new(&pos);
        gen.gen_all();
        let mut work = gen.pos;
        for &mv in gen.list.iter() {
            work.make_move(mv);
            assert!(work.legal(), "{mv} leaves the king in check");
            gen.revert(&mut work);
        }
    }

    #[test]
    fn pinned_pieces_stay_on_their_ray() {
        // bishop d2 is pinned by the rook d8 against the king d1
        let pos = Board::from_fen("3r3k/8/8/8/8/8/3B4/3K4 w - - 0 1").unwrap();
        let mut gen = LegalGen::new(&pos);
        gen.gen_all();
        for &mv in gen.list.iter() {
            assert_ne!(
                (mv.piece(), mv.from()),
                (Piece::Bishop, Square::from_coords(3, 1)),
                "pinned bishop must not move off the d-file"
            );
        }
    }

    #[test]
    fn ep_exposing_rank_pin_is_removed() {
        // white pawn e5, black pawn just double-pushed d5; both on the 5th
        // rank between the black rook a5 and white king h5
        let pos = Board::from_fen("8/8/8/r2pP2K/8/8/8/4k3 w - d6 0 1").unwrap();
        let mut gen = LegalGen::new(&pos);
        gen.gen_all();
        for &mv in gen.list.iter() {
            assert!(!mv.is_en_passant(), "illegal ep capture generated");
        }
        // pseudo mode generates it, post-make filtering rejects it
        assert_eq!(perft_legal(&pos, 1), perft_pseudo(&pos, 1));
    }
}
