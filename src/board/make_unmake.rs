//! State transitions: make-move, null move, structural move checks.
//!
//! There is no undo log; callers restore by copying back the snapshot held
//! by their move generator.

use super::attack_tables;
use super::masks;
use super::state::Board;
use super::types::bitboard::{self, Bitboard};
use super::types::castling::{king_target, rook_target};
use super::types::{Color, Move, MoveFlag, Piece, Square, Wing};
use super::zobrist;

/// State a null move clobbers, returned to the caller for the revert.
#[derive(Clone, Copy)]
pub struct NullState {
    ep_rear: Bitboard,
    last_capture: Option<Square>,
}

impl Board {
    /// Execute `mv`. The move must be pseudo-legal; legality of the king is
    /// checked by the caller via [`Board::legal`] after the make.
    pub fn make_move(&mut self, mv: Move) {
        debug_assert!(self.pseudolegal(mv));

        self.move_count += 1;
        self.half_move_clock += 1;
        self.last_capture = None;

        let cl = self.stm;
        let enemy = !cl;
        let from = mv.from();
        let mut to = mv.to();
        let from_bb = bitboard::bit(from);
        let mut to_bb = bitboard::bit(to);
        let pc = mv.piece();
        let castle = mv.is_castling();

        // engaged rooks cost their castling right
        if pc == Piece::Rook {
            self.revoke_castle_right(cl, from);
        }
        if mv.victim() == Some(Piece::Rook) {
            self.revoke_castle_right(enemy, to);
        }

        // remove the captured piece
        if let Some(vc) = mv.victim() {
            if mv.is_en_passant() {
                debug_assert_eq!(self.ep_rear, to_bb);
                let vc_bb = bitboard::push(to_bb, enemy);
                debug_assert!(vc_bb & self.pieces_of(enemy, Piece::Pawn) != 0);
                let vsq = bitboard::lsb(vc_bb);

                self.pieces[Piece::Pawn.index()] &= !vc_bb;
                self.side[enemy.index()] &= !vc_bb;
                self.piece_on[vsq.index()] = None;

                let key = zobrist::piece_key(enemy, Piece::Pawn, vsq);
                self.key ^= key;
                self.kingpawn_key ^= key;
            } else {
                debug_assert!(to_bb & self.pieces_of(enemy, vc) != 0);
                self.pieces[vc.index()] &= !to_bb;
                self.side[enemy.index()] &= !to_bb;
                self.key ^= zobrist::piece_key(enemy, vc, to);
                if vc == Piece::Pawn {
                    self.kingpawn_key ^= zobrist::piece_key(enemy, Piece::Pawn, to);
                }
            }
            self.half_move_clock = 0;
            self.last_capture = Some(to);
        }

        // retire the old en-passant state
        if self.ep_rear != 0 {
            self.key ^= self.ep_key(enemy, self.ep_rear);
            self.ep_rear = 0;
        }

        if pc == Piece::Pawn {
            self.half_move_clock = 0;
            self.kingpawn_key ^=
                zobrist::piece_key(cl, Piece::Pawn, from) ^ zobrist::piece_key(cl, Piece::Pawn, to);

            // double push opens an en-passant window
            if from.index().abs_diff(to.index()) == 16 {
                debug_assert!(mv.victim().is_none());
                let ep = Square::from_index((from.index() + to.index()) / 2);
                self.ep_rear = bitboard::bit(ep);
                self.key ^= self.ep_key(cl, self.ep_rear);
            }
        }

        // castling transports the king to its fixed destination
        let wing = match mv.flag() {
            MoveFlag::CastleEast => Some(Wing::East),
            MoveFlag::CastleWest => Some(Wing::West),
            _ => None,
        };
        if let Some(wing) = wing {
            to = king_target(cl, wing);
            to_bb = bitboard::bit(to);
        }

        // transport the piece
        self.pieces[pc.index()] ^= from_bb;
        self.pieces[pc.index()] |= to_bb;
        self.side[cl.index()] ^= from_bb;
        self.side[cl.index()] |= to_bb;
        self.piece_on[from.index()] = None;
        self.piece_on[to.index()] = Some(pc);
        self.key ^= zobrist::piece_key(cl, pc, from) ^ zobrist::piece_key(cl, pc, to);

        // then the rook completes the castle
        if let Some(wing) = wing {
            self.castle_rook_transport(cl, wing);
        }

        // promotion replaces the pawn on the destination
        if let Some(promo) = mv.promo_piece() {
            debug_assert!(self.pieces(Piece::Pawn) & to_bb != 0);
            self.pieces[Piece::Pawn.index()] ^= to_bb;
            self.pieces[promo.index()] |= to_bb;
            self.piece_on[to.index()] = Some(promo);
            self.key ^=
                zobrist::piece_key(cl, Piece::Pawn, to) ^ zobrist::piece_key(cl, promo, to);
            self.kingpawn_key ^= zobrist::piece_key(cl, Piece::Pawn, to);
        }

        // a moved king loses both rights
        if to_bb & self.pieces(Piece::King) != 0 {
            self.king_sq[cl.index()] = to;
            for wing in Wing::BOTH {
                if self.castle_right[cl.index()][wing.index()].take().is_some() {
                    self.key ^= zobrist::castle_key(cl, wing);
                }
            }
            self.kingpawn_key ^=
                zobrist::piece_key(cl, Piece::King, from) ^ zobrist::piece_key(cl, Piece::King, to);
        }

        self.occupied = self.side[0] | self.side[1];
        self.stm = enemy;
        self.key ^= zobrist::KEYS.turn;

        debug_assert_eq!(self.side[0] | self.side[1], self.side[0] ^ self.side[1]);
        debug_assert_eq!(self.key, self.scratch_key());
        debug_assert_eq!(self.kingpawn_key, self.scratch_kingpawn_key());
    }

    /// Pretend to move: flip the side to move, keep every piece in place.
    pub fn make_null(&mut self) -> NullState {
        let saved = NullState {
            ep_rear: self.ep_rear,
            last_capture: self.last_capture,
        };
        if self.ep_rear != 0 {
            self.key ^= self.ep_key(!self.stm, self.ep_rear);
            self.ep_rear = 0;
        }
        self.half_move_clock += 1;
        self.move_count += 1;
        self.key ^= zobrist::KEYS.turn;
        self.stm = !self.stm;
        debug_assert_eq!(self.key, self.scratch_key());
        saved
    }

    pub fn revert_null(&mut self, saved: NullState) {
        self.stm = !self.stm;
        self.key ^= zobrist::KEYS.turn;
        self.half_move_clock -= 1;
        self.move_count -= 1;
        if saved.ep_rear != 0 {
            self.ep_rear = saved.ep_rear;
            self.key ^= self.ep_key(!self.stm, saved.ep_rear);
        }
        self.last_capture = saved.last_capture;
        debug_assert_eq!(self.key, self.scratch_key());
    }

    fn revoke_castle_right(&mut self, cl: Color, sq: Square) {
        for wing in Wing::BOTH {
            if self.castle_right[cl.index()][wing.index()] == Some(sq) {
                self.castle_right[cl.index()][wing.index()] = None;
                self.key ^= zobrist::castle_key(cl, wing);
                break;
            }
        }
    }

    /// Move the castling rook to its destination; the king already stands on
    /// its own (FRC: the rook square may have been overwritten by the king).
    fn castle_rook_transport(&mut self, cl: Color, wing: Wing) {
        let from = self.castle_right[cl.index()][wing.index()]
            .expect("castle right present for executed castle");
        let to = rook_target(cl, wing);
        let from_bb = bitboard::bit(from);
        let to_bb = bitboard::bit(to);
        debug_assert!(matches!(self.piece_on(from), Some(Piece::Rook | Piece::King)));

        self.pieces[Piece::Rook.index()] ^= from_bb;
        self.pieces[Piece::Rook.index()] |= to_bb;

        if self.piece_on(from) == Some(Piece::Rook) {
            self.side[cl.index()] ^= from_bb;
            self.piece_on[from.index()] = None;
        }
        self.side[cl.index()] |= to_bb;
        self.piece_on[to.index()] = Some(Piece::Rook);

        self.key ^=
            zobrist::piece_key(cl, Piece::Rook, from) ^ zobrist::piece_key(cl, Piece::Rook, to);
    }

    /// Structural consistency of a move against the current position: the
    /// claimed pieces stand where the encoding says, the geometry works out
    /// under the current occupancy, and castling preconditions hold. Own-king
    /// safety is NOT checked.
    #[must_use]
    pub fn pseudolegal(&self, mv: Move) -> bool {
        if mv.is_null() {
            return false;
        }
        if mv.color() != self.stm {
            return false;
        }
        let from = mv.from();
        let to = mv.to();
        let from_bb = bitboard::bit(from);
        let to_bb = bitboard::bit(to);
        let pc = mv.piece();

        if from_bb & self.pieces_of(self.stm, pc) == 0 {
            return false;
        }

        if mv.is_castling() {
            if to_bb & self.pieces_of(self.stm, Piece::Rook) == 0 {
                return false;
            }
        } else if mv.victim().is_none() || mv.is_en_passant() {
            if self.piece_on(to).is_some() {
                return false;
            }
        } else if to_bb & self.pieces_of(!self.stm, mv.victim().expect("capture")) == 0 {
            return false;
        }

        match pc {
            Piece::Pawn => {
                // promotion flag must line up with the target rank
                if mv.is_promo() != (to.relative_rank(self.stm) == 7) {
                    return false;
                }
                if from.index().abs_diff(to.index()) == 16 {
                    self.piece_on(Square::from_index((from.index() + to.index()) / 2))
                        .is_none()
                } else if mv.is_en_passant() {
                    self.ep_rear == to_bb
                } else {
                    let push_ok = mv.victim().is_none()
                        && to_bb == bitboard::push(from_bb, self.stm);
                    let capture_ok = (mv.victim().is_some() || mv.is_en_passant())
                        && attack_tables::PAWN_ATTACKS[self.stm.index()][from.index()] & to_bb != 0;
                    push_ok || capture_ok
                }
            }
            Piece::Knight => attack_tables::KNIGHT_ATTACKS[from.index()] & to_bb != 0,
            Piece::Bishop => {
                attack_tables::bishop_attacks(from.index(), self.occupied) & to_bb != 0
            }
            Piece::Rook => attack_tables::rook_attacks(from.index(), self.occupied) & to_bb != 0,
            Piece::Queen => attack_tables::queen_attacks(from.index(), self.occupied) & to_bb != 0,
            Piece::King => {
                if !mv.is_castling() {
                    attack_tables::KING_ATTACKS[from.index()] & to_bb != 0
                } else {
                    let wing = if mv.flag() == MoveFlag::CastleEast {
                        Wing::East
                    } else {
                        Wing::West
                    };
                    self.castle_right[self.stm.index()][wing.index()] == Some(to)
                        && self.castle_path_clear(self.stm, wing)
                }
            }
        }
    }

    /// Castling precondition: the ranges swept by king and rook hold nothing
    /// but the two of them, and no square of the king's walk is attacked.
    #[must_use]
    pub(crate) fn castle_path_clear(&self, cl: Color, wing: Wing) -> bool {
        let Some(rook_from) = self.castle_right[cl.index()][wing.index()] else {
            return false;
        };
        let king_from = self.king(cl);
        let king_to = king_target(cl, wing);
        let rook_to = rook_target(cl, wing);

        let (lo, hi) = match wing {
            Wing::East => (king_from.min(rook_to), king_to.max(rook_from)),
            Wing::West => (king_to.min(rook_from), king_from.max(rook_to)),
        };

        let occ = self.occupied ^ (bitboard::bit(king_from) | bitboard::bit(rook_from));
        if masks::between(lo, hi) & occ != 0 {
            return false;
        }

        // the walk includes both endpoints, so castling out of or through
        // check fails here; king and rook squares share the back rank
        let mut walk = masks::between(king_from, king_to) & bitboard::RANKS[king_from.rank()];
        while walk != 0 {
            let sq = bitboard::pop_lsb(&mut walk);
            if self.attackers_to(sq, occ) & self.side(!cl) != 0 {
                return false;
            }
        }
        true
    }

    /// Full legality check: structurally valid and does not leave the own
    /// king attacked. Expensive (makes the move on a copy); used for moves
    /// from external sources (book, TT, UCI input).
    #[must_use]
    pub fn legal_move(&self, mv: Move) -> bool {
        if !self.pseudolegal(mv) {
            return false;
        }
        let mut probe = *self;
        probe.make_move(mv);
        probe.legal()
    }

    /// Does executing `mv` put the enemy king in check? Covers direct,
    /// discovered (including en-passant double clearance) and promotion
    /// checks. Assumes a legal move.
    #[must_use]
    pub fn gives_check(&self, mv: Move) -> bool {
        debug_assert!(self.pseudolegal(mv));

        let cl = self.stm;
        let enemy_king = self.king(!cl);
        let mut occ = self.occupied;

        let (mut pc, mut from, mut to) = (mv.piece(), mv.from(), mv.to());
        if mv.is_castling() {
            // only the rook can deliver the check
            occ ^= bitboard::bit(from);
            let wing = if mv.flag() == MoveFlag::CastleEast {
                Wing::East
            } else {
                Wing::West
            };
            pc = Piece::Rook;
            from = to;
            to = rook_target(cl, wing);
        }

        let from_bb = bitboard::bit(from);
        let to_bb = bitboard::bit(to);
        occ ^= from_bb;
        occ |= to_bb;

        // direct check, with the promoted piece where applicable
        if let Some(promo) = mv.promo_piece() {
            pc = promo;
        }
        if attack_tables::by_piece(pc, to, cl, occ) & bitboard::bit(enemy_king) != 0 {
            return true;
        }

        // discovered check through the vacated square(s)
        if mv.is_en_passant() {
            occ &= !(from_bb | bitboard::push(self.ep_rear, !cl));
        }
        let diag = self.pieces(Piece::Bishop) | self.pieces(Piece::Queen);
        let line = self.pieces(Piece::Rook) | self.pieces(Piece::Queen);
        let mine = self.side(cl);

        attack_tables::bishop_attacks(enemy_king.index(), occ) & diag & occ & mine != 0
            || attack_tables::rook_attacks(enemy_king.index(), occ) & line & occ & mine != 0
    }

    /// Position key of the child after `mv`, ignoring EP/castling detail.
    /// Good enough for speculative TT prefetch.
    #[must_use]
    pub fn child_key(&self, mv: Move) -> u64 {
        let cl = self.stm;
        let mut key = self.key;
        let moved = mv.promo_piece().unwrap_or(mv.piece());
        key ^= zobrist::piece_key(cl, mv.piece(), mv.from());
        key ^= zobrist::piece_key(cl, moved, mv.to());
        if let Some(vc) = mv.victim() {
            key ^= zobrist::piece_key(!cl, vc, mv.to());
        }
        key ^ zobrist::KEYS.turn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::fen::START_FEN;

    fn mv(
        pos: &Board,
        from: Square,
        to: Square,
        fl: MoveFlag,
    ) -> Move {
        let pc = pos.piece_on(from).expect("from occupied");
        let vc = match fl {
            MoveFlag::EnPassant => Some(Piece::Pawn),
            MoveFlag::CastleEast | MoveFlag::CastleWest => None,
            _ => pos.piece_on(to),
        };
        Move::new(from, to, pc, vc, pos.stm(), fl)
    }

    #[test]
    fn copy_restore_round_trip() {
        let mut pos = Board::from_fen(START_FEN).unwrap();
        let saved = pos;
        let e4 = mv(
            &pos,
            Square::from_coords(4, 1),
            Square::from_coords(4, 3),
            MoveFlag::None,
        );
        pos.make_move(e4);
        assert_ne!(pos.key(), saved.key());
        pos = saved;
        assert_eq!(pos, saved);
    }

    #[test]
    fn en_passant_capture_removes_the_right_pawn() {
        let mut pos =
            Board::from_fen("rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3")
                .unwrap();
        let f5 = Square::from_coords(5, 4);
        let f6 = Square::from_coords(5, 5);
        let e5 = Square::from_coords(4, 4);
        let take = mv(&pos, e5, f6, MoveFlag::EnPassant);
        assert!(pos.pseudolegal(take));
        pos.make_move(take);
        assert_eq!(pos.piece_on(f5), None);
        assert_eq!(pos.piece_on(f6), Some(Piece::Pawn));
        assert_eq!(pos.key(), pos.scratch_key());
    }

    #[test]
    fn castling_moves_both_pieces() {
        let mut pos = Board::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let castle = mv(&pos, Square::E1, Square::H1, MoveFlag::CastleEast);
        assert!(pos.pseudolegal(castle));
        pos.make_move(castle);
        assert_eq!(pos.piece_on(Square::G1), Some(Piece::King));
        assert_eq!(pos.piece_on(Square::F1), Some(Piece::Rook));
        assert_eq!(pos.piece_on(Square::E1), None);
        assert_eq!(pos.piece_on(Square::H1), None);
        assert_eq!(pos.castle_right[0], [None, None]);
        assert_eq!(pos.key(), pos.scratch_key());
    }

    #[test]
    fn frc_castle_with_adjacent_rook() {
        // king f1, rook g1: castling east swaps them
        let mut pos = Board::from_fen("4k3/8/8/8/8/8/8/5KR1 w G - 0 1").unwrap();
        let castle = mv(&pos, Square::F1, Square::G1, MoveFlag::CastleEast);
        assert!(pos.pseudolegal(castle));
        let saved = pos;
        pos.make_move(castle);
        assert_eq!(pos.piece_on(Square::G1), Some(Piece::King));
        assert_eq!(pos.piece_on(Square::F1), Some(Piece::Rook));
        assert_eq!(pos.key(), pos.scratch_key());
        pos = saved;
        assert_eq!(pos.piece_on(Square::F1), Some(Piece::King));
    }

    #[test]
    fn null_move_round_trip() {
        let mut pos =
            Board::from_fen("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2")
                .unwrap();
        let key = pos.key();
        let saved = pos.make_null();
        assert_ne!(pos.key(), key);
        assert_eq!(pos.stm(), Color::Black);
        pos.revert_null(saved);
        assert_eq!(pos.key(), key);
        assert_eq!(pos.stm(), Color::White);
    }

    #[test]
    fn gives_check_detects_discovery() {
        // the knight on d5 screens the d1 rook from the d8 king
        let pos = Board::from_fen("3k4/8/8/3N4/8/8/8/3RK3 w - - 0 1").unwrap();
        let discover = mv(
            &pos,
            Square::from_coords(3, 4),
            Square::from_coords(1, 5),
            MoveFlag::None,
        );
        assert!(pos.gives_check(discover));
        let direct = mv(
            &pos,
            Square::from_coords(3, 4),
            Square::from_coords(5, 5),
            MoveFlag::None,
        );
        // f6 knight also clears the d-file
        assert!(pos.gives_check(direct));
    }
}
