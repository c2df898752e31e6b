//! Static exchange evaluation.
//!
//! Swap algorithm with x-ray attacker discovery. Answers threshold queries
//! only ("is this exchange at least `margin`?"), which lets most calls cut
//! off after one or two iterations.

use super::attack_tables;
use super::state::Board;
use super::types::bitboard::{self, Bitboard};
use super::types::{Move, Piece, Square};

/// Rough piece values in centipawn units, king effectively infinite.
pub const SEE_VALUE: [i32; 6] = [85, 350, 350, 575, 1100, 10_000];

fn least_valuable(pos: &Board, set: Bitboard) -> Option<(Bitboard, Piece)> {
    for pc in Piece::ALL {
        let candidates = pos.pieces(pc) & set;
        if candidates != 0 {
            let sq = bitboard::lsb(candidates);
            return Some((bitboard::bit(sq), pc));
        }
    }
    None
}

fn xray_attackers(pos: &Board, sq: Square, occ: Bitboard) -> Bitboard {
    occ & ((attack_tables::bishop_attacks(sq.index(), occ)
        & (pos.pieces(Piece::Bishop) | pos.pieces(Piece::Queen)))
        | (attack_tables::rook_attacks(sq.index(), occ)
            & (pos.pieces(Piece::Rook) | pos.pieces(Piece::Queen))))
}

/// True if the exchange sequence started by `mv` yields at least `margin`
/// for the moving side, assuming optimal recaptures.
#[must_use]
pub fn see_above(pos: &Board, mv: Move, margin: i32) -> bool {
    if mv.is_castling() {
        return 0 >= margin;
    }

    // cutoff if even a free piece is not good enough
    let mut sc = mv.victim().map_or(0, |vc| SEE_VALUE[vc.index()]) - margin;
    if sc < 0 {
        return false;
    }

    // cutoff if surviving the first recapture is already good enough
    let pc = mv.promo_piece().unwrap_or(mv.piece());
    sc -= SEE_VALUE[pc.index()];
    if sc >= 0 {
        return true;
    }

    let from_bb = bitboard::bit(mv.from());
    let to = mv.to();
    let mut cl = !mv.color();
    let mut occ = (pos.occupied() ^ from_bb) | bitboard::bit(to);
    if mv.is_en_passant() {
        occ ^= bitboard::push(pos.ep_rear(), cl);
    }
    let mut attackers = pos.attackers_to(to, occ) & !from_bb;

    loop {
        let Some((att_bb, att_pc)) = least_valuable(pos, attackers & pos.side(cl)) else {
            break;
        };
        attackers ^= att_bb;
        occ ^= att_bb;
        attackers |= xray_attackers(pos, to, occ);
        cl = !cl;

        // minimax the running balance and add the next capture
        sc = -sc - 1 - SEE_VALUE[att_pc.index()];

        if sc >= 0 {
            // if the king could be recaptured the capture was illegal and
            // the other side wins the exchange after all
            if att_pc == Piece::King && attackers & pos.side(cl) != 0 {
                cl = !cl;
            }
            break;
        }
    }
    mv.color() != cl
}

/// True if the quiet move flees a square where the piece would be lost to a
/// profitable capture.
#[must_use]
pub fn escape(pos: &Board, mv: Move) -> bool {
    debug_assert!(mv.is_quiet());
    let stay = Move::new(
        mv.from(),
        mv.from(),
        mv.piece(),
        None,
        mv.color(),
        super::types::MoveFlag::None,
    );
    !see_above(pos, stay, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::types::{Color, MoveFlag};

    fn capture(pos: &Board, from: &str, to: &str) -> Move {
        let from: Square = from.parse().unwrap();
        let to: Square = to.parse().unwrap();
        Move::new(
            from,
            to,
            pos.piece_on(from).unwrap(),
            pos.piece_on(to),
            pos.stm(),
            MoveFlag::None,
        )
    }

    #[test]
    fn pawn_takes_defended_pawn_is_even() {
        let pos = Board::from_fen("4k3/8/3p4/4p3/3P4/8/8/4K3 w - - 0 1").unwrap();
        let mv = capture(&pos, "d4", "e5");
        assert!(see_above(&pos, mv, 0));
        assert!(!see_above(&pos, mv, 1));
    }

    #[test]
    fn queen_takes_defended_pawn_loses() {
        let pos = Board::from_fen("4k3/8/3p4/4p3/8/8/4Q3/4K3 w - - 0 1").unwrap();
        let mv = capture(&pos, "e2", "e5");
        assert!(!see_above(&pos, mv, 0));
        // still above a large negative margin
        assert!(see_above(&pos, mv, SEE_VALUE[0] - SEE_VALUE[4]));
    }

    #[test]
    fn xray_battery_wins_exchange() {
        // two rooks doubled on the e-file against a lone defended pawn
        let pos = Board::from_fen("4r3/4r3/8/4P3/8/8/4R3/4RK2 b - - 0 1").unwrap();
        let mv = capture(&pos, "e7", "e5");
        // RxP, RxR, RxR, RxR: black ends a pawn down but even on rooks
        assert!(!see_above(&pos, mv, 1));
        assert!(see_above(&pos, mv, SEE_VALUE[0] - SEE_VALUE[3]));
    }

    #[test]
    fn monotone_in_margin() {
        let pos = Board::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let mut gen = crate::board::movegen::LegalGen::new(&pos);
        gen.gen_all();
        for &mv in gen.list.iter() {
            let mut prev = true;
            for margin in (-1200..=1200).step_by(100) {
                let now = see_above(&pos, mv, margin);
                assert!(prev || !now, "{mv} not monotone at margin {margin}");
                prev = now;
            }
        }
    }

    /// Reference exchange evaluation: each side may recapture with its
    /// least valuable attacker or stand pat. The attacker set is recomputed
    /// under the shrinking occupancy, so x-rays appear naturally. Only
    /// valid when no king can join the exchange.
    fn exchange_reference(
        pos: &Board,
        to: Square,
        occ: Bitboard,
        cl: crate::board::Color,
        standing: i32,
    ) -> i32 {
        let attackers = pos.attackers_to(to, occ) & occ & pos.side(cl);
        match least_valuable(pos, attackers) {
            Some((bb, pc)) => {
                let continued =
                    standing - exchange_reference(pos, to, occ ^ bb, !cl, SEE_VALUE[pc.index()]);
                continued.max(0)
            }
            None => 0,
        }
    }

    fn swap_reference(pos: &Board, mv: Move) -> i32 {
        let victim = mv.victim().map_or(0, |vc| SEE_VALUE[vc.index()]);
        let occ = pos.occupied() ^ bitboard::bit(mv.from());
        victim
            - exchange_reference(pos, mv.to(), occ, !mv.color(), SEE_VALUE[mv.piece().index()])
    }

    #[test]
    fn threshold_answers_match_the_reference_swap() {
        let fens = [
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            "4rrk1/pp1n3p/3q2pQ/2p1pb2/2PP4/2P3N1/P2B2PP/4RRK1 b - - 7 19",
        ];
        for fen in fens {
            let pos = Board::from_fen(fen).unwrap();
            let mut gen = crate::board::movegen::LegalGen::new(&pos);
            gen.gen_all();
            for &mv in gen.list.iter() {
                // the reference handles neither kings in the exchange nor
                // the special move kinds
                if !mv.is_capture()
                    || mv.is_promo()
                    || mv.is_en_passant()
                    || mv.piece() == Piece::King
                    || crate::board::attack_tables::KING_ATTACKS[mv.to().index()]
                        & pos.pieces(Piece::King)
                        != 0
                {
                    continue;
                }
                let net = swap_reference(&pos, mv);
                for margin in [-500, -100, 0, 1, 100, 500] {
                    assert_eq!(
                        see_above(&pos, mv, margin),
                        net >= margin,
                        "{fen} {mv} margin {margin} (reference net {net})"
                    );
                }
            }
        }
    }

    #[test]
    fn escape_detects_hanging_piece() {
        // white knight attacked by a pawn, moving away is an escape
        let pos = Board::from_fen("4k3/8/8/3p4/8/4N3/8/4K3 w - - 0 1").unwrap();
        let from: Square = "e3".parse().unwrap();
        let to: Square = "g2".parse().unwrap();
        let mv = Move::new(from, to, Piece::Knight, None, Color::White, MoveFlag::None);
        assert!(escape(&pos, mv));
    }
}
