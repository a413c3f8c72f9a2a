//! 规则引擎
//!
//! 纯函数实现的落子校验、覆盖结算、终局判定与计分。

use rand::Rng;

use crate::board::{Board, LineKind, LINES};
use crate::constants::{MAX_PIECE_VALUE, MIN_PIECE_VALUE};
use crate::error::RuleError;
use crate::piece::{Piece, PieceValue, Position, Seat};
use crate::state::{GameStatus, MatchState, Player, Scores};

/// 落子结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceResult {
    pub board: Board,
    /// 每方因被覆盖而获得的 n 棋子数，按座位下标
    pub n_gains: [u32; 2],
}

/// 终局判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEnd {
    /// 继续
    Ongoing,
    /// 有一方连成一线
    Line { kind: LineKind, winner: Seat },
    /// 棋盘已满
    BoardFull,
}

/// 初始化对局
///
/// 两位玩家持有全部数字棋子、没有 n 棋子，先手随机决定。
pub fn initialize_match<R: Rng + ?Sized>(player1: Player, player2: Player, rng: &mut R) -> MatchState {
    let reset = |mut player: Player, seat: Seat| {
        player.id = seat;
        player.pieces = crate::constants::INITIAL_PIECES.to_vec();
        player.n_pieces = 0;
        player
    };
    let current_player = if rng.gen_bool(0.5) { Seat::First } else { Seat::Second };

    MatchState {
        players: vec![reset(player1, Seat::First), reset(player2, Seat::Second)],
        current_player,
        game_status: GameStatus::Playing,
        ..MatchState::default()
    }
}

/// 只检查格子规则（不检查持有）
pub fn check_cell(board: &Board, pos: Position, piece: PieceValue, seat: Seat) -> Result<(), RuleError> {
    if let PieceValue::Number(v) = piece {
        if !(MIN_PIECE_VALUE..=MAX_PIECE_VALUE).contains(&v) {
            return Err(RuleError::InvalidPieceValue(v));
        }
    }
    let Some(occupant) = board.get(pos) else {
        return Ok(());
    };
    if occupant.owner == seat {
        return Err(RuleError::OwnPiece);
    }
    if piece.is_token() {
        return Err(RuleError::TokenCannotOverwrite);
    }
    if !piece.beats(occupant.value) {
        return Err(RuleError::TooWeak {
            attacker: piece,
            defender: occupant.value,
        });
    }
    Ok(())
}

/// 完整校验一次落子，返回规范化后的位置
pub fn check_placement(
    board: &Board,
    row: i32,
    col: i32,
    piece: PieceValue,
    seat: Seat,
    players: &[Player],
) -> Result<Position, RuleError> {
    let pos = Position::new(row, col).ok_or(RuleError::OutOfBounds { row, col })?;
    check_cell(board, pos, piece, seat)?;
    let player = players
        .get(seat.index())
        .ok_or(RuleError::MissingPlayer(seat.index() as u8))?;
    if !player.holds(piece) {
        return Err(RuleError::PieceUnavailable(piece));
    }
    Ok(pos)
}

/// 落子是否合法
pub fn validate_move(
    board: &Board,
    row: i32,
    col: i32,
    piece: PieceValue,
    seat: Seat,
    players: &[Player],
) -> bool {
    check_placement(board, row, col, piece, seat, players).is_ok()
}

/// 落子并结算覆盖
///
/// 覆盖对方棋子时，被覆盖方获得一枚 n 棋子。调用方应先校验；
/// 无法覆盖的目标保持原样。
pub fn place_piece(board: &Board, pos: Position, piece: PieceValue, seat: Seat) -> PlaceResult {
    let mut next = *board;
    let mut n_gains = [0u32; 2];

    match board.get(pos) {
        Some(defender) if defender.owner != seat => {
            if !piece.beats(defender.value) {
                return PlaceResult { board: next, n_gains };
            }
            n_gains[defender.owner.index()] += 1;
        }
        Some(_) => return PlaceResult { board: next, n_gains },
        None => {}
    }

    next.set(pos, Some(Piece::new(piece, seat)));
    PlaceResult { board: next, n_gains }
}

/// 终局判定
///
/// 依次检查列、行、对角线，先找到的一线决定胜者；否则棋盘满则按分数结算。
pub fn check_game_end(board: &Board) -> GameEnd {
    for (kind, line) in LINES.iter() {
        if let Some(winner) = board.line_owner(line) {
            return GameEnd::Line { kind: *kind, winner };
        }
    }
    if board.is_full() {
        GameEnd::BoardFull
    } else {
        GameEnd::Ongoing
    }
}

/// 计算终局得分（只累计数字棋子）
pub fn calculate_final_scores(board: &Board) -> Scores {
    board
        .all_pieces()
        .into_iter()
        .fold(Scores::default(), |mut scores, (_, piece)| {
            let worth = piece.value.worth() as u32;
            match piece.owner {
                Seat::First => scores.player1 += worth,
                Seat::Second => scores.player2 += worth,
            }
            scores
        })
}

/// 决定下一位落子者
///
/// 对手无子可下而当前玩家仍有棋子时，当前玩家连续落子。
pub fn next_player(current: Seat, players: &[Player]) -> Seat {
    let has = |seat: Seat| players.get(seat.index()).map_or(false, Player::has_pieces);
    let opponent = current.opponent();
    if !has(opponent) && has(current) {
        current
    } else {
        opponent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn roster() -> Vec<Player> {
        vec![
            Player::named(Seat::First, "Alice"),
            Player::named(Seat::Second, "Bob"),
        ]
    }

    #[test]
    fn test_initialize_match() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut alice = Player::named(Seat::Second, "Alice");
        alice.pieces.clear();
        alice.n_pieces = 3;

        let state = initialize_match(alice, Player::named(Seat::First, "Bob"), &mut rng);
        assert_eq!(state.game_status, GameStatus::Playing);
        assert!(state.board.is_empty());
        assert_eq!(state.players[0].id, Seat::First);
        assert_eq!(state.players[0].pieces.len(), 8);
        assert_eq!(state.players[0].n_pieces, 0);
        assert_eq!(state.players[1].id, Seat::Second);
        assert!(state.move_history.is_empty());
        assert_eq!(state.winner, None);
    }

    #[test]
    fn test_first_player_is_random() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut seen = [false; 2];
        for _ in 0..64 {
            let state = initialize_match(roster()[0].clone(), roster()[1].clone(), &mut rng);
            seen[state.current_player.index()] = true;
        }
        assert_eq!(seen, [true, true]);
    }

    #[test]
    fn test_validate_overwrite_rules() {
        let board = Board::empty()
            .with(1, 1, PieceValue::Number(5), Seat::Second)
            .with(2, 2, PieceValue::Token, Seat::Second)
            .with(3, 3, PieceValue::Number(2), Seat::First);
        let mut players = roster();
        players[0].n_pieces = 1;

        assert!(validate_move(&board, 1, 1, PieceValue::Number(6), Seat::First, &players));
        assert!(!validate_move(&board, 1, 1, PieceValue::Number(5), Seat::First, &players));
        assert!(validate_move(&board, 2, 2, PieceValue::Number(1), Seat::First, &players));
        assert!(!validate_move(&board, 2, 2, PieceValue::Token, Seat::First, &players));
        assert!(!validate_move(&board, 3, 3, PieceValue::Number(8), Seat::First, &players));
        assert!(validate_move(&board, 0, 0, PieceValue::Token, Seat::First, &players));
        assert!(!validate_move(&board, 4, 0, PieceValue::Number(1), Seat::First, &players));
        assert!(!validate_move(&board, 0, -1, PieceValue::Number(1), Seat::First, &players));
    }

    #[test]
    fn test_check_placement_reasons() {
        let board = Board::empty().with(0, 0, PieceValue::Number(5), Seat::Second);
        let mut players = roster();
        players[0].pieces = vec![3];

        assert_eq!(
            check_placement(&board, 0, 0, PieceValue::Number(3), Seat::First, &players),
            Err(RuleError::TooWeak {
                attacker: PieceValue::Number(3),
                defender: PieceValue::Number(5),
            })
        );
        assert_eq!(
            check_placement(&board, 1, 0, PieceValue::Number(7), Seat::First, &players),
            Err(RuleError::PieceUnavailable(PieceValue::Number(7)))
        );
        assert_eq!(
            check_placement(&board, 0, 0, PieceValue::Token, Seat::First, &players),
            Err(RuleError::TokenCannotOverwrite)
        );
        assert_eq!(
            check_placement(&board, 9, 0, PieceValue::Number(3), Seat::First, &players),
            Err(RuleError::OutOfBounds { row: 9, col: 0 })
        );
        assert_eq!(
            check_placement(&board, 0, 0, PieceValue::Number(9), Seat::First, &players),
            Err(RuleError::InvalidPieceValue(9))
        );
        assert_eq!(
            check_placement(&board, 1, 1, PieceValue::Number(3), Seat::First, &players[..1]),
            Ok(Position::new_unchecked(1, 1))
        );
        assert_eq!(
            check_placement(&board, 1, 1, PieceValue::Number(3), Seat::Second, &players[..1]),
            Err(RuleError::MissingPlayer(1))
        );
    }

    #[test]
    fn test_place_piece_overwrite_grants_token() {
        let board = Board::empty().with(0, 0, PieceValue::Number(4), Seat::Second);
        let pos = Position::new_unchecked(0, 0);

        let result = place_piece(&board, pos, PieceValue::Number(7), Seat::First);
        assert_eq!(result.board.get(pos), Some(Piece::new(PieceValue::Number(7), Seat::First)));
        assert_eq!(result.n_gains, [0, 1]);

        let result = place_piece(&board, Position::new_unchecked(3, 3), PieceValue::Number(1), Seat::First);
        assert_eq!(result.n_gains, [0, 0]);
        assert_eq!(result.board.occupied(), 2);
    }

    #[test]
    fn test_place_piece_invalid_target_unchanged() {
        let board = Board::empty().with(0, 0, PieceValue::Number(6), Seat::Second);
        let result = place_piece(&board, Position::new_unchecked(0, 0), PieceValue::Number(2), Seat::First);
        assert_eq!(result.board, board);
        assert_eq!(result.n_gains, [0, 0]);
    }

    #[test]
    fn test_game_end_column_before_row() {
        // 第 0 列与第 0 行都属于 0 号玩家时，优先判定为竖线
        let mut board = Board::empty();
        for i in 0..4 {
            board = board
                .with(i, 0, PieceValue::Number(1), Seat::First)
                .with(0, i, PieceValue::Number(1), Seat::First);
        }
        assert_eq!(
            check_game_end(&board),
            GameEnd::Line { kind: LineKind::Column, winner: Seat::First }
        );
    }

    #[test]
    fn test_game_end_row_and_diagonals() {
        let mut row = Board::empty();
        let mut anti = Board::empty();
        for i in 0..4u8 {
            row = row.with(2, i, PieceValue::Token, Seat::Second);
            anti = anti.with(i, 3 - i, PieceValue::Number(i + 1), Seat::First);
        }
        assert_eq!(check_game_end(&row), GameEnd::Line { kind: LineKind::Row, winner: Seat::Second });
        assert_eq!(
            check_game_end(&anti),
            GameEnd::Line { kind: LineKind::Diagonal, winner: Seat::First }
        );
        assert_eq!(check_game_end(&Board::empty()), GameEnd::Ongoing);
    }

    #[test]
    fn test_board_full_without_line() {
        // 交错排布，没有任何一线
        let mut board = Board::empty();
        for pos in Position::all() {
            let owner = if (pos.row / 2 + pos.col) % 2 == 0 { Seat::First } else { Seat::Second };
            board.set(pos, Some(Piece::new(PieceValue::Number(1), owner)));
        }
        assert_eq!(check_game_end(&board), GameEnd::BoardFull);
    }

    #[test]
    fn test_final_scores_ignore_tokens() {
        let board = Board::empty()
            .with(0, 0, PieceValue::Number(8), Seat::First)
            .with(0, 1, PieceValue::Token, Seat::First)
            .with(1, 0, PieceValue::Number(3), Seat::Second)
            .with(1, 1, PieceValue::Number(2), Seat::Second);
        assert_eq!(calculate_final_scores(&board), Scores { player1: 8, player2: 5 });
        assert_eq!(calculate_final_scores(&Board::empty()), Scores::default());
    }

    #[test]
    fn test_next_player_skips_empty_handed_opponent() {
        let mut players = roster();
        assert_eq!(next_player(Seat::First, &players), Seat::Second);

        players[1].pieces.clear();
        assert_eq!(next_player(Seat::First, &players), Seat::First);

        players[1].n_pieces = 1;
        assert_eq!(next_player(Seat::First, &players), Seat::Second);

        players[0].pieces.clear();
        players[1].n_pieces = 0;
        assert_eq!(next_player(Seat::First, &players), Seat::Second);
    }

    fn arb_piece() -> impl Strategy<Value = PieceValue> {
        prop_oneof![
            (1u8..=8).prop_map(PieceValue::Number),
            Just(PieceValue::Token),
        ]
    }

    fn arb_board() -> impl Strategy<Value = Board> {
        prop::collection::vec(prop::option::of((arb_piece(), any::<bool>())), 16).prop_map(|cells| {
            let mut board = Board::empty();
            for (index, cell) in cells.into_iter().enumerate() {
                if let (Some(pos), Some((value, first))) = (Position::from_index(index), cell) {
                    let owner = if first { Seat::First } else { Seat::Second };
                    board.set(pos, Some(Piece::new(value, owner)));
                }
            }
            board
        })
    }

    proptest! {
        #[test]
        fn prop_legal_placement_lands_and_grants_at_most_one_token(
            board in arb_board(),
            row in 0i32..4,
            col in 0i32..4,
            piece in arb_piece(),
            first in any::<bool>(),
        ) {
            let seat = if first { Seat::First } else { Seat::Second };
            let mut players = roster();
            players[seat.index()].n_pieces = 1;
            let pos = Position::new_unchecked(row as u8, col as u8);

            if validate_move(&board, row, col, piece, seat, &players) {
                let result = place_piece(&board, pos, piece, seat);
                prop_assert_eq!(result.board.get(pos), Some(Piece::new(piece, seat)));
                prop_assert_eq!(result.n_gains[seat.index()], 0);
                let expected = u32::from(board.get(pos).is_some());
                prop_assert_eq!(result.n_gains[seat.opponent().index()], expected);
                prop_assert_eq!(result.board.occupied(), board.occupied() + 1 - expected as usize);
            }
        }

        #[test]
        fn prop_scores_bounded_by_piece_values(board in arb_board()) {
            let scores = calculate_final_scores(&board);
            let numeric: u32 = board
                .all_pieces()
                .iter()
                .map(|(_, p)| p.value.worth() as u32)
                .sum();
            prop_assert_eq!(scores.player1 + scores.player2, numeric);
        }

        #[test]
        fn prop_token_never_overwrites(board in arb_board(), index in 0usize..16) {
            let pos = Position::from_index(index).unwrap_or(Position::new_unchecked(0, 0));
            if board.get(pos).is_some() {
                prop_assert!(check_cell(&board, pos, PieceValue::Token, Seat::First).is_err());
                prop_assert!(check_cell(&board, pos, PieceValue::Token, Seat::Second).is_err());
            }
        }
    }
}
