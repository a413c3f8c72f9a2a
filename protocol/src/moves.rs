//! 落子定义和合法落子生成

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::piece::{PieceValue, Position, Seat};
use crate::rules::check_cell;
use crate::state::Player;

/// 一次落子（AI 与生成器使用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placement {
    pub pos: Position,
    pub piece: PieceValue,
}

impl Placement {
    /// 创建新落子
    pub fn new(pos: Position, piece: PieceValue) -> Self {
        Self { pos, piece }
    }

    pub fn row(&self) -> i32 {
        self.pos.row as i32
    }

    pub fn col(&self) -> i32 {
        self.pos.col as i32
    }
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.piece, self.pos)
    }
}

/// 对局历史中的一步
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    pub row: u8,
    pub col: u8,
    pub piece: PieceValue,
    pub player_id: Seat,
    /// 毫秒时间戳
    pub timestamp: i64,
}

impl Move {
    /// 创建历史记录
    pub fn new(placement: Placement, player_id: Seat, timestamp: i64) -> Self {
        Self {
            row: placement.pos.row,
            col: placement.pos.col,
            piece: placement.piece,
            player_id,
            timestamp,
        }
    }

    /// 还原为落子
    pub fn placement(&self) -> Placement {
        Placement::new(Position::new_unchecked(self.row, self.col), self.piece)
    }
}

/// 合法落子生成器
pub struct MoveGenerator;

impl MoveGenerator {
    /// 按给定棋子顺序生成合法落子
    ///
    /// 遍历顺序为行、列、棋子，只检查格子规则，不检查持有。
    pub fn placements_with(board: &Board, seat: Seat, pieces: &[PieceValue]) -> Vec<Placement> {
        let mut placements = Vec::new();
        for pos in Position::all() {
            for &piece in pieces {
                if check_cell(board, pos, piece, seat).is_ok() {
                    placements.push(Placement::new(pos, piece));
                }
            }
        }
        placements
    }

    /// 生成某方全部合法落子（数字降序，最后为 n）
    pub fn legal_placements(board: &Board, players: &[Player], seat: Seat) -> Vec<Placement> {
        match players.get(seat.index()) {
            Some(player) => Self::placements_with(board, seat, &player.available_pieces()),
            None => Vec::new(),
        }
    }

    /// 某方是否还有合法落子
    pub fn has_legal_placement(board: &Board, players: &[Player], seat: Seat) -> bool {
        let Some(player) = players.get(seat.index()) else {
            return false;
        };
        let pieces = player.available_pieces();
        Position::all().any(|pos| {
            pieces
                .iter()
                .any(|&piece| check_cell(board, pos, piece, seat).is_ok())
        })
    }
}
