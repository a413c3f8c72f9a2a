//! 棋盘状态

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{BOARD_SIZE, CELL_COUNT};
use crate::piece::{Piece, PieceValue, Position, Seat};

/// 连线类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    /// 竖线
    Column,
    /// 横线
    Row,
    /// 对角线（含反对角线）
    Diagonal,
}

const fn at(row: u8, col: u8) -> Position {
    Position::new_unchecked(row, col)
}

/// 全部 10 条连线，顺序为：4 列、4 行、主对角线、反对角线
pub const LINES: [(LineKind, [Position; BOARD_SIZE]); 10] = [
    (LineKind::Column, [at(0, 0), at(1, 0), at(2, 0), at(3, 0)]),
    (LineKind::Column, [at(0, 1), at(1, 1), at(2, 1), at(3, 1)]),
    (LineKind::Column, [at(0, 2), at(1, 2), at(2, 2), at(3, 2)]),
    (LineKind::Column, [at(0, 3), at(1, 3), at(2, 3), at(3, 3)]),
    (LineKind::Row, [at(0, 0), at(0, 1), at(0, 2), at(0, 3)]),
    (LineKind::Row, [at(1, 0), at(1, 1), at(1, 2), at(1, 3)]),
    (LineKind::Row, [at(2, 0), at(2, 1), at(2, 2), at(2, 3)]),
    (LineKind::Row, [at(3, 0), at(3, 1), at(3, 2), at(3, 3)]),
    (LineKind::Diagonal, [at(0, 0), at(1, 1), at(2, 2), at(3, 3)]),
    (LineKind::Diagonal, [at(0, 3), at(1, 2), at(2, 1), at(3, 0)]),
];

/// 4x4 棋盘
///
/// 线上格式为 4x4 的嵌套数组，空格为 null。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<Option<Piece>>>", into = "Vec<Vec<Option<Piece>>>")]
pub struct Board {
    /// 索引为 row * 4 + col
    cells: [Option<Piece>; CELL_COUNT],
}

impl Board {
    /// 创建空棋盘
    pub fn empty() -> Self {
        Self {
            cells: [None; CELL_COUNT],
        }
    }

    /// 获取指定位置的棋子
    pub fn get(&self, pos: Position) -> Option<Piece> {
        self.cells.get(pos.to_index()).copied().flatten()
    }

    /// 设置指定位置的棋子
    pub fn set(&mut self, pos: Position, piece: Option<Piece>) {
        if let Some(cell) = self.cells.get_mut(pos.to_index()) {
            *cell = piece;
        }
    }

    /// 放置棋子（测试与 AI 模拟用的便捷方法）
    pub fn with(mut self, row: u8, col: u8, value: PieceValue, owner: Seat) -> Self {
        self.set(Position::new_unchecked(row, col), Some(Piece::new(value, owner)));
        self
    }

    /// 是否已满
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// 已占用格子数
    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// 获取某方的所有棋子
    pub fn pieces(&self, owner: Seat) -> Vec<(Position, Piece)> {
        self.all_pieces()
            .into_iter()
            .filter(|(_, piece)| piece.owner == owner)
            .collect()
    }

    /// 获取所有棋子
    pub fn all_pieces(&self) -> Vec<(Position, Piece)> {
        Position::all()
            .filter_map(|pos| self.get(pos).map(|piece| (pos, piece)))
            .collect()
    }

    /// 整条线是否都属于同一方，是则返回该方
    pub fn line_owner(&self, line: &[Position; BOARD_SIZE]) -> Option<Seat> {
        let first = self.get(line[0])?.owner;
        line[1..]
            .iter()
            .all(|pos| self.get(*pos).map(|p| p.owner) == Some(first))
            .then_some(first)
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Board> for Vec<Vec<Option<Piece>>> {
    fn from(board: Board) -> Self {
        board
            .cells
            .chunks(BOARD_SIZE)
            .map(|row| row.to_vec())
            .collect()
    }
}

impl TryFrom<Vec<Vec<Option<Piece>>>> for Board {
    type Error = String;

    fn try_from(rows: Vec<Vec<Option<Piece>>>) -> Result<Self, Self::Error> {
        if rows.len() != BOARD_SIZE || rows.iter().any(|row| row.len() != BOARD_SIZE) {
            return Err(format!("board must be {0}x{0}", BOARD_SIZE));
        }
        let mut board = Board::empty();
        for (index, cell) in rows.into_iter().flatten().enumerate() {
            board.cells[index] = cell;
        }
        Ok(board)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..BOARD_SIZE as u8 {
            let cells: Vec<String> = (0..BOARD_SIZE as u8)
                .map(|col| match self.get(Position::new_unchecked(row, col)) {
                    Some(piece) => format!("{}{}", piece.value, if piece.owner == Seat::First { 'a' } else { 'b' }),
                    None => "..".to_string(),
                })
                .collect();
            writeln!(f, "{}", cells.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_board() {
        let board = Board::empty();
        assert!(board.is_empty());
        assert!(!board.is_full());
        assert_eq!(board.occupied(), 0);
    }

    #[test]
    fn test_set_and_get() {
        let mut board = Board::empty();
        let pos = Position::new_unchecked(2, 3);
        board.set(pos, Some(Piece::new(PieceValue::Number(4), Seat::Second)));

        assert_eq!(
            board.get(pos),
            Some(Piece::new(PieceValue::Number(4), Seat::Second))
        );
        assert_eq!(board.pieces(Seat::Second).len(), 1);
        assert!(board.pieces(Seat::First).is_empty());
    }

    #[test]
    fn test_lines_cover_board() {
        let columns = LINES.iter().filter(|(k, _)| *k == LineKind::Column).count();
        let rows = LINES.iter().filter(|(k, _)| *k == LineKind::Row).count();
        assert_eq!(columns, 4);
        assert_eq!(rows, 4);
        assert_eq!(LINES[0].0, LineKind::Column);
        assert_eq!(LINES[9].1[0], Position::new_unchecked(0, 3));
    }

    #[test]
    fn test_line_owner() {
        let board = Board::empty()
            .with(0, 0, PieceValue::Number(1), Seat::First)
            .with(1, 1, PieceValue::Token, Seat::First)
            .with(2, 2, PieceValue::Number(3), Seat::First)
            .with(3, 3, PieceValue::Number(2), Seat::First);
        assert_eq!(board.line_owner(&LINES[8].1), Some(Seat::First));
        assert_eq!(board.line_owner(&LINES[0].1), None);
    }

    #[test]
    fn test_board_wire_format() {
        let board = Board::empty().with(0, 1, PieceValue::Number(5), Seat::First);
        let json = serde_json::to_value(board).unwrap();

        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows[0][0].is_null());
        assert_eq!(rows[0][1]["value"], 5);
        assert_eq!(rows[0][1]["playerId"], 0);

        let back: Board = serde_json::from_value(json).unwrap();
        assert_eq!(back, board);
    }

    #[test]
    fn test_board_rejects_wrong_shape() {
        let json = serde_json::json!([[null, null], [null, null]]);
        assert!(serde_json::from_value::<Board>(json).is_err());
    }

    #[test]
    fn test_is_full() {
        let mut board = Board::empty();
        for pos in Position::all() {
            board.set(pos, Some(Piece::new(PieceValue::Token, Seat::First)));
        }
        assert!(board.is_full());
    }
}
