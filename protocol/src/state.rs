//! 对局状态快照
//!
//! `MatchState` 是整局游戏的完整快照，可序列化为 JSON 在主机与客机之间同步。

use serde::{Deserialize, Serialize};

use crate::board::{Board, LineKind};
use crate::constants::{DEFAULT_RATING, INITIAL_PIECES};
use crate::error::Result;
use crate::moves::Move;
use crate::piece::{PieceValue, Seat};

/// 玩家
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: Seat,
    pub name: String,
    pub rating: i32,
    /// 手中剩余的数字棋子（无序，值唯一）
    pub pieces: Vec<u8>,
    /// 手中 n 棋子数量
    pub n_pieces: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_connected: Option<bool>,
}

impl Player {
    /// 创建持有全部数字棋子的玩家
    pub fn new(id: Seat, name: impl Into<String>, rating: i32) -> Self {
        Self {
            id,
            name: name.into(),
            rating,
            pieces: INITIAL_PIECES.to_vec(),
            n_pieces: 0,
            is_connected: None,
        }
    }

    /// 使用默认等级分创建玩家
    pub fn named(id: Seat, name: impl Into<String>) -> Self {
        Self::new(id, name, DEFAULT_RATING)
    }

    /// 是否还有可用棋子（数字或 n）
    pub fn has_pieces(&self) -> bool {
        !self.pieces.is_empty() || self.n_pieces > 0
    }

    /// 是否持有该棋子
    pub fn holds(&self, piece: PieceValue) -> bool {
        match piece {
            PieceValue::Number(v) => self.pieces.contains(&v),
            PieceValue::Token => self.n_pieces > 0,
        }
    }

    /// 消耗一枚棋子，未持有时返回 false
    pub fn consume(&mut self, piece: PieceValue) -> bool {
        match piece {
            PieceValue::Number(v) => match self.pieces.iter().position(|p| *p == v) {
                Some(index) => {
                    self.pieces.remove(index);
                    true
                }
                None => false,
            },
            PieceValue::Token => {
                if self.n_pieces > 0 {
                    self.n_pieces -= 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// 数字棋子（降序）
    pub fn numbers_desc(&self) -> Vec<u8> {
        let mut numbers = self.pieces.clone();
        numbers.sort_unstable_by(|a, b| b.cmp(a));
        numbers
    }

    /// 所有可用棋子：数字降序，有 n 时最后附加 n
    pub fn available_pieces(&self) -> Vec<PieceValue> {
        let mut pieces: Vec<PieceValue> = self
            .numbers_desc()
            .into_iter()
            .map(PieceValue::Number)
            .collect();
        if self.n_pieces > 0 {
            pieces.push(PieceValue::Token);
        }
        pieces
    }
}

/// 对局状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// 等待开始
    Waiting,
    /// 对局中
    Playing,
    /// 已结束
    Finished,
}

/// 终局得分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scores {
    pub player1: u32,
    pub player2: u32,
}

impl Scores {
    /// 获取某方得分
    pub fn for_seat(&self, seat: Seat) -> u32 {
        match seat {
            Seat::First => self.player1,
            Seat::Second => self.player2,
        }
    }

    /// 得分领先者，平分返回 None
    pub fn leader(&self) -> Option<Seat> {
        match self.player1.cmp(&self.player2) {
            std::cmp::Ordering::Greater => Some(Seat::First),
            std::cmp::Ordering::Less => Some(Seat::Second),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// 终局原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// 竖线连成
    ColumnWin,
    /// 横线连成
    RowWin,
    /// 对角线连成
    DiagWin,
    /// 棋盘已满，按分数判定
    BoardFull,
    /// 双方棋子耗尽，按分数判定
    Exhausted,
    /// 一方认输或断线
    Forfeit,
}

impl From<LineKind> for EndReason {
    fn from(kind: LineKind) -> Self {
        match kind {
            LineKind::Column => EndReason::ColumnWin,
            LineKind::Row => EndReason::RowWin,
            LineKind::Diagonal => EndReason::DiagWin,
        }
    }
}

/// 完整对局快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    pub board: Board,
    pub players: Vec<Player>,
    pub current_player: Seat,
    pub game_status: GameStatus,
    pub winner: Option<Seat>,
    pub scores: Scores,
    pub move_history: Vec<Move>,
    /// 单调递增的版本号，每次状态变化加一
    #[serde(default)]
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
}

impl MatchState {
    /// 获取玩家
    pub fn player(&self, seat: Seat) -> Option<&Player> {
        self.players.get(seat.index())
    }

    /// 是否在对局中
    pub fn is_playing(&self) -> bool {
        self.game_status == GameStatus::Playing
    }

    /// 是否已结束
    pub fn is_finished(&self) -> bool {
        self.game_status == GameStatus::Finished
    }

    /// 当前玩家是否无子可下（需要让过回合）
    pub fn must_pass(&self) -> bool {
        self.is_playing()
            && self
                .player(self.current_player)
                .map_or(false, |p| !p.has_pieces())
    }

    /// 序列化为 JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 从 JSON 解析
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self {
            board: Board::empty(),
            players: Vec::new(),
            current_player: Seat::First,
            game_status: GameStatus::Waiting,
            winner: None,
            scores: Scores::default(),
            move_history: Vec::new(),
            revision: 0,
            end_reason: None,
        }
    }
}
