//! 错误类型定义

use thiserror::Error;

use crate::piece::PieceValue;

/// 规则错误（落子被拒绝的原因）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    /// 坐标越界
    #[error("Position out of bounds: ({row}, {col})")]
    OutOfBounds { row: i32, col: i32 },

    /// 数字棋子超出 1..=8
    #[error("Invalid piece value: {0}")]
    InvalidPieceValue(u8),

    /// 玩家不存在
    #[error("Player {0} is missing from the roster")]
    MissingPlayer(u8),

    /// 不能覆盖自己的棋子
    #[error("Cannot overwrite your own piece")]
    OwnPiece,

    /// n 棋子不能覆盖任何棋子
    #[error("An n token cannot overwrite a piece")]
    TokenCannotOverwrite,

    /// 攻方不比守方强
    #[error("{attacker} cannot overwrite {defender}")]
    TooWeak {
        attacker: PieceValue,
        defender: PieceValue,
    },

    /// 玩家手中没有该棋子
    #[error("Piece {0} is not available")]
    PieceUnavailable(PieceValue),

    /// 不是该玩家的回合
    #[error("Not your turn")]
    NotYourTurn,

    /// 对局不在进行中
    #[error("Game is not in progress")]
    GameNotPlaying,

    /// 对局不在等待状态
    #[error("Game can only start from the waiting state")]
    NotWaiting,
}

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化错误
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// 房间不存在
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// 事务被中止
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
