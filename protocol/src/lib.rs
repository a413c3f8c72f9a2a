//! NumArena 共享协议库
//!
//! 包含:
//! - 棋子、棋盘、位置等核心数据结构
//! - 规则引擎（落子校验、覆盖结算、终局判定、计分）
//! - 对局状态机 (GameMachine)
//! - 房间文档与落子请求 (RoomDocument, MoveRequest)
//! - 房间存储抽象 (RoomStore trait) 与进程内实现
//! - 玩家档案与战绩记录

mod board;
mod constants;
mod error;
mod machine;
mod message;
mod moves;
mod piece;
mod record;
mod rules;
mod state;
mod transport;

pub use board::{Board, LineKind, LINES};
pub use constants::*;
pub use error::{ProtocolError, Result, RuleError};
pub use machine::{reduce, Action, GameMachine};
pub use message::{
    Difficulty, LastSeen, MoveRequest, Role, RoomDocument, RoomId, RoomPlayers, RoomStatus,
};
pub use moves::{Move, MoveGenerator, Placement};
pub use piece::{Piece, PieceValue, Position, Seat};
pub use record::{
    GameRecordEntry, LeaderboardEntry, MatchResult, PlayerProfile, RatingHistoryEntry,
};
pub use rules::{
    calculate_final_scores, check_cell, check_game_end, check_placement, initialize_match,
    next_player, place_piece, validate_move, GameEnd, PlaceResult,
};
pub use state::{EndReason, GameStatus, MatchState, Player, Scores};
pub use transport::{MemoryRoomStore, MoveFeed, RoomStore, TxDecision, TxFn, TxOutcome};
