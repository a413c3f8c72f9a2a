//! 协议常量定义

use std::time::Duration;

/// 棋盘边长（4x4）
pub const BOARD_SIZE: usize = 4;

/// 棋盘格子总数
pub const CELL_COUNT: usize = BOARD_SIZE * BOARD_SIZE;

/// 数字棋子最小值
pub const MIN_PIECE_VALUE: u8 = 1;

/// 数字棋子最大值
pub const MAX_PIECE_VALUE: u8 = 8;

/// 每位玩家开局持有的数字棋子
pub const INITIAL_PIECES: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

/// 新玩家默认等级分
pub const DEFAULT_RATING: i32 = 1200;

/// 胜利加分
pub const WIN_RATING_GAIN: i32 = 20;

/// 失败扣分
pub const LOSS_RATING_PENALTY: i32 = -15;

/// 对局历史保留条数
pub const MAX_GAME_HISTORY: usize = 20;

/// 等级分历史保留条数
pub const MAX_RATING_HISTORY: usize = 50;

/// 回合倒计时（秒）
pub const TURN_TIMEOUT_SECS: u64 = 30;

/// 心跳间隔（秒）
pub const HEARTBEAT_INTERVAL_SECS: u64 = 4;

/// 在线状态超时（秒）- 超过此时间未收到心跳视为断线
pub const PRESENCE_TIMEOUT_SECS: u64 = 15;

/// AI 落子前的延迟（毫秒）
pub const AI_THINK_DELAY_MS: u64 = 500;

/// 回合倒计时 Duration
pub const TURN_TIMEOUT: Duration = Duration::from_secs(TURN_TIMEOUT_SECS);

/// 心跳间隔 Duration
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(HEARTBEAT_INTERVAL_SECS);

/// 在线状态超时 Duration
pub const PRESENCE_TIMEOUT: Duration = Duration::from_secs(PRESENCE_TIMEOUT_SECS);

/// AI 延迟 Duration
pub const AI_THINK_DELAY: Duration = Duration::from_millis(AI_THINK_DELAY_MS);
