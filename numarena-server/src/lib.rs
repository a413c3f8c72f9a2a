//! NumArena 对战服务
//!
//! 包含:
//! - 运行配置
//! - 回合计时与本地/人机对局
//! - 匹配系统
//! - 在线状态与心跳
//! - 主机/客机联机会话
//! - 等级分与玩家档案

pub mod config;
pub mod game;
pub mod presence;
pub mod rating;
pub mod room;
pub mod session;
pub mod storage;

pub use config::{ArenaConfig, MatchmakingConfig, CONFIG_ENV};
pub use game::{LocalMatch, MatchMode, TurnTimer, AI_SEAT};
pub use presence::{now_ms, Presence};
pub use rating::{MatchOutcome, RatingSystem};
pub use room::{CreateOutcome, JoinOutcome, MatchTicket, Matchmaker};
pub use session::{
    drive_with_ai, GuestSession, HostSession, Lifecycle, Peer, PeerCommand, SessionError,
    SessionResult,
};
pub use storage::ProfileStore;
