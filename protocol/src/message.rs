//! 在线对战的房间文档与落子请求
//!
//! 房间文档由主机写入、双方订阅；落子请求由客机追加到房间的落子流中。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::piece::{PieceValue, Seat};
use crate::state::MatchState;

/// 房间 ID
pub type RoomId = String;

/// AI 难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// 初级：随机合法落子
    Beginner,
    /// 进阶：必胜、拦截、启发式
    Advanced,
    /// 鬼：浅层 alpha-beta 搜索
    Oni,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Advanced => "advanced",
            Difficulty::Oni => "oni",
        };
        f.write_str(name)
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "advanced" => Ok(Difficulty::Advanced),
            "oni" => Ok(Difficulty::Oni),
            other => Err(format!("unknown difficulty: {}", other)),
        }
    }
}

/// 房间中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// 主机（建房者，权威方）
    #[serde(rename = "p0")]
    Host,
    /// 客机
    #[serde(rename = "p1")]
    Guest,
}

impl Role {
    /// 对应的座位
    pub fn seat(&self) -> Seat {
        match self {
            Role::Host => Seat::First,
            Role::Guest => Seat::Second,
        }
    }

    /// 对方角色
    pub fn opponent(&self) -> Role {
        match self {
            Role::Host => Role::Guest,
            Role::Guest => Role::Host,
        }
    }
}

/// 房间状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// 等待对手
    Waiting,
    /// 对局中
    Playing,
    /// 已结束
    Finished,
}

/// 房间内两位玩家的标识
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPlayers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p0: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p1: Option<String>,
}

impl RoomPlayers {
    pub fn get(&self, role: Role) -> Option<&str> {
        match role {
            Role::Host => self.p0.as_deref(),
            Role::Guest => self.p1.as_deref(),
        }
    }
}

/// 双方最后一次心跳时间（毫秒）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSeen {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p0: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p1: Option<i64>,
}

impl LastSeen {
    pub fn get(&self, role: Role) -> Option<i64> {
        match role {
            Role::Host => self.p0,
            Role::Guest => self.p1,
        }
    }

    pub fn set(&mut self, role: Role, at_ms: i64) {
        match role {
            Role::Host => self.p0 = Some(at_ms),
            Role::Guest => self.p1 = Some(at_ms),
        }
    }
}

/// 共享房间文档
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDocument {
    pub status: RoomStatus,
    #[serde(default)]
    pub players: RoomPlayers,
    /// 序列化后的 `MatchState`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default)]
    pub last_seen_ms: LastSeen,
    #[serde(default)]
    pub seed: u32,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_host: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_bucket: Option<i32>,
    /// 客机入座时的等级分
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_guest: Option<i32>,
}

impl RoomDocument {
    /// 创建等待中的房间
    pub fn waiting(host: impl Into<String>, seed: u32, now_ms: i64) -> Self {
        let mut last_seen_ms = LastSeen::default();
        last_seen_ms.set(Role::Host, now_ms);
        Self {
            status: RoomStatus::Waiting,
            players: RoomPlayers {
                p0: Some(host.into()),
                p1: None,
            },
            state: None,
            last_seen_ms,
            seed,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            rating_host: None,
            rating_bucket: None,
            rating_guest: None,
        }
    }

    /// 附带主机等级分（按 100 分四舍五入分桶）
    pub fn with_rating(mut self, rating: i32) -> Self {
        self.rating_host = Some(rating);
        self.rating_bucket = Some((rating as f64 / 100.0).round() as i32);
        self
    }

    /// 是否可以加入（等待中且没有客机）
    pub fn is_joinable(&self) -> bool {
        self.status == RoomStatus::Waiting && self.players.p1.is_none()
    }

    /// 解析对局快照
    pub fn match_state(&self) -> Result<Option<MatchState>> {
        self.state.as_deref().map(MatchState::from_json).transpose()
    }
}

/// 客机发送的落子请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub row: i32,
    pub col: i32,
    pub piece: PieceValue,
    pub player_id: Seat,
    pub created_at: DateTime<Utc>,
}

impl MoveRequest {
    pub fn new(row: i32, col: i32, piece: PieceValue, player_id: Seat) -> Self {
        Self {
            row,
            col,
            piece,
            player_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_document_serialize() {
        let doc = RoomDocument::waiting("host-1", 42, 1_000).with_rating(1234);
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["status"], "waiting");
        assert_eq!(json["players"]["p0"], "host-1");
        assert!(json["players"].get("p1").is_none());
        assert_eq!(json["lastSeenMs"]["p0"], 1_000);
        assert_eq!(json["createdAtMs"], 1_000);
        assert_eq!(json["ratingBucket"], 12);

        let back: RoomDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_joinable() {
        let mut doc = RoomDocument::waiting("host", 1, 0);
        assert!(doc.is_joinable());
        doc.players.p1 = Some("guest".into());
        assert!(!doc.is_joinable());
        doc.players.p1 = None;
        doc.status = RoomStatus::Playing;
        assert!(!doc.is_joinable());
    }

    #[test]
    fn test_match_state_decode() {
        let mut doc = RoomDocument::waiting("host", 1, 0);
        assert!(doc.match_state().unwrap().is_none());

        doc.state = Some(MatchState::default().to_json().unwrap());
        assert_eq!(doc.match_state().unwrap(), Some(MatchState::default()));

        doc.state = Some("{not json".into());
        assert!(doc.match_state().is_err());
    }

    #[test]
    fn test_move_request_serialize() {
        let request = MoveRequest::new(2, 3, PieceValue::Token, Seat::Second);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["piece"], "n");
        assert_eq!(json["playerId"], 1);
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn test_difficulty_parse() {
        assert_eq!("ONI".parse::<Difficulty>(), Ok(Difficulty::Oni));
        assert_eq!(Difficulty::Advanced.to_string(), "advanced");
        assert!("expert".parse::<Difficulty>().is_err());
        assert_eq!(serde_json::to_string(&Role::Guest).unwrap(), "\"p1\"");
    }
}
