//! 玩家档案与战绩记录
//!
//! 本地持久化的玩家数据：等级分、胜负统计、最近对局与等级分历史。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_RATING, MAX_GAME_HISTORY, MAX_RATING_HISTORY};

/// 单局结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    Win,
    Loss,
    Draw,
}

/// 一局对战记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecordEntry {
    pub game_id: String,
    pub opponent: String,
    pub result: MatchResult,
    pub my_score: u32,
    pub opponent_score: u32,
    pub rating_change: i32,
    pub played_at: DateTime<Utc>,
}

/// 等级分历史
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingHistoryEntry {
    pub rating: i32,
    pub timestamp: DateTime<Utc>,
    pub change: i32,
}

/// 玩家档案
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub player_id: String,
    pub display_name: String,
    pub rating: i32,
    pub wins: u32,
    pub losses: u32,
    pub total_games: u32,
    /// 最近对局，最新在前
    pub game_history: Vec<GameRecordEntry>,
    pub created_at: DateTime<Utc>,
    pub last_played: DateTime<Utc>,
    #[serde(default)]
    pub win_streak: u32,
    /// 等级分历史，最新在后
    pub rating_history: Vec<RatingHistoryEntry>,
}

impl PlayerProfile {
    /// 创建新档案
    pub fn new(player_id: impl Into<String>, display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            player_id: player_id.into(),
            display_name: display_name.into(),
            rating: DEFAULT_RATING,
            wins: 0,
            losses: 0,
            total_games: 0,
            game_history: Vec::new(),
            created_at: now,
            last_played: now,
            win_streak: 0,
            rating_history: vec![RatingHistoryEntry {
                rating: DEFAULT_RATING,
                timestamp: now,
                change: 0,
            }],
        }
    }

    /// 记录一局结果
    ///
    /// `new_rating` 为结算后的等级分，`entry.rating_change` 为本局变化。
    pub fn record(&mut self, new_rating: i32, entry: GameRecordEntry) {
        let now = entry.played_at;
        self.rating = new_rating;
        self.total_games += 1;
        self.last_played = now;

        match entry.result {
            MatchResult::Win => {
                self.wins += 1;
                self.win_streak += 1;
            }
            MatchResult::Loss => {
                self.losses += 1;
                self.win_streak = 0;
            }
            MatchResult::Draw => {}
        }

        self.rating_history.push(RatingHistoryEntry {
            rating: new_rating,
            timestamp: now,
            change: entry.rating_change,
        });
        if self.rating_history.len() > MAX_RATING_HISTORY {
            let excess = self.rating_history.len() - MAX_RATING_HISTORY;
            self.rating_history.drain(..excess);
        }

        self.game_history.insert(0, entry);
        self.game_history.truncate(MAX_GAME_HISTORY);
    }

    /// 平局数
    pub fn draws(&self) -> u32 {
        self.total_games.saturating_sub(self.wins + self.losses)
    }
}

/// 排行榜条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub player_id: String,
    pub display_name: String,
    pub rating: i32,
    pub wins: u32,
    pub losses: u32,
}
