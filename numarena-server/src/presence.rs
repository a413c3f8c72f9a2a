//! 在线状态
//!
//! 双方按固定间隔写入心跳时间，超过阈值未更新视为掉线。

use std::time::Duration;

use chrono::Utc;
use protocol::{Role, RoomDocument, RoomStore};
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::config::ArenaConfig;

/// 主动离开时写入的心跳时间，使对方立即判定掉线
pub const DEPARTED_MS: i64 = 0;

/// 当前毫秒时间戳
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// 心跳与掉线判定
#[derive(Debug, Clone, Copy)]
pub struct Presence {
    interval: Duration,
    timeout: Duration,
}

impl Presence {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn from_config(config: &ArenaConfig) -> Self {
        Self::new(config.heartbeat_interval(), config.presence_timeout())
    }

    /// 心跳定时器（首个 tick 立即触发）
    pub fn ticker(&self) -> Interval {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// 某一方是否已掉线
    ///
    /// 从未写过心跳的一方不算掉线。
    pub fn is_stale(&self, doc: &RoomDocument, role: Role, now_ms: i64) -> bool {
        match doc.last_seen_ms.get(role) {
            Some(seen) => now_ms.saturating_sub(seen) > self.timeout.as_millis() as i64,
            None => false,
        }
    }

    /// 写入心跳
    pub async fn beat(store: &dyn RoomStore, room_id: &str, role: Role, now_ms: i64) -> protocol::Result<()> {
        store.touch_presence(room_id, role, now_ms).await
    }

    /// 标记主动离开
    pub async fn depart(store: &dyn RoomStore, room_id: &str, role: Role) -> protocol::Result<()> {
        store.touch_presence(room_id, role, DEPARTED_MS).await
    }
}

impl Default for Presence {
    fn default() -> Self {
        Self::from_config(&ArenaConfig::default())
    }
}
