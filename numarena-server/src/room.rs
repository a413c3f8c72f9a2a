//! 匹配系统
//!
//! 房间生命周期：建房等待 → 客机加入（原子占位）→ 对局 → 结束。
//! 占位与取消都通过存储事务完成，保证一个房间最多被一名客机占用。

use std::sync::Arc;

use protocol::{
    ProtocolError, Result, Role, RoomDocument, RoomId, RoomStatus, RoomStore, TxDecision,
    TxOutcome,
};
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::MatchmakingConfig;
use crate::presence::now_ms;

const ABORT_NOT_FOUND: &str = "not_found";
const ABORT_FULL: &str = "full";
const ABORT_IN_USE: &str = "in_use";

/// 指定 ID 建房的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(RoomId),
    /// 房间正在对局中
    InUse,
    /// ID 为空
    Invalid,
}

/// 加入房间的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Full,
    NotFound,
}

/// 匹配结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchTicket {
    pub room_id: RoomId,
    pub role: Role,
}

/// 匹配器
pub struct Matchmaker {
    store: Arc<dyn RoomStore>,
    config: MatchmakingConfig,
}

impl Matchmaker {
    pub fn new(store: Arc<dyn RoomStore>, config: MatchmakingConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    /// 建立等待中的房间
    pub async fn create_room(&self, player: &str, rating: i32) -> Result<RoomId> {
        let seed = rand::thread_rng().gen();
        let doc = RoomDocument::waiting(player, seed, now_ms()).with_rating(rating);
        let room_id = self.store.create_room(doc).await?;
        info!("玩家 {} 建立房间 {}", player, room_id);
        Ok(room_id)
    }

    /// 以指定 ID 建房（房间已存在且未在对局中时重置）
    pub async fn create_room_with_id(&self, room_id: &str, player: &str) -> Result<CreateOutcome> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Ok(CreateOutcome::Invalid);
        }

        let seed: u32 = rand::thread_rng().gen();
        let now = now_ms();
        let tx = move |doc: Option<&RoomDocument>| match doc {
            Some(doc) if doc.status == RoomStatus::Playing => TxDecision::Abort(ABORT_IN_USE.into()),
            _ => TxDecision::Write(RoomDocument::waiting(player, seed, now)),
        };

        match self.store.transaction(room_id, &tx).await {
            Ok(_) => {}
            Err(ProtocolError::TransactionAborted(reason)) if reason == ABORT_IN_USE => {
                debug!("房间 {} 正在使用中", room_id);
                return Ok(CreateOutcome::InUse);
            }
            Err(err) => return Err(err),
        }
        self.store.clear_moves(room_id).await?;
        info!("玩家 {} 建立指定房间 {}", player, room_id);
        Ok(CreateOutcome::Created(room_id.to_string()))
    }

    /// 加入房间（原子地占用客机位置并记下客机等级分）
    pub async fn join_room(&self, room_id: &str, player: &str, rating: i32) -> Result<JoinOutcome> {
        let now = now_ms();
        let tx = move |doc: Option<&RoomDocument>| match doc {
            None => TxDecision::Abort(ABORT_NOT_FOUND.into()),
            Some(doc) if !doc.is_joinable() => TxDecision::Abort(ABORT_FULL.into()),
            Some(doc) => {
                let mut next = doc.clone();
                next.players.p1 = Some(player.to_string());
                next.rating_guest = Some(rating);
                next.status = RoomStatus::Playing;
                next.last_seen_ms.set(Role::Guest, now);
                next.updated_at_ms = now;
                TxDecision::Write(next)
            }
        };

        match self.store.transaction(room_id, &tx).await {
            Ok(_) => {
                info!("玩家 {} 加入房间 {}", player, room_id);
                Ok(JoinOutcome::Joined)
            }
            Err(ProtocolError::TransactionAborted(reason)) => Ok(if reason == ABORT_FULL {
                JoinOutcome::Full
            } else {
                JoinOutcome::NotFound
            }),
            Err(err) => Err(err),
        }
    }

    /// 尝试加入一个等待中的房间（最早创建的优先）
    pub async fn try_join_waiting(&self, player: &str, rating: i32) -> Result<Option<RoomId>> {
        let candidates = self
            .store
            .list_rooms(RoomStatus::Waiting, self.config.candidate_limit)
            .await?;

        for (room_id, doc) in candidates {
            if doc.players.p1.is_some() || doc.players.p0.as_deref() == Some(player) {
                continue;
            }
            match self.join_room(&room_id, player, rating).await? {
                JoinOutcome::Joined => return Ok(Some(room_id)),
                outcome => debug!("房间 {} 无法加入: {:?}", room_id, outcome),
            }
        }
        Ok(None)
    }

    /// 自动匹配
    ///
    /// 先尝试加入；失败则建房并在等待期间继续尝试加入别人的房间，
    /// 成功加入时删除自己的房间；最终仍无人可加入时以主机身份等待。
    pub async fn auto_match(&self, player: &str, rating: i32) -> Result<MatchTicket> {
        if let Some(room_id) = self.try_join_waiting(player, rating).await? {
            return Ok(MatchTicket {
                room_id,
                role: Role::Guest,
            });
        }

        let mut own = self.create_room(player, rating).await?;
        for attempt in 1..=self.config.join_retries {
            sleep(self.config.retry_delay()).await;

            if self.is_claimed(&own).await? {
                break;
            }
            if !self.has_candidate(player).await? {
                continue;
            }
            // 先撤回自己的房间，撤回失败说明已被占用
            if !self.cancel_waiting_room(&own, player).await? {
                break;
            }
            if let Some(room_id) = self.try_join_waiting(player, rating).await? {
                debug!("第 {} 次重试加入房间 {}", attempt, room_id);
                return Ok(MatchTicket {
                    room_id,
                    role: Role::Guest,
                });
            }
            own = self.create_room(player, rating).await?;
        }

        Ok(MatchTicket {
            room_id: own,
            role: Role::Host,
        })
    }

    /// 取消等待中的房间，仅当仍在等待、由该玩家创建且无人加入时删除
    pub async fn cancel_waiting_room(&self, room_id: &str, player: &str) -> Result<bool> {
        let tx = move |doc: Option<&RoomDocument>| match doc {
            Some(doc) if doc.is_joinable() && doc.players.p0.as_deref() == Some(player) => {
                TxDecision::Delete
            }
            _ => TxDecision::Keep,
        };
        let deleted = self.store.transaction(room_id, &tx).await? == TxOutcome::Deleted;
        if deleted {
            info!("房间 {} 已取消", room_id);
        }
        Ok(deleted)
    }

    async fn is_claimed(&self, room_id: &str) -> Result<bool> {
        Ok(self
            .store
            .get_room(room_id)
            .await?
            .map_or(false, |doc| doc.players.p1.is_some()))
    }

    async fn has_candidate(&self, player: &str) -> Result<bool> {
        Ok(self
            .store
            .list_rooms(RoomStatus::Waiting, self.config.candidate_limit)
            .await?
            .iter()
            .any(|(_, doc)| doc.players.p1.is_none() && doc.players.p0.as_deref() != Some(player)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::MemoryRoomStore;
    use std::time::Duration;

    fn matchmaker() -> Matchmaker {
        Matchmaker::new(Arc::new(MemoryRoomStore::new()), MatchmakingConfig::default())
    }

    #[tokio::test]
    async fn test_create_and_join() {
        let mm = matchmaker();
        let room_id = mm.create_room("alice", 1260).await.unwrap();
        let doc = mm.store().get_room(&room_id).await.unwrap().unwrap();
        assert_eq!(doc.status, RoomStatus::Waiting);
        assert_eq!(doc.rating_bucket, Some(13));

        assert_eq!(mm.join_room(&room_id, "bob", 1150).await.unwrap(), JoinOutcome::Joined);
        let doc = mm.store().get_room(&room_id).await.unwrap().unwrap();
        assert_eq!(doc.status, RoomStatus::Playing);
        assert_eq!(doc.players.p1.as_deref(), Some("bob"));
        assert_eq!(doc.rating_guest, Some(1150));
        assert!(doc.last_seen_ms.get(Role::Guest).is_some());

        assert_eq!(mm.join_room(&room_id, "carol", 1200).await.unwrap(), JoinOutcome::Full);
        assert_eq!(mm.join_room("room-missing", "carol", 1200).await.unwrap(), JoinOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_create_room_with_id() {
        let mm = matchmaker();
        assert_eq!(mm.create_room_with_id("   ", "alice").await.unwrap(), CreateOutcome::Invalid);

        let outcome = mm.create_room_with_id(" friends ", "alice").await.unwrap();
        assert_eq!(outcome, CreateOutcome::Created("friends".to_string()));

        // 等待中的房间可以被重建
        let outcome = mm.create_room_with_id("friends", "bob").await.unwrap();
        assert_eq!(outcome, CreateOutcome::Created("friends".to_string()));
        let doc = mm.store().get_room("friends").await.unwrap().unwrap();
        assert_eq!(doc.players.p0.as_deref(), Some("bob"));

        mm.join_room("friends", "carol", 1200).await.unwrap();
        assert_eq!(mm.create_room_with_id("friends", "dave").await.unwrap(), CreateOutcome::InUse);
    }

    #[tokio::test]
    async fn test_try_join_skips_own_and_full_rooms() {
        let mm = matchmaker();
        let own = mm.create_room("alice", 1200).await.unwrap();
        assert_eq!(mm.try_join_waiting("alice", 1200).await.unwrap(), None);

        let other = mm.create_room("bob", 1200).await.unwrap();
        assert_eq!(mm.try_join_waiting("alice", 1200).await.unwrap(), Some(other.clone()));
        assert_eq!(mm.try_join_waiting("carol", 1200).await.unwrap(), Some(own));
        assert_eq!(mm.try_join_waiting("dave", 1200).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancel_waiting_room() {
        let mm = matchmaker();
        let room_id = mm.create_room("alice", 1200).await.unwrap();
        assert!(!mm.cancel_waiting_room(&room_id, "bob").await.unwrap());
        assert!(mm.cancel_waiting_room(&room_id, "alice").await.unwrap());
        assert!(mm.store().get_room(&room_id).await.unwrap().is_none());

        let claimed = mm.create_room("alice", 1200).await.unwrap();
        mm.join_room(&claimed, "bob", 1200).await.unwrap();
        assert!(!mm.cancel_waiting_room(&claimed, "alice").await.unwrap());
        assert!(mm.store().get_room(&claimed).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_match_pairs_two_players() {
        let mm = matchmaker();
        let (alice, bob) = tokio::join!(mm.auto_match("alice", 1200), mm.auto_match("bob", 1200));
        let (alice, bob) = (alice.unwrap(), bob.unwrap());

        assert_eq!(alice.role, Role::Host);
        assert_eq!(bob.role, Role::Guest);
        assert_eq!(alice.room_id, bob.room_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_match_late_join_deletes_own_room() {
        let mm = matchmaker();
        let late_room = async {
            sleep(Duration::from_millis(100)).await;
            mm.create_room("bob", 1200).await.unwrap()
        };
        let (ticket, bob_room) = tokio::join!(mm.auto_match("alice", 1200), late_room);
        let ticket = ticket.unwrap();

        assert_eq!(ticket, MatchTicket { room_id: bob_room, role: Role::Guest });
        let waiting = mm.store().list_rooms(RoomStatus::Waiting, 10).await.unwrap();
        assert!(waiting.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_match_hosts_when_alone() {
        let mm = matchmaker();
        let ticket = mm.auto_match("alice", 1200).await.unwrap();
        assert_eq!(ticket.role, Role::Host);
        let doc = mm.store().get_room(&ticket.room_id).await.unwrap().unwrap();
        assert!(doc.is_joinable());
    }
}
