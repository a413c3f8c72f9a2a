//! 房间存储抽象
//!
//! 提供 `RoomStore` trait 使会话层与具体的共享存储解耦：
//! 房间文档支持事务更新与变更订阅，落子请求以追加流的形式投递。
//! `MemoryRoomStore` 为进程内实现，用于本地对战演示与测试。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::error::{ProtocolError, Result};
use crate::message::{MoveRequest, Role, RoomDocument, RoomId, RoomStatus};

/// 事务函数的决定
#[derive(Debug, Clone, PartialEq)]
pub enum TxDecision {
    /// 不做修改
    Keep,
    /// 写入新文档（房间不存在时创建）
    Write(RoomDocument),
    /// 删除房间
    Delete,
    /// 中止事务
    Abort(String),
}

/// 事务提交结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Kept,
    Written,
    Deleted,
}

/// 事务函数：读取当前文档，返回决定
///
/// 远端存储可能在冲突时重试，因此是 `Fn` 而不是 `FnOnce`。
pub type TxFn<'a> = &'a (dyn Fn(Option<&RoomDocument>) -> TxDecision + Send + Sync);

/// 落子请求流
pub type MoveFeed = mpsc::UnboundedReceiver<MoveRequest>;

/// 房间存储 trait
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// 创建房间，返回生成的 ID
    async fn create_room(&self, doc: RoomDocument) -> Result<RoomId>;

    /// 读取房间
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomDocument>>;

    /// 按创建时间升序列出指定状态的房间
    async fn list_rooms(&self, status: RoomStatus, limit: usize) -> Result<Vec<(RoomId, RoomDocument)>>;

    /// 原子地读改写一个房间
    async fn transaction(&self, room_id: &str, tx: TxFn<'_>) -> Result<TxOutcome>;

    /// 写入序列化的对局快照
    async fn write_state(&self, room_id: &str, state: String, now_ms: i64) -> Result<()>;

    /// 更新心跳时间
    async fn touch_presence(&self, room_id: &str, role: Role, now_ms: i64) -> Result<()>;

    /// 删除房间
    async fn delete_room(&self, room_id: &str) -> Result<()>;

    /// 订阅房间文档（房间被删除时为 None）
    fn watch_room(&self, room_id: &str) -> watch::Receiver<Option<RoomDocument>>;

    /// 追加落子请求
    async fn push_move(&self, room_id: &str, request: MoveRequest) -> Result<()>;

    /// 订阅落子请求：先投递已有记录（按创建时间升序），之后投递新记录
    fn watch_moves(&self, room_id: &str) -> MoveFeed;

    /// 清空落子请求
    async fn clear_moves(&self, room_id: &str) -> Result<()>;
}

struct RoomEntry {
    doc: watch::Sender<Option<RoomDocument>>,
    moves: Vec<MoveRequest>,
    move_subscribers: Vec<mpsc::UnboundedSender<MoveRequest>>,
}

impl RoomEntry {
    fn new() -> Self {
        let (doc, _) = watch::channel(None);
        Self {
            doc,
            moves: Vec::new(),
            move_subscribers: Vec::new(),
        }
    }

    fn current(&self) -> Option<RoomDocument> {
        self.doc.borrow().clone()
    }

    fn publish(&self, doc: Option<RoomDocument>) {
        self.doc.send_replace(doc);
    }
}

/// 进程内房间存储
pub struct MemoryRoomStore {
    rooms: Mutex<HashMap<RoomId, RoomEntry>>,
    next_id: AtomicU64,
}

impl MemoryRoomStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RoomId, RoomEntry>> {
        self.rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update<F>(&self, room_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut RoomDocument),
    {
        let rooms = self.lock();
        let entry = rooms
            .get(room_id)
            .ok_or_else(|| ProtocolError::RoomNotFound(room_id.to_string()))?;
        let mut doc = entry
            .current()
            .ok_or_else(|| ProtocolError::RoomNotFound(room_id.to_string()))?;
        f(&mut doc);
        entry.publish(Some(doc));
        Ok(())
    }
}

impl Default for MemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn create_room(&self, doc: RoomDocument) -> Result<RoomId> {
        let room_id = format!("room-{:06}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut rooms = self.lock();
        let entry = rooms.entry(room_id.clone()).or_insert_with(RoomEntry::new);
        entry.publish(Some(doc));
        debug!("房间 {} 已创建", room_id);
        Ok(room_id)
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<RoomDocument>> {
        Ok(self.lock().get(room_id).and_then(RoomEntry::current))
    }

    async fn list_rooms(&self, status: RoomStatus, limit: usize) -> Result<Vec<(RoomId, RoomDocument)>> {
        let rooms = self.lock();
        let mut found: Vec<(RoomId, RoomDocument)> = rooms
            .iter()
            .filter_map(|(id, entry)| entry.current().map(|doc| (id.clone(), doc)))
            .filter(|(_, doc)| doc.status == status)
            .collect();
        found.sort_by(|a, b| a.1.created_at_ms.cmp(&b.1.created_at_ms).then_with(|| a.0.cmp(&b.0)));
        found.truncate(limit);
        Ok(found)
    }

    async fn transaction(&self, room_id: &str, tx: TxFn<'_>) -> Result<TxOutcome> {
        let mut rooms = self.lock();
        let entry = rooms.entry(room_id.to_string()).or_insert_with(RoomEntry::new);
        let current = entry.current();

        match tx(current.as_ref()) {
            TxDecision::Keep => Ok(TxOutcome::Kept),
            TxDecision::Write(doc) => {
                entry.publish(Some(doc));
                trace!("事务写入房间 {}", room_id);
                Ok(TxOutcome::Written)
            }
            TxDecision::Delete => {
                entry.publish(None);
                Ok(TxOutcome::Deleted)
            }
            TxDecision::Abort(reason) => Err(ProtocolError::TransactionAborted(reason)),
        }
    }

    async fn write_state(&self, room_id: &str, state: String, now_ms: i64) -> Result<()> {
        self.update(room_id, |doc| {
            doc.state = Some(state);
            doc.updated_at_ms = now_ms;
        })
    }

    async fn touch_presence(&self, room_id: &str, role: Role, now_ms: i64) -> Result<()> {
        self.update(room_id, |doc| doc.last_seen_ms.set(role, now_ms))
    }

    async fn delete_room(&self, room_id: &str) -> Result<()> {
        let rooms = self.lock();
        if let Some(entry) = rooms.get(room_id) {
            entry.publish(None);
            debug!("房间 {} 已删除", room_id);
        }
        Ok(())
    }

    fn watch_room(&self, room_id: &str) -> watch::Receiver<Option<RoomDocument>> {
        let mut rooms = self.lock();
        rooms
            .entry(room_id.to_string())
            .or_insert_with(RoomEntry::new)
            .doc
            .subscribe()
    }

    async fn push_move(&self, room_id: &str, request: MoveRequest) -> Result<()> {
        let mut rooms = self.lock();
        let entry = rooms
            .get_mut(room_id)
            .filter(|entry| entry.doc.borrow().is_some())
            .ok_or_else(|| ProtocolError::RoomNotFound(room_id.to_string()))?;

        let index = entry
            .moves
            .partition_point(|m| m.created_at <= request.created_at);
        entry.moves.insert(index, request.clone());
        entry
            .move_subscribers
            .retain(|tx| tx.send(request.clone()).is_ok());
        Ok(())
    }

    fn watch_moves(&self, room_id: &str) -> MoveFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut rooms = self.lock();
        let entry = rooms.entry(room_id.to_string()).or_insert_with(RoomEntry::new);
        for request in &entry.moves {
            let _ = tx.send(request.clone());
        }
        entry.move_subscribers.push(tx);
        rx
    }

    async fn clear_moves(&self, room_id: &str) -> Result<()> {
        if let Some(entry) = self.lock().get_mut(room_id) {
            entry.moves.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::{PieceValue, Seat};

    #[tokio::test]
    async fn test_create_and_get_room() {
        let store = MemoryRoomStore::new();
        let id = store
            .create_room(RoomDocument::waiting("alice", 7, 100))
            .await
            .unwrap();

        let doc = store.get_room(&id).await.unwrap().unwrap();
        assert_eq!(doc.players.p0.as_deref(), Some("alice"));
        assert!(store.get_room("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_rooms_oldest_first() {
        let store = MemoryRoomStore::new();
        let late = store.create_room(RoomDocument::waiting("b", 0, 200)).await.unwrap();
        let early = store.create_room(RoomDocument::waiting("a", 0, 100)).await.unwrap();
        let mut playing = RoomDocument::waiting("c", 0, 50);
        playing.status = RoomStatus::Playing;
        store.create_room(playing).await.unwrap();

        let rooms = store.list_rooms(RoomStatus::Waiting, 25).await.unwrap();
        let ids: Vec<_> = rooms.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids, vec![early, late]);

        assert_eq!(store.list_rooms(RoomStatus::Waiting, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transaction_decisions() {
        let store = MemoryRoomStore::new();
        let id = store.create_room(RoomDocument::waiting("a", 0, 0)).await.unwrap();

        let join = |doc: Option<&RoomDocument>| match doc {
            Some(doc) if doc.is_joinable() => {
                let mut next = doc.clone();
                next.players.p1 = Some("b".into());
                next.status = RoomStatus::Playing;
                TxDecision::Write(next)
            }
            _ => TxDecision::Abort("not joinable".into()),
        };
        assert_eq!(store.transaction(&id, &join).await.unwrap(), TxOutcome::Written);
        assert!(matches!(
            store.transaction(&id, &join).await,
            Err(ProtocolError::TransactionAborted(_))
        ));

        let delete = |_: Option<&RoomDocument>| TxDecision::Delete;
        assert_eq!(store.transaction(&id, &delete).await.unwrap(), TxOutcome::Deleted);
        assert!(store.get_room(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_watch_room_sees_updates_and_deletion() {
        let store = MemoryRoomStore::new();
        let id = store.create_room(RoomDocument::waiting("a", 0, 0)).await.unwrap();
        let mut rx = store.watch_room(&id);
        assert!(rx.borrow_and_update().is_some());

        store.write_state(&id, "{}".into(), 10).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow_and_update().as_ref().and_then(|d| d.state.clone()),
            Some("{}".to_string())
        );

        store.delete_room(&id).await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());

        assert!(matches!(
            store.write_state(&id, "{}".into(), 11).await,
            Err(ProtocolError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_move_feed_backlog_then_live() {
        let store = MemoryRoomStore::new();
        let id = store.create_room(RoomDocument::waiting("a", 0, 0)).await.unwrap();

        let first = MoveRequest::new(0, 0, PieceValue::Number(3), Seat::Second);
        store.push_move(&id, first.clone()).await.unwrap();

        let mut feed = store.watch_moves(&id);
        assert_eq!(feed.recv().await, Some(first));

        let second = MoveRequest::new(1, 1, PieceValue::Token, Seat::Second);
        store.push_move(&id, second.clone()).await.unwrap();
        assert_eq!(feed.recv().await, Some(second));

        store.clear_moves(&id).await.unwrap();
        let mut fresh = store.watch_moves(&id);
        assert!(fresh.try_recv().is_err());

        assert!(store
            .push_move("missing", MoveRequest::new(0, 0, PieceValue::Number(1), Seat::Second))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_touch_presence() {
        let store = MemoryRoomStore::new();
        let id = store.create_room(RoomDocument::waiting("a", 0, 0)).await.unwrap();
        store.touch_presence(&id, Role::Guest, 500).await.unwrap();
        let doc = store.get_room(&id).await.unwrap().unwrap();
        assert_eq!(doc.last_seen_ms.get(Role::Guest), Some(500));
        assert_eq!(doc.last_seen_ms.get(Role::Host), Some(0));
    }
}
