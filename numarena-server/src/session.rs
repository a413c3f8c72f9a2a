//! 联机会话
//!
//! 主机（座位 0）持有唯一可写的对局状态，接收客机的落子请求并推送完整快照；
//! 客机（座位 1）只发送落子请求，收到快照后整体替换本地状态。

use std::sync::Arc;
use std::time::Duration;

use numarena_ai::AiEngine;
use protocol::{
    check_placement, GameMachine, GameStatus, MatchState, MoveRequest, PieceValue, Player,
    ProtocolError, Role, RoomDocument, RoomId, RoomStatus, RoomStore, RuleError, Seat,
    TxDecision, DEFAULT_RATING,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::config::ArenaConfig;
use crate::game::TurnTimer;
use crate::presence::{now_ms, Presence};
use crate::rating::{MatchOutcome, RatingSystem};

const HOST: Seat = Seat::First;
const GUEST: Seat = Seat::Second;

/// 会话错误
#[derive(Error, Debug)]
pub enum SessionError {
    /// 上一个落子请求尚未得到主机确认
    #[error("A move request is already pending")]
    AlreadyPending,

    #[error("Move rejected: {0}")]
    Rejected(#[from] RuleError),

    #[error("AI worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// 应用生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Inactive,
    Background,
    Terminated,
}

impl Lifecycle {
    fn is_leaving(self) -> bool {
        !matches!(self, Lifecycle::Active)
    }
}

/// 本地操作
#[derive(Debug, Clone, PartialEq)]
pub enum PeerCommand {
    Place {
        row: i32,
        col: i32,
        piece: PieceValue,
    },
    Pass,
    Lifecycle(Lifecycle),
}

/// 主机会话
pub struct HostSession {
    room_id: RoomId,
    store: Arc<dyn RoomStore>,
    machine: GameMachine,
    presence: Presence,
    rating: RatingSystem,
    turn_timeout: Duration,
    /// 由真人操作、需要回合计时的座位
    human_seats: Vec<Seat>,
    /// 最近一次写出的快照版本
    last_sent_revision: Option<u64>,
    /// 正在采用远端快照，期间不向外推送
    applying_remote: bool,
    forfeited: bool,
}

impl HostSession {
    pub fn new(room_id: impl Into<RoomId>, store: Arc<dyn RoomStore>, seed: u64, config: &ArenaConfig) -> Self {
        Self {
            room_id: room_id.into(),
            store,
            machine: GameMachine::with_seed(seed),
            presence: Presence::from_config(config),
            rating: RatingSystem::new(),
            turn_timeout: config.turn_timeout(),
            human_seats: Seat::ALL.to_vec(),
            last_sent_revision: None,
            applying_remote: false,
            forfeited: false,
        }
    }

    /// 指定由真人操作的座位，AI 座位不计时
    pub fn with_human_seats(mut self, seats: &[Seat]) -> Self {
        self.human_seats = seats.to_vec();
        self
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn state(&self) -> &Arc<MatchState> {
        self.machine.state()
    }

    /// 按当前快照为真人座位计时
    pub fn arm_timer(&self, timer: &mut TurnTimer) -> bool {
        timer.sync(self.machine.state(), &self.human_seats)
    }

    /// 开始对局并推送初始快照
    pub async fn start(&mut self, host: Player, guest: Player) -> SessionResult<bool> {
        if !self.machine.start(host, guest) {
            return Ok(false);
        }
        info!(
            "房间 {} 对局开始，先手 {}",
            self.room_id,
            self.machine.state().current_player
        );
        self.settle();
        self.publish().await?;
        Ok(true)
    }

    /// 主机本地落子
    pub async fn place_move(&mut self, row: i32, col: i32, piece: PieceValue) -> SessionResult<()> {
        self.machine.check_turn(HOST)?;
        self.machine.try_place_move(row, col, piece)?;
        self.settle();
        self.publish().await?;
        Ok(())
    }

    /// 主机让过回合
    pub async fn pass_turn(&mut self) -> SessionResult<bool> {
        self.machine.check_turn(HOST)?;
        self.machine.pass_turn();
        self.settle();
        self.publish().await
    }

    /// 处理客机的落子请求
    ///
    /// 只接受客机座位在客机回合发出的请求，并按当前状态重新校验。
    pub async fn apply_move_request(&mut self, request: &MoveRequest) -> SessionResult<bool> {
        let state = self.machine.state();
        if request.player_id != GUEST || !state.is_playing() || state.current_player != GUEST {
            debug!("忽略过期或越权的落子请求: {:?}", request);
            return Ok(false);
        }
        if !self.machine.place_move(request.row, request.col, request.piece) {
            return Ok(false);
        }
        self.settle();
        self.publish().await?;
        Ok(true)
    }

    /// 回合超时：仍是该方回合时强制让过
    pub async fn on_turn_timeout(&mut self, seat: Seat) -> SessionResult<bool> {
        let state = self.machine.state();
        if !state.is_playing() || state.current_player != seat {
            return Ok(false);
        }
        info!("房间 {} {} 回合超时", self.room_id, seat);
        self.machine.pass_turn();
        self.settle();
        self.publish().await
    }

    /// 房间文档变化
    ///
    /// 只采用版本比本地新的快照；客机入座且尚未开局时开始对局。
    pub async fn on_room_update(&mut self, doc: Option<&RoomDocument>) -> SessionResult<bool> {
        let Some(doc) = doc else {
            return Ok(false);
        };

        let mut changed = false;
        match doc.match_state() {
            Ok(Some(remote)) if remote.revision > self.machine.state().revision => {
                let revision = remote.revision;
                self.applying_remote = true;
                changed = self.machine.set_state(remote);
                self.last_sent_revision = Some(revision);
                self.applying_remote = false;
            }
            Ok(_) => {}
            Err(err) => warn!("房间 {} 快照无法解析: {}", self.room_id, err),
        }

        if self.machine.state().game_status == GameStatus::Waiting && doc.status == RoomStatus::Playing {
            if let (Some(host), Some(guest)) = (&doc.players.p0, &doc.players.p1) {
                let host = Player::new(HOST, host.clone(), doc.rating_host.unwrap_or(DEFAULT_RATING));
                let guest = Player::new(GUEST, guest.clone(), doc.rating_guest.unwrap_or(DEFAULT_RATING));
                changed |= self.start(host, guest).await?;
            }
        }

        changed |= self.check_presence(doc, now_ms()).await?;
        Ok(changed)
    }

    /// 客机掉线时判客机负
    pub async fn check_presence(&mut self, doc: &RoomDocument, now_ms: i64) -> SessionResult<bool> {
        if !self.machine.state().is_playing() || !self.presence.is_stale(doc, Role::Guest, now_ms) {
            return Ok(false);
        }
        info!("房间 {} 客机掉线，判负", self.room_id);
        self.machine.forfeit(GUEST);
        self.publish().await?;
        Ok(true)
    }

    pub async fn heartbeat(&self, now_ms: i64) -> SessionResult<()> {
        Ok(Presence::beat(self.store.as_ref(), &self.room_id, Role::Host, now_ms).await?)
    }

    /// 切到后台或退出时认输（对局中只触发一次）
    pub async fn on_lifecycle(&mut self, lifecycle: Lifecycle) -> SessionResult<bool> {
        if !lifecycle.is_leaving() || self.forfeited || !self.machine.state().is_playing() {
            return Ok(false);
        }
        if !self.machine.forfeit(HOST) {
            return Ok(false);
        }
        self.forfeited = true;
        info!("房间 {} 主机离开 ({:?})，认输", self.room_id, lifecycle);
        self.publish().await?;
        Ok(true)
    }

    /// 推送当前快照，与上次推送的版本相同时跳过
    pub async fn publish(&mut self) -> SessionResult<bool> {
        if self.applying_remote {
            return Ok(false);
        }
        let state = Arc::clone(self.machine.state());
        if self.last_sent_revision == Some(state.revision) {
            trace!("房间 {} 快照 r{} 已推送", self.room_id, state.revision);
            return Ok(false);
        }

        self.store
            .write_state(&self.room_id, state.to_json()?, now_ms())
            .await?;
        self.last_sent_revision = Some(state.revision);
        debug!("房间 {} 推送快照 r{}", self.room_id, state.revision);

        if state.is_finished() {
            let tx = |doc: Option<&RoomDocument>| match doc {
                Some(doc) if doc.status != RoomStatus::Finished => {
                    let mut next = doc.clone();
                    next.status = RoomStatus::Finished;
                    TxDecision::Write(next)
                }
                _ => TxDecision::Keep,
            };
            self.store.transaction(&self.room_id, &tx).await?;
            info!("房间 {} 对局结束，胜者 {:?}", self.room_id, state.winner);
        }
        Ok(true)
    }

    /// 主机一方的结算
    pub fn outcome(&self, rating: i32) -> Option<MatchOutcome> {
        self.rating.outcome(self.machine.state(), HOST, rating)
    }

    /// 当前玩家无子而对方有子时自动让过
    fn settle(&mut self) {
        let state = self.machine.state();
        if !state.must_pass() {
            return;
        }
        let opponent_has_pieces = state
            .player(state.current_player.opponent())
            .map_or(false, Player::has_pieces);
        if opponent_has_pieces {
            debug!("{} 已无棋子，自动让过", state.current_player);
            self.machine.pass_turn();
        }
    }

    async fn handle_command(&mut self, command: PeerCommand) -> SessionResult<()> {
        let result = match command {
            PeerCommand::Place { row, col, piece } => self.place_move(row, col, piece).await,
            PeerCommand::Pass => self.pass_turn().await.map(|_| ()),
            PeerCommand::Lifecycle(lifecycle) => self.on_lifecycle(lifecycle).await.map(|_| ()),
        };
        match result {
            Err(SessionError::Protocol(err)) => Err(err.into()),
            Err(err) => {
                debug!("主机操作被拒绝: {}", err);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// 主机事件循环，对局结束或房间删除时返回最终状态
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<PeerCommand>,
        view: watch::Sender<Arc<MatchState>>,
    ) -> SessionResult<Arc<MatchState>> {
        let store = Arc::clone(&self.store);
        let mut room = store.watch_room(&self.room_id);
        let mut moves = store.watch_moves(&self.room_id);
        let mut ticker = self.presence.ticker();
        let mut timer = TurnTimer::new(self.turn_timeout);

        let doc = room.borrow_and_update().clone();
        self.on_room_update(doc.as_ref()).await?;

        loop {
            self.arm_timer(&mut timer);
            show(&view, self.machine.state());
            if self.machine.state().is_finished() {
                break;
            }

            tokio::select! {
                changed = room.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let doc = room.borrow_and_update().clone();
                    if doc.is_none() {
                        info!("房间 {} 已删除", self.room_id);
                        break;
                    }
                    self.on_room_update(doc.as_ref()).await?;
                }
                Some(request) = moves.recv() => {
                    self.apply_move_request(&request).await?;
                }
                _ = ticker.tick() => {
                    let now = now_ms();
                    self.heartbeat(now).await?;
                    let doc = room.borrow().clone();
                    if let Some(doc) = doc {
                        self.check_presence(&doc, now).await?;
                    }
                }
                seat = timer.expired() => {
                    self.on_turn_timeout(seat).await?;
                }
                Some(command) = commands.recv() => {
                    self.handle_command(command).await?;
                }
            }
        }

        Ok(Arc::clone(self.machine.state()))
    }
}

/// 客机会话
pub struct GuestSession {
    room_id: RoomId,
    store: Arc<dyn RoomStore>,
    machine: GameMachine,
    presence: Presence,
    rating: RatingSystem,
    /// 已发送、尚未收到新快照的落子请求
    pending: bool,
    forfeited: bool,
}

impl GuestSession {
    pub fn new(room_id: impl Into<RoomId>, store: Arc<dyn RoomStore>, config: &ArenaConfig) -> Self {
        Self {
            room_id: room_id.into(),
            store,
            machine: GameMachine::new(),
            presence: Presence::from_config(config),
            rating: RatingSystem::new(),
            pending: false,
            forfeited: false,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn state(&self) -> &Arc<MatchState> {
        self.machine.state()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// 向主机发送落子请求（本地不落子）
    pub async fn request_move(&mut self, row: i32, col: i32, piece: PieceValue) -> SessionResult<()> {
        if self.pending {
            return Err(SessionError::AlreadyPending);
        }
        self.machine.check_turn(GUEST)?;
        let state = self.machine.state();
        check_placement(&state.board, row, col, piece, GUEST, &state.players)?;

        self.store
            .push_move(&self.room_id, MoveRequest::new(row, col, piece, GUEST))
            .await?;
        self.pending = true;
        debug!("房间 {} 发送落子请求 ({}, {}) {}", self.room_id, row, col, piece);
        Ok(())
    }

    /// 房间文档变化：整体采用主机快照
    pub fn on_room_update(&mut self, doc: Option<&RoomDocument>) -> bool {
        let Some(doc) = doc else {
            return false;
        };
        match doc.match_state() {
            Ok(Some(remote)) => {
                self.pending = false;
                self.machine.set_state(remote)
            }
            Ok(None) => false,
            Err(err) => {
                warn!("房间 {} 快照无法解析: {}", self.room_id, err);
                false
            }
        }
    }

    /// 主机掉线时本地判主机负
    pub fn check_presence(&mut self, doc: &RoomDocument, now_ms: i64) -> bool {
        if !self.machine.state().is_playing() || !self.presence.is_stale(doc, Role::Host, now_ms) {
            return false;
        }
        info!("房间 {} 主机掉线", self.room_id);
        self.machine.forfeit(HOST)
    }

    pub async fn heartbeat(&self, now_ms: i64) -> SessionResult<()> {
        Ok(Presence::beat(self.store.as_ref(), &self.room_id, Role::Guest, now_ms).await?)
    }

    /// 切到后台或退出时认输（对局中只触发一次）
    ///
    /// 客机不能写对局状态，写入离开标记后由主机判负；写入失败时可以重试。
    pub async fn on_lifecycle(&mut self, lifecycle: Lifecycle) -> SessionResult<bool> {
        if !lifecycle.is_leaving() || self.forfeited || !self.machine.state().is_playing() {
            return Ok(false);
        }
        Presence::depart(self.store.as_ref(), &self.room_id, Role::Guest).await?;
        self.forfeited = true;
        info!("房间 {} 客机离开 ({:?})，认输", self.room_id, lifecycle);
        self.machine.forfeit(GUEST);
        Ok(true)
    }

    /// 客机一方的结算
    pub fn outcome(&self, rating: i32) -> Option<MatchOutcome> {
        self.rating.outcome(self.machine.state(), GUEST, rating)
    }

    async fn handle_command(&mut self, command: PeerCommand) -> SessionResult<()> {
        let result = match command {
            PeerCommand::Place { row, col, piece } => self.request_move(row, col, piece).await,
            PeerCommand::Pass => {
                debug!("客机不能主动让过，由主机处理");
                Ok(())
            }
            PeerCommand::Lifecycle(lifecycle) => self.on_lifecycle(lifecycle).await.map(|_| ()),
        };
        match result {
            Err(SessionError::Protocol(err)) => Err(err.into()),
            Err(err) => {
                debug!("落子请求未发送: {}", err);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// 客机事件循环，对局结束或房间删除时返回最终状态
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<PeerCommand>,
        view: watch::Sender<Arc<MatchState>>,
    ) -> SessionResult<Arc<MatchState>> {
        let store = Arc::clone(&self.store);
        let mut room = store.watch_room(&self.room_id);
        let mut ticker = self.presence.ticker();

        let doc = room.borrow_and_update().clone();
        self.on_room_update(doc.as_ref());

        loop {
            show(&view, self.machine.state());
            if self.machine.state().is_finished() {
                break;
            }

            tokio::select! {
                changed = room.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let doc = room.borrow_and_update().clone();
                    let Some(doc) = doc else {
                        info!("房间 {} 已删除", self.room_id);
                        break;
                    };
                    self.on_room_update(Some(&doc));
                    self.check_presence(&doc, now_ms());
                }
                _ = ticker.tick() => {
                    self.heartbeat(now_ms()).await?;
                }
                Some(command) = commands.recv() => {
                    self.handle_command(command).await?;
                }
            }
        }

        Ok(Arc::clone(self.machine.state()))
    }
}

/// 联机一方：主机（权威）或客机（转发）
pub enum Peer {
    Authoritative(HostSession),
    Relay(GuestSession),
}

impl Peer {
    /// 按匹配得到的角色创建
    pub fn for_role(
        role: Role,
        room_id: impl Into<RoomId>,
        store: Arc<dyn RoomStore>,
        seed: u64,
        config: &ArenaConfig,
    ) -> Self {
        match role {
            Role::Host => Peer::Authoritative(HostSession::new(room_id, store, seed, config)),
            Role::Guest => Peer::Relay(GuestSession::new(room_id, store, config)),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Peer::Authoritative(_) => Role::Host,
            Peer::Relay(_) => Role::Guest,
        }
    }

    pub fn seat(&self) -> Seat {
        self.role().seat()
    }

    /// 主机按真人座位计时；客机不计时
    pub fn with_human_seats(self, seats: &[Seat]) -> Self {
        match self {
            Peer::Authoritative(host) => Peer::Authoritative(host.with_human_seats(seats)),
            relay => relay,
        }
    }

    pub fn state(&self) -> &Arc<MatchState> {
        match self {
            Peer::Authoritative(host) => host.state(),
            Peer::Relay(guest) => guest.state(),
        }
    }

    pub async fn heartbeat(&self, now_ms: i64) -> SessionResult<()> {
        match self {
            Peer::Authoritative(host) => host.heartbeat(now_ms).await,
            Peer::Relay(guest) => guest.heartbeat(now_ms).await,
        }
    }

    pub async fn on_lifecycle(&mut self, lifecycle: Lifecycle) -> SessionResult<bool> {
        match self {
            Peer::Authoritative(host) => host.on_lifecycle(lifecycle).await,
            Peer::Relay(guest) => guest.on_lifecycle(lifecycle).await,
        }
    }

    pub fn outcome(&self, rating: i32) -> Option<MatchOutcome> {
        match self {
            Peer::Authoritative(host) => host.outcome(rating),
            Peer::Relay(guest) => guest.outcome(rating),
        }
    }

    pub async fn run(
        self,
        commands: mpsc::Receiver<PeerCommand>,
        view: watch::Sender<Arc<MatchState>>,
    ) -> SessionResult<Arc<MatchState>> {
        match self {
            Peer::Authoritative(host) => host.run(commands, view).await,
            Peer::Relay(guest) => guest.run(commands, view).await,
        }
    }
}

/// 快照变化时才通知观察者
fn show(view: &watch::Sender<Arc<MatchState>>, state: &Arc<MatchState>) {
    view.send_if_modified(|current| {
        if Arc::ptr_eq(current, state) {
            false
        } else {
            *current = Arc::clone(state);
            true
        }
    });
}

/// 由 AI 代替玩家操作一方，直到对局结束或会话退出
pub async fn drive_with_ai(
    seat: Seat,
    mut engine: AiEngine,
    mut view: watch::Receiver<Arc<MatchState>>,
    commands: mpsc::Sender<PeerCommand>,
) -> SessionResult<()> {
    loop {
        let state = Arc::clone(&view.borrow_and_update());
        if state.is_finished() {
            return Ok(());
        }

        if state.is_playing() && state.current_player == seat && !state.must_pass() {
            sleep(Duration::from_millis(engine.config().think_delay_ms)).await;
            let board = state.board;
            let players = state.players.clone();
            let (returned, choice) = tokio::task::spawn_blocking(move || {
                let choice = engine.choose_move(&board, &players, seat);
                (engine, choice)
            })
            .await?;
            engine = returned;

            let command = match choice {
                Some(placement) => PeerCommand::Place {
                    row: placement.row(),
                    col: placement.col(),
                    piece: placement.piece,
                },
                None => PeerCommand::Pass,
            };
            if commands.send(command).await.is_err() {
                return Ok(());
            }
        }

        if view.changed().await.is_err() {
            return Ok(());
        }
    }
}
