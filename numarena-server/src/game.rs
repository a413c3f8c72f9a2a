//! 对局控制
//!
//! 包含回合计时器与本地/人机对局驱动

use std::time::Duration;

use anyhow::{Context, Result};
use numarena_ai::{AiConfig, AiEngine, Difficulty};
use protocol::{GameMachine, GameStatus, MatchState, PieceValue, Player, Seat};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info};

use crate::config::ArenaConfig;

/// 计时器对应的回合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TurnKey {
    seat: Seat,
    status: GameStatus,
    moves: usize,
    revision: u64,
}

impl TurnKey {
    fn of(state: &MatchState) -> Self {
        Self {
            seat: state.current_player,
            status: state.game_status,
            moves: state.move_history.len(),
            revision: state.revision,
        }
    }
}

/// 回合计时器
///
/// 轮到人类玩家时启动倒计时，超时只触发一次；
/// 当前玩家、对局状态或步数变化时取消并重新计时。
#[derive(Debug)]
pub struct TurnTimer {
    timeout: Duration,
    key: Option<TurnKey>,
    deadline: Option<Instant>,
}

impl TurnTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            key: None,
            deadline: None,
        }
    }

    /// 根据最新快照重新计时，返回是否换了回合
    pub fn sync(&mut self, state: &MatchState, human_seats: &[Seat]) -> bool {
        let key = TurnKey::of(state);
        if self.key == Some(key) {
            return false;
        }
        self.key = Some(key);
        self.deadline = if state.is_playing() && human_seats.contains(&state.current_player) {
            Some(Instant::now() + self.timeout)
        } else {
            None
        };
        true
    }

    /// 截止时间
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 剩余时间（未计时为 None）
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// 已超时则返回超时的一方（只返回一次）
    pub fn poll_expired(&mut self) -> Option<Seat> {
        let deadline = self.deadline?;
        if Instant::now() < deadline {
            return None;
        }
        self.deadline = None;
        self.key.map(|key| key.seat)
    }

    /// 等待超时；没有计时时永不返回
    ///
    /// 只在等待结束后修改状态，可以放在 `tokio::select!` 中使用。
    pub async fn expired(&mut self) -> Seat {
        match (self.deadline, self.key) {
            (Some(deadline), Some(key)) => {
                sleep_until(deadline).await;
                self.deadline = None;
                key.seat
            }
            _ => std::future::pending().await,
        }
    }

    /// 取消计时
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

/// 本地对局模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// 同一设备两名玩家
    Local,
    /// 玩家（先手座位 0）对 AI（座位 1）
    Ai,
}

/// AI 所在座位
pub const AI_SEAT: Seat = Seat::Second;

/// 本地 / 人机对局驱动
pub struct LocalMatch {
    mode: MatchMode,
    machine: GameMachine,
    engine: Option<AiEngine>,
    timer: TurnTimer,
}

impl LocalMatch {
    /// 创建双人对局
    pub fn local(config: &ArenaConfig) -> Self {
        Self {
            mode: MatchMode::Local,
            machine: GameMachine::new(),
            engine: None,
            timer: TurnTimer::new(config.turn_timeout()),
        }
    }

    /// 创建人机对局
    pub fn against_ai(difficulty: Difficulty, config: &ArenaConfig) -> Self {
        let ai_config = AiConfig {
            think_delay_ms: config.ai_think_delay_ms,
            ..AiConfig::from_difficulty(difficulty)
        };
        Self::with_parts(
            MatchMode::Ai,
            GameMachine::new(),
            Some(AiEngine::new(ai_config)),
            config,
        )
    }

    /// 使用指定状态机与引擎创建（便于固定随机种子）
    pub fn with_parts(
        mode: MatchMode,
        machine: GameMachine,
        engine: Option<AiEngine>,
        config: &ArenaConfig,
    ) -> Self {
        Self {
            mode,
            machine,
            engine,
            timer: TurnTimer::new(config.turn_timeout()),
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn state(&self) -> &MatchState {
        self.machine.state()
    }

    pub fn timer(&self) -> &TurnTimer {
        &self.timer
    }

    /// 由人类操作的座位
    pub fn human_seats(&self) -> &'static [Seat] {
        match self.mode {
            MatchMode::Local => &Seat::ALL,
            MatchMode::Ai => &[Seat::First],
        }
    }

    /// 开始对局
    pub fn start(&mut self, player1: Player, player2: Player) -> bool {
        if !self.machine.start(player1, player2) {
            return false;
        }
        let state = self.machine.state();
        info!("本地对局开始 ({:?})，先手 {}", self.mode, state.current_player);
        self.refresh();
        true
    }

    /// 是否轮到 AI
    pub fn is_ai_turn(&self) -> bool {
        let state = self.machine.state();
        self.mode == MatchMode::Ai && state.is_playing() && state.current_player == AI_SEAT
    }

    /// 人类玩家落子
    pub fn place_move(&mut self, row: i32, col: i32, piece: PieceValue) -> bool {
        if self.is_ai_turn() {
            debug!("AI 回合，忽略玩家落子");
            return false;
        }
        let placed = self.machine.place_move(row, col, piece);
        if placed {
            self.refresh();
        }
        placed
    }

    /// 让过回合
    pub fn pass_turn(&mut self) -> bool {
        let passed = self.machine.pass_turn();
        if passed {
            self.refresh();
        }
        passed
    }

    /// 认输
    pub fn forfeit(&mut self, loser: Seat) -> bool {
        let finished = self.machine.forfeit(loser);
        if finished {
            self.refresh();
        }
        finished
    }

    /// 回到等待状态
    pub fn reset(&mut self) {
        self.machine.reset();
        self.refresh();
    }

    /// 等待当前回合超时
    pub async fn turn_timeout(&mut self) -> Seat {
        self.timer.expired().await
    }

    /// 处理超时：仍是该方回合时强制让过
    pub fn on_turn_timeout(&mut self, seat: Seat) -> bool {
        let state = self.machine.state();
        if !state.is_playing() || state.current_player != seat {
            return false;
        }
        info!("{} 回合超时，强制让过", seat);
        self.pass_turn()
    }

    /// 执行一次 AI 回合：延迟后在阻塞线程上搜索，没有可下的棋时让过
    pub async fn play_ai_turn(&mut self) -> Result<bool> {
        if !self.is_ai_turn() {
            return Ok(false);
        }
        let Some(mut engine) = self.engine.take() else {
            return Ok(false);
        };

        sleep(Duration::from_millis(engine.config().think_delay_ms)).await;

        let state = self.machine.state();
        let board = state.board;
        let players = state.players.clone();
        let (engine, choice) = tokio::task::spawn_blocking(move || {
            let choice = engine.choose_move(&board, &players, AI_SEAT);
            (engine, choice)
        })
        .await
        .context("AI 搜索线程异常退出")?;
        self.engine = Some(engine);

        let applied = match choice {
            Some(placement) => {
                debug!("AI 落子 {}", placement);
                self.machine
                    .place_move(placement.row(), placement.col(), placement.piece)
            }
            None => {
                debug!("AI 无棋可下，让过");
                self.machine.pass_turn()
            }
        };
        self.refresh();
        Ok(applied)
    }

    /// 推进对局：处理强制让过并执行 AI 回合，直到轮到人类或对局结束
    pub async fn advance(&mut self) -> Result<()> {
        loop {
            let state = self.machine.state();
            if state.must_pass() {
                let opponent_has_pieces = state
                    .player(state.current_player.opponent())
                    .map_or(false, Player::has_pieces);
                if !opponent_has_pieces {
                    return Ok(());
                }
                debug!("{} 已无棋子，自动让过", state.current_player);
                self.pass_turn();
                continue;
            }
            if !self.is_ai_turn() {
                return Ok(());
            }
            if !self.play_ai_turn().await? {
                return Ok(());
            }
        }
    }

    fn refresh(&mut self) {
        let human_seats = self.human_seats();
        self.timer.sync(self.machine.state(), human_seats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::MoveGenerator;

    fn players() -> (Player, Player) {
        (Player::named(Seat::First, "Alice"), Player::named(Seat::Second, "Bob"))
    }

    fn playing_state(seat: Seat) -> MatchState {
        let (p1, p2) = players();
        MatchState {
            players: vec![p1, p2],
            current_player: seat,
            game_status: GameStatus::Playing,
            revision: 1,
            ..MatchState::default()
        }
    }

    fn fast_config() -> ArenaConfig {
        ArenaConfig {
            ai_think_delay_ms: 10,
            ..ArenaConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once() {
        let mut timer = TurnTimer::new(Duration::from_secs(30));
        let state = playing_state(Seat::First);
        assert!(timer.sync(&state, &Seat::ALL));
        assert_eq!(timer.remaining(), Some(Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(timer.poll_expired(), None);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(timer.poll_expired(), Some(Seat::First));
        assert_eq!(timer.poll_expired(), None);

        // 同一回合不会重新计时
        assert!(!timer.sync(&state, &Seat::ALL));
        assert_eq!(timer.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_rearms_on_turn_change() {
        let mut timer = TurnTimer::new(Duration::from_secs(30));
        timer.sync(&playing_state(Seat::First), &Seat::ALL);
        tokio::time::advance(Duration::from_secs(20)).await;

        let next = MatchState {
            current_player: Seat::Second,
            revision: 2,
            ..playing_state(Seat::First)
        };
        assert!(timer.sync(&next, &Seat::ALL));
        assert_eq!(timer.remaining(), Some(Duration::from_secs(30)));

        let seat = timer.expired().await;
        assert_eq!(seat, Seat::Second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_skips_non_human_and_finished() {
        let mut timer = TurnTimer::new(Duration::from_secs(30));
        timer.sync(&playing_state(Seat::Second), &[Seat::First]);
        assert_eq!(timer.deadline(), None);

        let finished = MatchState {
            game_status: GameStatus::Finished,
            ..playing_state(Seat::First)
        };
        timer.sync(&finished, &Seat::ALL);
        assert_eq!(timer.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_match_timeout_passes() {
        let mut game = LocalMatch::with_parts(
            MatchMode::Local,
            GameMachine::with_seed(3),
            None,
            &ArenaConfig::default(),
        );
        let (p1, p2) = players();
        assert!(game.start(p1, p2));
        let first = game.state().current_player;

        let seat = game.turn_timeout().await;
        assert_eq!(seat, first);
        assert!(game.on_turn_timeout(seat));
        assert_eq!(game.state().current_player, first.opponent());
        // 过期的超时不再生效
        assert!(!game.on_turn_timeout(seat));
    }

    #[tokio::test]
    async fn test_local_mode_has_no_ai() {
        let mut game = LocalMatch::local(&ArenaConfig::default());
        let (p1, p2) = players();
        game.start(p1, p2);
        assert!(!game.is_ai_turn());
        assert!(!game.play_ai_turn().await.unwrap());
        assert_eq!(game.human_seats(), &Seat::ALL);
    }

    #[tokio::test]
    async fn test_ai_match_plays_to_completion() {
        let config = fast_config();
        let engine = AiEngine::with_seed(
            AiConfig {
                think_delay_ms: 0,
                ..AiConfig::from_difficulty(Difficulty::Advanced)
            },
            11,
        );
        let mut game = LocalMatch::with_parts(MatchMode::Ai, GameMachine::with_seed(5), Some(engine), &config);
        let (p1, p2) = players();
        game.start(p1, p2);

        for _ in 0..200 {
            game.advance().await.unwrap();
            let state = game.state();
            if state.is_finished() {
                break;
            }
            assert_eq!(state.current_player, Seat::First);
            let legal = MoveGenerator::legal_placements(&state.board, &state.players, Seat::First);
            match legal.first() {
                Some(p) => assert!(game.place_move(p.row(), p.col(), p.piece)),
                None => assert!(game.pass_turn()),
            }
        }

        let state = game.state();
        assert!(state.is_finished());
        assert!(state.end_reason.is_some());
        assert!(state.move_history.iter().any(|m| m.player_id == AI_SEAT));
    }

    #[tokio::test]
    async fn test_human_cannot_move_for_ai() {
        let engine = AiEngine::with_seed(AiConfig::from_difficulty(Difficulty::Beginner), 1);
        let mut game = LocalMatch::with_parts(MatchMode::Ai, GameMachine::with_seed(0), Some(engine), &fast_config());
        let (p1, p2) = players();
        game.start(p1, p2);
        if game.is_ai_turn() {
            assert!(!game.place_move(0, 0, PieceValue::Number(1)));
            assert!(game.play_ai_turn().await.unwrap());
        }
        assert!(!game.is_ai_turn());
    }
}
