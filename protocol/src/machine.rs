//! 对局状态机
//!
//! 以命令驱动的纯状态转换。无效命令返回同一个快照（`Arc` 指针不变），
//! 上层可据此判断是否需要重新渲染或同步。

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::RuleError;
use crate::moves::{Move, Placement};
use crate::piece::{PieceValue, Seat};
use crate::rules::{self, GameEnd, PlaceResult};
use crate::state::{EndReason, GameStatus, MatchState, Player};

/// 状态机命令
#[derive(Debug, Clone)]
pub enum Action {
    /// 开始对局（仅在等待状态有效）
    Start { player1: Player, player2: Player },
    /// 当前玩家落子
    PlaceMove {
        row: i32,
        col: i32,
        piece: PieceValue,
        timestamp: i64,
    },
    /// 当前玩家让过回合
    Pass,
    /// 一方认输
    Forfeit { loser: Seat },
    /// 回到等待状态
    Reset,
    /// 采用远端快照
    SetState(MatchState),
}

/// 执行一次状态转换
pub fn reduce<R: Rng + ?Sized>(state: &Arc<MatchState>, action: Action, rng: &mut R) -> Arc<MatchState> {
    match transition(state, action, rng) {
        Ok(Some(next)) => Arc::new(next),
        Ok(None) => Arc::clone(state),
        Err(err) => {
            debug!("命令被拒绝: {}", err);
            Arc::clone(state)
        }
    }
}

/// 状态转换，`Ok(None)` 表示状态不变
fn transition<R: Rng + ?Sized>(
    state: &MatchState,
    action: Action,
    rng: &mut R,
) -> Result<Option<MatchState>, RuleError> {
    match action {
        Action::Start { player1, player2 } => {
            if state.game_status != GameStatus::Waiting {
                return Err(RuleError::NotWaiting);
            }
            let mut next = rules::initialize_match(player1, player2, rng);
            next.revision = state.revision + 1;
            Ok(Some(next))
        }
        Action::PlaceMove {
            row,
            col,
            piece,
            timestamp,
        } => apply_placement(state, row, col, piece, timestamp).map(Some),
        Action::Pass => {
            ensure_playing(state)?;
            Ok(Some(MatchState {
                current_player: state.current_player.opponent(),
                revision: state.revision + 1,
                ..state.clone()
            }))
        }
        Action::Forfeit { loser } => {
            ensure_playing(state)?;
            let next = MatchState {
                revision: state.revision + 1,
                ..state.clone()
            };
            Ok(Some(finish(next, Some(loser.opponent()), EndReason::Forfeit)))
        }
        Action::Reset => Ok(Some(MatchState {
            revision: state.revision + 1,
            ..MatchState::default()
        })),
        Action::SetState(remote) => {
            if is_same_snapshot(state, &remote) {
                Ok(None)
            } else {
                Ok(Some(remote))
            }
        }
    }
}

/// 远端快照是否与本地一致
///
/// 带版本号的快照只比较版本号；版本号为 0 的旧快照退回结构比较。
fn is_same_snapshot(local: &MatchState, remote: &MatchState) -> bool {
    if remote.revision != 0 || local.revision != 0 {
        local.revision == remote.revision
    } else {
        local == remote
    }
}

fn ensure_playing(state: &MatchState) -> Result<(), RuleError> {
    if state.game_status == GameStatus::Playing {
        Ok(())
    } else {
        Err(RuleError::GameNotPlaying)
    }
}

fn apply_placement(
    state: &MatchState,
    row: i32,
    col: i32,
    piece: PieceValue,
    timestamp: i64,
) -> Result<MatchState, RuleError> {
    ensure_playing(state)?;
    let seat = state.current_player;
    let pos = rules::check_placement(&state.board, row, col, piece, seat, &state.players)?;

    let PlaceResult { board, n_gains } = rules::place_piece(&state.board, pos, piece, seat);
    let mut players = state.players.clone();
    if let Some(player) = players.get_mut(seat.index()) {
        player.consume(piece);
    }
    for (player, gain) in players.iter_mut().zip(n_gains) {
        player.n_pieces += gain;
    }

    let mut move_history = state.move_history.clone();
    move_history.push(Move::new(Placement::new(pos, piece), seat, timestamp));

    let next = MatchState {
        board,
        players,
        move_history,
        revision: state.revision + 1,
        ..state.clone()
    };

    Ok(match rules::check_game_end(&next.board) {
        GameEnd::Line { kind, winner } => finish(next, Some(winner), kind.into()),
        GameEnd::BoardFull => finish_by_score(next, EndReason::BoardFull),
        GameEnd::Ongoing if !next.players.iter().any(Player::has_pieces) => {
            finish_by_score(next, EndReason::Exhausted)
        }
        GameEnd::Ongoing => {
            let current_player = rules::next_player(seat, &next.players);
            MatchState {
                current_player,
                ..next
            }
        }
    })
}

fn finish(mut state: MatchState, winner: Option<Seat>, reason: EndReason) -> MatchState {
    state.scores = rules::calculate_final_scores(&state.board);
    state.winner = winner;
    state.game_status = GameStatus::Finished;
    state.end_reason = Some(reason);
    state
}

fn finish_by_score(state: MatchState, reason: EndReason) -> MatchState {
    let winner = rules::calculate_final_scores(&state.board).leader();
    finish(state, winner, reason)
}

/// 对局状态机
///
/// 持有当前快照与随机数源，对外提供命令式接口。
pub struct GameMachine {
    state: Arc<MatchState>,
    rng: StdRng,
}

impl GameMachine {
    /// 创建新状态机（等待状态）
    pub fn new() -> Self {
        Self {
            state: Arc::new(MatchState::default()),
            rng: StdRng::from_entropy(),
        }
    }

    /// 使用固定种子创建
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(MatchState::default()),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// 当前快照
    pub fn state(&self) -> &Arc<MatchState> {
        &self.state
    }

    /// 分发命令，返回状态是否改变
    pub fn dispatch(&mut self, action: Action) -> bool {
        let next = reduce(&self.state, action, &mut self.rng);
        let changed = !Arc::ptr_eq(&next, &self.state);
        self.state = next;
        changed
    }

    /// 开始对局
    pub fn start(&mut self, player1: Player, player2: Player) -> bool {
        self.dispatch(Action::Start { player1, player2 })
    }

    /// 当前玩家落子，失败时返回原因
    pub fn try_place_move(&mut self, row: i32, col: i32, piece: PieceValue) -> Result<(), RuleError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let next = apply_placement(&self.state, row, col, piece, timestamp)?;
        self.state = Arc::new(next);
        Ok(())
    }

    /// 当前玩家落子，返回是否成功
    pub fn place_move(&mut self, row: i32, col: i32, piece: PieceValue) -> bool {
        match self.try_place_move(row, col, piece) {
            Ok(()) => true,
            Err(err) => {
                debug!("落子被拒绝: {}", err);
                false
            }
        }
    }

    /// 校验当前玩家的落子
    pub fn is_valid_move(&self, row: i32, col: i32, piece: PieceValue) -> bool {
        self.state.is_playing()
            && rules::validate_move(
                &self.state.board,
                row,
                col,
                piece,
                self.state.current_player,
                &self.state.players,
            )
    }

    /// 检查是否轮到 `seat` 行动
    pub fn check_turn(&self, seat: Seat) -> Result<(), RuleError> {
        ensure_playing(&self.state)?;
        if self.state.current_player == seat {
            Ok(())
        } else {
            Err(RuleError::NotYourTurn)
        }
    }

    /// 让过回合
    pub fn pass_turn(&mut self) -> bool {
        self.dispatch(Action::Pass)
    }

    /// 认输
    pub fn forfeit(&mut self, loser: Seat) -> bool {
        self.dispatch(Action::Forfeit { loser })
    }

    /// 回到等待状态
    pub fn reset(&mut self) {
        self.dispatch(Action::Reset);
    }

    /// 采用远端快照，返回是否改变
    pub fn set_state(&mut self, remote: MatchState) -> bool {
        self.dispatch(Action::SetState(remote))
    }
}

impl Default for GameMachine {
    fn default() -> Self {
        Self::new()
    }
}
