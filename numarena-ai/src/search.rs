//! 搜索引擎
//!
//! 三档难度：
//! - 初级：在全部合法落子中均匀随机
//! - 进阶：必胜 → 拦截 → 单步启发式
//! - 鬼：必胜 → 拦截 → 浅层 Alpha-Beta（AI 一手后再搜两层）

use std::time::{Duration, Instant};

use protocol::{
    check_cell, check_game_end, place_piece, Board, GameEnd, MoveGenerator, PieceValue, Placement,
    Player, Position, Seat, AI_THINK_DELAY_MS, MAX_PIECE_VALUE, MIN_PIECE_VALUE,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::evaluate::Evaluator;

// 重导出 Difficulty 以便外部使用
pub use protocol::Difficulty;

/// AI 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub difficulty: Difficulty,
    /// AI 落子之后继续搜索的层数（仅鬼难度）
    pub max_depth: u8,
    /// 每层保留的候选数
    pub branch_limit: usize,
    /// 落子前的延迟（由驱动方执行）
    pub think_delay_ms: u64,
    pub time_limit_ms: u64,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: Difficulty) -> Self {
        match difficulty {
            Difficulty::Beginner => Self {
                difficulty,
                max_depth: 0,
                branch_limit: 10,
                think_delay_ms: AI_THINK_DELAY_MS,
                time_limit_ms: 1000,
            },
            Difficulty::Advanced => Self {
                difficulty,
                max_depth: 0,
                branch_limit: 10,
                think_delay_ms: AI_THINK_DELAY_MS,
                time_limit_ms: 1000,
            },
            Difficulty::Oni => Self {
                difficulty,
                max_depth: 2,
                branch_limit: 10,
                think_delay_ms: AI_THINK_DELAY_MS,
                time_limit_ms: 3000,
            },
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self::from_difficulty(Difficulty::Advanced)
    }
}

/// 模拟用的手牌：数字棋子位图 + n 棋子数量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Hand {
    numbers: u16,
    tokens: u32,
}

impl Hand {
    fn from_player(player: Option<&Player>) -> Self {
        let Some(player) = player else {
            return Self::default();
        };
        let numbers = player
            .pieces
            .iter()
            .filter(|v| (MIN_PIECE_VALUE..=MAX_PIECE_VALUE).contains(*v))
            .fold(0u16, |bits, v| bits | (1u16 << *v));
        Self {
            numbers,
            tokens: player.n_pieces,
        }
    }

    fn has(&self, value: u8) -> bool {
        self.numbers & (1 << value) != 0
    }

    /// 数字降序，有 n 时最后附加 n
    fn pieces_desc(&self) -> Vec<PieceValue> {
        let mut pieces: Vec<PieceValue> = (MIN_PIECE_VALUE..=MAX_PIECE_VALUE)
            .rev()
            .filter(|v| self.has(*v))
            .map(PieceValue::Number)
            .collect();
        if self.tokens > 0 {
            pieces.push(PieceValue::Token);
        }
        pieces
    }

    fn numbers_asc(&self) -> impl Iterator<Item = u8> + '_ {
        (MIN_PIECE_VALUE..=MAX_PIECE_VALUE).filter(|v| self.has(*v))
    }

    fn spend(&mut self, piece: PieceValue) {
        match piece {
            PieceValue::Number(v) => self.numbers &= !(1 << v),
            PieceValue::Token => self.tokens = self.tokens.saturating_sub(1),
        }
    }
}

/// 搜索节点
#[derive(Debug, Clone, Copy)]
struct Node {
    board: Board,
    hands: [Hand; 2],
}

impl Node {
    fn play(&self, placement: Placement, mover: Seat) -> Node {
        let result = place_piece(&self.board, placement.pos, placement.piece, mover);
        let mut hands = self.hands;
        hands[mover.index()].spend(placement.piece);
        for (hand, gain) in hands.iter_mut().zip(result.n_gains) {
            hand.tokens += gain;
        }
        Node {
            board: result.board,
            hands,
        }
    }
}

/// AI 引擎
pub struct AiEngine {
    config: AiConfig,
    rng: ChaCha8Rng,
    nodes_searched: u64,
}

impl AiEngine {
    /// 创建新的 AI 引擎
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::from_entropy(),
            nodes_searched: 0,
        }
    }

    /// 使用固定种子创建（测试与回放）
    pub fn with_seed(config: AiConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            nodes_searched: 0,
        }
    }

    /// 从难度创建
    pub fn from_difficulty(difficulty: Difficulty) -> Self {
        Self::new(AiConfig::from_difficulty(difficulty))
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// 上一次搜索访问的节点数
    pub fn nodes_searched(&self) -> u64 {
        self.nodes_searched
    }

    /// 为 `seat` 选择一步落子，无合法落子时返回 None
    pub fn choose_move(&mut self, board: &Board, players: &[Player], seat: Seat) -> Option<Placement> {
        self.nodes_searched = 0;

        let candidates = MoveGenerator::legal_placements(board, players, seat);
        if candidates.is_empty() {
            debug!("{} 没有合法落子", seat);
            return None;
        }

        let node = Node {
            board: *board,
            hands: [
                Hand::from_player(players.get(Seat::First.index())),
                Hand::from_player(players.get(Seat::Second.index())),
            ],
        };

        let difficulty = self.config.difficulty;
        let chosen = match difficulty {
            Difficulty::Beginner => candidates.choose(&mut self.rng).copied(),
            Difficulty::Advanced => Self::immediate_win(board, &candidates, seat)
                .or_else(|| Self::block(&node, seat))
                .or_else(|| Self::heuristic_best(board, &candidates, seat)),
            Difficulty::Oni => Self::immediate_win(board, &candidates, seat)
                .or_else(|| Self::block(&node, seat))
                .or_else(|| self.alpha_beta_root(&node, &candidates, seat)),
        };

        if let Some(placement) = chosen {
            debug!(
                "AI ({}) 选择 {}，候选 {} 个，搜索节点 {}",
                difficulty,
                placement,
                candidates.len(),
                self.nodes_searched
            );
        }
        chosen
    }

    /// 能直接连成一线的落子
    fn immediate_win(board: &Board, candidates: &[Placement], seat: Seat) -> Option<Placement> {
        candidates.iter().copied().find(|mv| {
            let after = place_piece(board, mv.pos, mv.piece, seat).board;
            matches!(check_game_end(&after), GameEnd::Line { winner, .. } if winner == seat)
        })
    }

    /// 拦截对手下一手的连线
    ///
    /// 找到对手能连成一线的格子后，用能合法占据该格的最小数字棋子抢占，
    /// 否则退而使用 n 棋子。
    fn block(node: &Node, seat: Seat) -> Option<Placement> {
        let opponent = seat.opponent();
        let their_pieces = node.hands[opponent.index()].pieces_desc();
        let mine = node.hands[seat.index()];

        for pos in Position::all() {
            for &piece in &their_pieces {
                if check_cell(&node.board, pos, piece, opponent).is_err() {
                    continue;
                }
                let after = place_piece(&node.board, pos, piece, opponent).board;
                let threatens = matches!(
                    check_game_end(&after),
                    GameEnd::Line { winner, .. } if winner == opponent
                );
                if !threatens {
                    continue;
                }
                if let Some(claim) = Self::claim_cell(&node.board, &mine, pos, seat) {
                    return Some(claim);
                }
            }
        }
        None
    }

    fn claim_cell(board: &Board, hand: &Hand, pos: Position, seat: Seat) -> Option<Placement> {
        let numeric = hand
            .numbers_asc()
            .map(PieceValue::Number)
            .find(|piece| check_cell(board, pos, *piece, seat).is_ok());
        let token = (hand.tokens > 0 && check_cell(board, pos, PieceValue::Token, seat).is_ok())
            .then_some(PieceValue::Token);
        numeric.or(token).map(|piece| Placement::new(pos, piece))
    }

    /// 启发式评分最高的落子（同分取先出现者）
    fn heuristic_best(board: &Board, candidates: &[Placement], seat: Seat) -> Option<Placement> {
        let mut best: Option<(Placement, f64)> = None;
        for &mv in candidates {
            let score = Evaluator::heuristic_score(board, mv, seat);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((mv, score));
            }
        }
        best.map(|(mv, _)| mv)
    }

    /// 按排序键降序（稳定）排列并截断
    fn order_moves(&self, board: &Board, moves: Vec<Placement>, mover: Seat) -> Vec<Placement> {
        let mut keyed: Vec<(f64, Placement)> = moves
            .into_iter()
            .map(|mv| (Evaluator::order_key(board, mv, mover), mv))
            .collect();
        keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
        keyed.truncate(self.config.branch_limit);
        keyed.into_iter().map(|(_, mv)| mv).collect()
    }

    fn alpha_beta_root(&mut self, node: &Node, candidates: &[Placement], seat: Seat) -> Option<Placement> {
        let deadline = Instant::now() + Duration::from_millis(self.config.time_limit_ms);
        let ordered = self.order_moves(&node.board, candidates.to_vec(), seat);

        let mut best: Option<(Placement, f64)> = None;
        for mv in ordered {
            let child = node.play(mv, seat);
            let score = self.alpha_beta(
                &child,
                self.config.max_depth,
                f64::NEG_INFINITY,
                f64::INFINITY,
                false,
                seat,
                &deadline,
            );
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((mv, score));
            }
        }
        best.map(|(mv, _)| mv)
    }

    /// Alpha-Beta 搜索，分值始终站在 `ai` 一方
    #[allow(clippy::too_many_arguments)]
    fn alpha_beta(
        &mut self,
        node: &Node,
        depth: u8,
        mut alpha: f64,
        mut beta: f64,
        maximizing: bool,
        ai: Seat,
        deadline: &Instant,
    ) -> f64 {
        self.nodes_searched += 1;

        // 到达深度、超时或已有一方连线时返回静态评估
        if depth == 0
            || Instant::now() >= *deadline
            || matches!(check_game_end(&node.board), GameEnd::Line { .. })
        {
            return Evaluator::line_score(&node.board, ai);
        }

        let mover = if maximizing { ai } else { ai.opponent() };
        let pieces = node.hands[mover.index()].pieces_desc();
        let moves = MoveGenerator::placements_with(&node.board, mover, &pieces);
        let moves = self.order_moves(&node.board, moves, mover);
        if moves.is_empty() {
            return Evaluator::line_score(&node.board, ai);
        }

        if maximizing {
            let mut value = f64::NEG_INFINITY;
            for mv in moves {
                let child = node.play(mv, mover);
                value = value.max(self.alpha_beta(&child, depth - 1, alpha, beta, false, ai, deadline));
                alpha = alpha.max(value);
                if alpha >= beta {
                    break; // Beta 剪枝
                }
            }
            value
        } else {
            let mut value = f64::INFINITY;
            for mv in moves {
                let child = node.play(mv, mover);
                value = value.min(self.alpha_beta(&child, depth - 1, alpha, beta, true, ai, deadline));
                beta = beta.min(value);
                if alpha >= beta {
                    break; // Alpha 剪枝
                }
            }
            value
        }
    }
}
