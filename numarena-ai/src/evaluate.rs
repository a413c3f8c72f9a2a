//! 棋局评估函数

use protocol::{Board, PieceValue, Placement, Position, Seat, LINES};

/// 评估器
pub struct Evaluator;

/// 对方连线的惩罚系数
const OPPONENT_LINE_WEIGHT: f64 = 1.1;

/// 中心加成系数
const CENTER_WEIGHT: f64 = 0.2;

/// 覆盖对方棋子时排序键的额外加成
const OVERWRITE_ORDER_BONUS: f64 = 3.0;

impl Evaluator {
    /// 静态评估（站在 `seat` 一方）
    ///
    /// 只被一方占据的线按 10^棋子数 计分，对方的线按 1.1 倍扣分，
    /// 混合线不计；再加上每个已占格子的中心加成。
    pub fn line_score(board: &Board, seat: Seat) -> f64 {
        let mut score = 0.0;

        for (_, line) in LINES.iter() {
            let (mut mine, mut theirs) = (0i32, 0i32);
            for pos in line {
                match board.get(*pos) {
                    Some(piece) if piece.owner == seat => mine += 1,
                    Some(_) => theirs += 1,
                    None => {}
                }
            }
            if mine > 0 && theirs > 0 {
                continue;
            }
            if mine > 0 {
                score += 10f64.powi(mine);
            }
            if theirs > 0 {
                score -= 10f64.powi(theirs) * OPPONENT_LINE_WEIGHT;
            }
        }

        for (pos, piece) in board.all_pieces() {
            let weight = CENTER_WEIGHT * Self::centrality(pos);
            if piece.owner == seat {
                score += weight;
            } else {
                score -= weight;
            }
        }

        score
    }

    /// 中心度：2 - 到中心的曼哈顿距离（角落为 -1，中心四格为 1）
    pub fn centrality(pos: Position) -> f64 {
        2.0 - pos.center_distance()
    }

    /// 进阶难度的单步启发式评分
    ///
    /// 覆盖对方棋子得 2 倍面值（覆盖 n 得 1）；落在空格按中心距离计分；
    /// 再按所用棋子的面值略加分。
    pub fn heuristic_score(board: &Board, placement: Placement, seat: Seat) -> f64 {
        let base = match board.get(placement.pos) {
            Some(target) if target.owner != seat => match target.value {
                PieceValue::Number(v) => v as f64 * 2.0,
                PieceValue::Token => 1.0,
            },
            _ => 3.0 - placement.pos.center_distance(),
        };
        base + Self::piece_bonus(placement.piece)
    }

    /// 搜索排序键（站在落子方 `mover` 一方）
    pub fn order_key(board: &Board, placement: Placement, mover: Seat) -> f64 {
        let overwrite = match board.get(placement.pos) {
            Some(target) if target.owner != mover => match target.value {
                PieceValue::Number(v) => v as f64 + OVERWRITE_ORDER_BONUS,
                PieceValue::Token => 1.0 + OVERWRITE_ORDER_BONUS,
            },
            _ => 0.0,
        };
        overwrite + Self::centrality(placement.pos)
    }

    fn piece_bonus(piece: PieceValue) -> f64 {
        match piece {
            PieceValue::Number(v) => v as f64 / 10.0,
            PieceValue::Token => 0.1,
        }
    }
}
