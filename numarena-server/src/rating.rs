//! 等级分结算

use protocol::{MatchResult, MatchState, Seat, LOSS_RATING_PENALTY, WIN_RATING_GAIN};

/// 一局结束后某一方的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub result: MatchResult,
    /// 实际等级分变化（扣分时受 0 分下限约束）
    pub rating_change: i32,
    pub new_rating: i32,
    pub my_score: u32,
    pub opponent_score: u32,
}

/// 固定增减的等级分系统
#[derive(Debug, Clone, Copy)]
pub struct RatingSystem {
    win_gain: i32,
    loss_penalty: i32,
}

impl RatingSystem {
    pub fn new() -> Self {
        Self {
            win_gain: WIN_RATING_GAIN,
            loss_penalty: LOSS_RATING_PENALTY,
        }
    }

    /// 结算新等级分，返回 (新等级分, 实际变化)
    pub fn apply(&self, rating: i32, result: MatchResult) -> (i32, i32) {
        let delta = match result {
            MatchResult::Win => self.win_gain,
            MatchResult::Loss => self.loss_penalty,
            MatchResult::Draw => 0,
        };
        let new_rating = (rating + delta).max(0);
        (new_rating, new_rating - rating)
    }

    /// 某方视角的对局结果，对局未结束时返回 None
    pub fn result_for(state: &MatchState, seat: Seat) -> Option<MatchResult> {
        if !state.is_finished() {
            return None;
        }
        Some(match state.winner {
            Some(winner) if winner == seat => MatchResult::Win,
            Some(_) => MatchResult::Loss,
            None => MatchResult::Draw,
        })
    }

    /// 结算某方的完整结果
    pub fn outcome(&self, state: &MatchState, seat: Seat, rating: i32) -> Option<MatchOutcome> {
        let result = Self::result_for(state, seat)?;
        let (new_rating, rating_change) = self.apply(rating, result);
        Some(MatchOutcome {
            result,
            rating_change,
            new_rating,
            my_score: state.scores.for_seat(seat),
            opponent_score: state.scores.for_seat(seat.opponent()),
        })
    }
}

impl Default for RatingSystem {
    fn default() -> Self {
        Self::new()
    }
}
