//! NumArena AI 引擎
//!
//! 包含:
//! - 棋局评估函数（连线评分、中心度、启发式、排序键）
//! - 三档难度搜索：随机 / 必胜-拦截-启发式 / Alpha-Beta

mod evaluate;
mod search;

pub use evaluate::Evaluator;
pub use search::{AiConfig, AiEngine, Difficulty};
