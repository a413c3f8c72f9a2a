//! 棋子定义

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{BOARD_SIZE, MAX_PIECE_VALUE, MIN_PIECE_VALUE};

/// 棋子值：数字 1..=8 或特殊的 n 棋子
///
/// 线上格式为 `int | "n"`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceValue {
    /// 数字棋子
    Number(u8),
    /// n 棋子（被覆盖时获得，得分为 0）
    Token,
}

impl PieceValue {
    /// 创建数字棋子，超出范围返回 None
    pub fn number(value: u8) -> Option<Self> {
        (MIN_PIECE_VALUE..=MAX_PIECE_VALUE)
            .contains(&value)
            .then_some(PieceValue::Number(value))
    }

    /// 得分（n 棋子为 0）
    pub fn worth(&self) -> u8 {
        match self {
            PieceValue::Number(v) => *v,
            PieceValue::Token => 0,
        }
    }

    /// 是否为 n 棋子
    pub fn is_token(&self) -> bool {
        matches!(self, PieceValue::Token)
    }

    /// 攻方能否覆盖守方
    ///
    /// n 不能覆盖任何棋子；任何数字都能覆盖 n；数字之间必须严格更大。
    pub fn beats(&self, defender: PieceValue) -> bool {
        match (self, defender) {
            (PieceValue::Token, _) => false,
            (PieceValue::Number(_), PieceValue::Token) => true,
            (PieceValue::Number(a), PieceValue::Number(b)) => *a > b,
        }
    }
}

impl fmt::Display for PieceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PieceValue::Number(v) => write!(f, "{}", v),
            PieceValue::Token => write!(f, "n"),
        }
    }
}

impl Serialize for PieceValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PieceValue::Number(v) => serializer.serialize_u8(*v),
            PieceValue::Token => serializer.serialize_str("n"),
        }
    }
}

struct PieceValueVisitor;

impl<'de> Visitor<'de> for PieceValueVisitor {
    type Value = PieceValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an integer between 1 and 8 or the string \"n\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<PieceValue, E> {
        u8::try_from(v)
            .ok()
            .and_then(PieceValue::number)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<PieceValue, E> {
        u8::try_from(v)
            .ok()
            .and_then(PieceValue::number)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<PieceValue, E> {
        if v.fract() == 0.0 && v >= 0.0 {
            self.visit_u64(v as u64)
        } else {
            Err(E::invalid_value(de::Unexpected::Float(v), &self))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<PieceValue, E> {
        match v {
            "n" => Ok(PieceValue::Token),
            _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for PieceValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PieceValueVisitor)
    }
}

/// 座位（玩家编号）
///
/// 线上格式为 0 / 1。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Seat {
    /// 0 号玩家
    First,
    /// 1 号玩家
    Second,
}

impl Seat {
    /// 两个座位
    pub const ALL: [Seat; 2] = [Seat::First, Seat::Second];

    /// 获取对手座位
    pub fn opponent(&self) -> Seat {
        match self {
            Seat::First => Seat::Second,
            Seat::Second => Seat::First,
        }
    }

    /// 数组下标
    pub fn index(&self) -> usize {
        match self {
            Seat::First => 0,
            Seat::Second => 1,
        }
    }

    /// 从下标转换
    pub fn from_index(index: usize) -> Option<Seat> {
        match index {
            0 => Some(Seat::First),
            1 => Some(Seat::Second),
            _ => None,
        }
    }
}

impl From<Seat> for u8 {
    fn from(seat: Seat) -> u8 {
        seat.index() as u8
    }
}

impl TryFrom<u8> for Seat {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Seat::from_index(value as usize).ok_or_else(|| format!("invalid player id: {}", value))
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.index())
    }
}

/// 棋盘上的棋子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub value: PieceValue,
    #[serde(rename = "playerId")]
    pub owner: Seat,
}

impl Piece {
    /// 创建新棋子
    pub fn new(value: PieceValue, owner: Seat) -> Self {
        Self { value, owner }
    }
}

/// 棋盘位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// 行 (0-3)
    pub row: u8,
    /// 列 (0-3)
    pub col: u8,
}

impl Position {
    /// 创建新位置，越界返回 None
    pub fn new(row: i32, col: i32) -> Option<Self> {
        let size = BOARD_SIZE as i32;
        if (0..size).contains(&row) && (0..size).contains(&col) {
            Some(Self {
                row: row as u8,
                col: col as u8,
            })
        } else {
            None
        }
    }

    /// 创建新位置（不检查边界，内部使用）
    pub const fn new_unchecked(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    /// 转换为数组索引
    pub fn to_index(&self) -> usize {
        self.row as usize * BOARD_SIZE + self.col as usize
    }

    /// 从数组索引转换
    pub fn from_index(index: usize) -> Option<Self> {
        if index < BOARD_SIZE * BOARD_SIZE {
            Some(Self {
                row: (index / BOARD_SIZE) as u8,
                col: (index % BOARD_SIZE) as u8,
            })
        } else {
            None
        }
    }

    /// 按行优先顺序遍历所有格子
    pub fn all() -> impl Iterator<Item = Position> {
        (0..BOARD_SIZE * BOARD_SIZE).filter_map(Position::from_index)
    }

    /// 到棋盘中心 (1.5, 1.5) 的曼哈顿距离
    pub fn center_distance(&self) -> f64 {
        (self.row as f64 - 1.5).abs() + (self.col as f64 - 1.5).abs()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}
