//! 运行配置
//!
//! 所有字段都有默认值，配置文件只需写需要覆盖的部分。

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::{AI_THINK_DELAY_MS, HEARTBEAT_INTERVAL_SECS, PRESENCE_TIMEOUT_SECS, TURN_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 指定配置文件路径的环境变量
pub const CONFIG_ENV: &str = "NUMARENA_CONFIG";

/// 匹配配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// 每次最多尝试加入的等待房间数
    pub candidate_limit: usize,
    /// 建房后继续尝试加入的次数
    pub join_retries: u32,
    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,
}

impl MatchmakingConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 25,
            join_retries: 6,
            retry_delay_ms: 300,
        }
    }
}

/// 全局配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub turn_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub presence_timeout_secs: u64,
    pub ai_think_delay_ms: u64,
    pub matchmaking: MatchmakingConfig,
    /// 玩家档案目录，未设置时使用系统数据目录
    pub profile_dir: Option<PathBuf>,
}

impl ArenaConfig {
    /// 从 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {:?}", path))?;
        info!("已加载配置: {:?}", path);
        Ok(config)
    }

    /// 从 `NUMARENA_CONFIG` 指定的文件加载，未设置时使用默认配置
    pub fn from_env() -> Result<Self> {
        Self::load_optional(std::env::var_os(CONFIG_ENV))
    }

    fn load_optional(path: Option<OsString>) -> Result<Self> {
        match path {
            Some(path) if !path.is_empty() => Self::load(PathBuf::from(path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn presence_timeout(&self) -> Duration {
        Duration::from_secs(self.presence_timeout_secs)
    }

    pub fn ai_think_delay(&self) -> Duration {
        Duration::from_millis(self.ai_think_delay_ms)
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: TURN_TIMEOUT_SECS,
            heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
            presence_timeout_secs: PRESENCE_TIMEOUT_SECS,
            ai_think_delay_ms: AI_THINK_DELAY_MS,
            matchmaking: MatchmakingConfig::default(),
            profile_dir: None,
        }
    }
}
