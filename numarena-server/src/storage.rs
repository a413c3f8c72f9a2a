//! 玩家档案存储
//!
//! 每位玩家一个 JSON 文件，存放在跨平台的应用数据目录下。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use protocol::{GameRecordEntry, LeaderboardEntry, PlayerProfile};
use rand::Rng;
use tracing::{debug, warn};

use crate::config::ArenaConfig;
use crate::rating::MatchOutcome;

/// 档案存储
pub struct ProfileStore {
    profiles_dir: PathBuf,
}

impl ProfileStore {
    /// 使用系统数据目录创建
    pub fn new() -> Result<Self> {
        Self::with_dir(get_profiles_directory()?)
    }

    /// 使用指定目录创建
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let profiles_dir = dir.into();
        if !profiles_dir.exists() {
            fs::create_dir_all(&profiles_dir)
                .with_context(|| format!("无法创建档案目录: {:?}", profiles_dir))?;
        }
        Ok(Self { profiles_dir })
    }

    /// 按配置创建
    pub fn from_config(config: &ArenaConfig) -> Result<Self> {
        match &config.profile_dir {
            Some(dir) => Self::with_dir(dir.clone()),
            None => Self::new(),
        }
    }

    /// 读取档案，不存在时创建并保存
    pub fn initialize(&self, player_id: &str, display_name: &str) -> Result<PlayerProfile> {
        if let Some(profile) = self.load(player_id)? {
            return Ok(profile);
        }
        let profile = PlayerProfile::new(player_id, display_name, Utc::now());
        self.save(&profile)?;
        debug!("已创建玩家档案 {}", player_id);
        Ok(profile)
    }

    /// 以随机 ID 创建新玩家
    pub fn create_player(&self, display_name: Option<&str>) -> Result<PlayerProfile> {
        let now = Utc::now();
        let mut rng = rand::thread_rng();
        let player_id = format!("player_{}_{}", now.timestamp_millis(), rng.gen_range(0..1000));
        let display_name = match display_name {
            Some(name) => name.to_string(),
            None => format!("Player{}", rng.gen_range(0..1000)),
        };
        let profile = PlayerProfile::new(player_id, display_name, now);
        self.save(&profile)?;
        Ok(profile)
    }

    /// 读取档案
    pub fn load(&self, player_id: &str) -> Result<Option<PlayerProfile>> {
        let path = self.profile_path(player_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("读取档案失败: {:?}", path))?;
        let profile = serde_json::from_str(&content)
            .with_context(|| format!("解析档案失败: {:?}", path))?;
        Ok(Some(profile))
    }

    /// 保存档案
    pub fn save(&self, profile: &PlayerProfile) -> Result<()> {
        let path = self.profile_path(&profile.player_id);
        let content = serde_json::to_string_pretty(profile).context("序列化档案失败")?;
        fs::write(&path, content).with_context(|| format!("写入档案失败: {:?}", path))
    }

    /// 修改显示名
    pub fn update_display_name(&self, player_id: &str, name: &str) -> Result<Option<PlayerProfile>> {
        let Some(mut profile) = self.load(player_id)? else {
            return Ok(None);
        };
        profile.display_name = name.to_string();
        self.save(&profile)?;
        Ok(Some(profile))
    }

    /// 记录一局结果并更新等级分
    pub fn record_result(
        &self,
        player_id: &str,
        game_id: &str,
        opponent: &str,
        outcome: &MatchOutcome,
    ) -> Result<Option<PlayerProfile>> {
        let Some(mut profile) = self.load(player_id)? else {
            warn!("记录结果时找不到玩家档案 {}", player_id);
            return Ok(None);
        };
        profile.record(
            outcome.new_rating,
            GameRecordEntry {
                game_id: game_id.to_string(),
                opponent: opponent.to_string(),
                result: outcome.result,
                my_score: outcome.my_score,
                opponent_score: outcome.opponent_score,
                rating_change: outcome.rating_change,
                played_at: Utc::now(),
            },
        );
        self.save(&profile)?;
        debug!(
            "玩家 {} 结果 {:?}，等级分 {} ({:+})",
            player_id, outcome.result, profile.rating, outcome.rating_change
        );
        Ok(Some(profile))
    }

    /// 排行榜（按等级分降序）
    pub fn leaderboard(&self, top_n: usize) -> Result<Vec<LeaderboardEntry>> {
        let mut profiles = Vec::new();

        let entries = fs::read_dir(&self.profiles_dir)
            .with_context(|| format!("读取档案目录失败: {:?}", self.profiles_dir))?;
        for entry in entries {
            let entry = entry.context("读取目录项失败")?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str::<PlayerProfile>(&content).ok());
            match parsed {
                Some(profile) => profiles.push(profile),
                // 跳过损坏的文件
                None => warn!("跳过无法解析的档案: {:?}", path),
            }
        }

        profiles.sort_by(|a, b| {
            b.rating
                .cmp(&a.rating)
                .then_with(|| b.wins.cmp(&a.wins))
                .then_with(|| a.player_id.cmp(&b.player_id))
        });

        Ok(profiles
            .into_iter()
            .take(top_n)
            .enumerate()
            .map(|(index, profile)| LeaderboardEntry {
                rank: index + 1,
                player_id: profile.player_id,
                display_name: profile.display_name,
                rating: profile.rating,
                wins: profile.wins,
                losses: profile.losses,
            })
            .collect())
    }

    /// 删除档案
    pub fn delete(&self, player_id: &str) -> Result<()> {
        let path = self.profile_path(player_id);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("删除档案失败: {:?}", path))?;
        }
        Ok(())
    }

    /// 获取档案目录路径
    pub fn profiles_directory(&self) -> &Path {
        &self.profiles_dir
    }

    fn profile_path(&self, player_id: &str) -> PathBuf {
        self.profiles_dir.join(format!("{}.json", sanitize_filename(player_id)))
    }
}

/// 获取跨平台档案目录
fn get_profiles_directory() -> Result<PathBuf> {
    let app_data_dir = dirs::data_dir().context("无法获取应用数据目录")?;
    Ok(app_data_dir.join("numarena").join("profiles"))
}

/// 清理文件名中的特殊字符
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '.' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
