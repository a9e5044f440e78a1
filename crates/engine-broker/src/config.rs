//! TOML 設定
//!
//! どのセクションも省略でき、省略時は組み込みの既定値になる。
//!
//! ```toml
//! [engine]
//! path = "stockfish"
//! options = ["Threads=1", "Hash=16"]
//!
//! [search]
//! multipv = 10
//! safety_margin_ms = 2000
//!
//! [difficulty]
//! best_move_fallback_from = 11
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::difficulty::{DifficultyProfile, RankWindow};
use crate::error::ConfigError;
use crate::session::SessionTiming;

pub const DEFAULT_MULTIPV: usize = 10;

/// エンジンプロセス起動時の設定。
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub path: Option<PathBuf>,
    pub args: Vec<String>,
    /// 追加の `setoption`（`Name=Value` 形式、`=` なしは名前のみ）
    pub options: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    pub multipv: usize,
    pub safety_margin_ms: u64,
    pub stop_grace_ms: u64,
    pub ready_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let timing = SessionTiming::default();
        Self {
            multipv: DEFAULT_MULTIPV,
            safety_margin_ms: timing.safety_margin.as_millis() as u64,
            stop_grace_ms: timing.stop_grace.as_millis() as u64,
            ready_timeout_ms: timing.ready_timeout.as_millis() as u64,
        }
    }
}

impl SearchConfig {
    pub fn timing(&self) -> SessionTiming {
        SessionTiming {
            safety_margin: Duration::from_millis(self.safety_margin_ms),
            stop_grace: Duration::from_millis(self.stop_grace_ms),
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
        }
    }
}

/// `[difficulty]` セクション。省略したキーは既定表を使う。
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DifficultySection {
    budgets_ms: Option<Vec<u64>>,
    rank_windows: Option<Vec<RankWindow>>,
    best_move_fallback_from: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    engine: EngineConfig,
    search: SearchConfig,
    difficulty: DifficultySection,
}

/// broker 全体の設定
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BrokerConfig {
    pub engine: EngineConfig,
    pub search: SearchConfig,
    pub difficulty: DifficultyProfile,
}

impl BrokerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        if raw.search.multipv == 0 {
            return Err(ConfigError::Invalid("search.multipv must be at least 1".into()));
        }
        let defaults = DifficultyProfile::default();
        let section = raw.difficulty;
        let difficulty = DifficultyProfile::new(
            section.budgets_ms.unwrap_or_else(|| defaults.budgets_ms().to_vec()),
            section.rank_windows.unwrap_or_else(|| defaults.rank_windows().to_vec()),
            section.best_move_fallback_from.unwrap_or(defaults.best_move_fallback_from()),
        )?;
        Ok(Self {
            engine: raw.engine,
            search: raw.search,
            difficulty,
        })
    }
}
