//! 難易度レベル（1..=16）から思考時間と候補順位の窓を引く表
//!
//! 表はただのデータで、`DifficultyProfile` は構築時に検証したあと不変。
//! 既定値は組み込みの定数表で、設定ファイルから差し替えられる。

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = 16;
pub const LEVEL_COUNT: usize = MAX_LEVEL as usize;

/// レベル 1..16 の思考時間 (ms)
const DEFAULT_BUDGETS_MS: [u64; LEVEL_COUNT] =
    [100, 150, 200, 300, 400, 500, 650, 800, 1000, 1200, 1400, 1600, 1800, 2000, 2250, 2500];

/// レベル 1..16 の候補順位の窓 [min, max]（1 始まり、両端含む）
const DEFAULT_RANK_WINDOWS: [[usize; 2]; LEVEL_COUNT] = [
    [5, 10],
    [5, 9],
    [4, 9],
    [4, 8],
    [3, 8],
    [3, 7],
    [3, 6],
    [2, 6],
    [2, 5],
    [2, 4],
    [2, 3],
    [1, 3],
    [1, 2],
    [1, 2],
    [1, 1],
    [1, 1],
];

/// このレベル以上は、窓に届かないとき 1 位を選ぶ。未満は全候補から一様抽選。
const DEFAULT_BEST_MOVE_FALLBACK_FROM: u8 = 11;

/// 1..=16 に丸めた難易度
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(u8);

impl Level {
    pub fn new(raw: i64) -> Self {
        Level(raw.clamp(i64::from(MIN_LEVEL), i64::from(MAX_LEVEL)) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    fn index(self) -> usize {
        usize::from(self.0 - MIN_LEVEL)
    }

    /// 全レベルを弱い順に列挙する。
    pub fn all() -> impl Iterator<Item = Level> {
        (MIN_LEVEL..=MAX_LEVEL).map(Level)
    }
}

/// 候補順位の窓（1 始まり、両端含む）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "[usize; 2]")]
pub struct RankWindow {
    pub min_rank: usize,
    pub max_rank: usize,
}

impl From<[usize; 2]> for RankWindow {
    fn from([min_rank, max_rank]: [usize; 2]) -> Self {
        Self { min_rank, max_rank }
    }
}

/// レベルごとの思考時間と順位窓
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DifficultyProfile {
    budgets_ms: Vec<u64>,
    rank_windows: Vec<RankWindow>,
    best_move_fallback_from: u8,
}

impl Default for DifficultyProfile {
    fn default() -> Self {
        Self {
            budgets_ms: DEFAULT_BUDGETS_MS.to_vec(),
            rank_windows: DEFAULT_RANK_WINDOWS.iter().copied().map(RankWindow::from).collect(),
            best_move_fallback_from: DEFAULT_BEST_MOVE_FALLBACK_FROM,
        }
    }
}

impl DifficultyProfile {
    /// 表を検証して構築する。
    ///
    /// - 思考時間: ちょうど 16 個、正の値で非減少
    /// - 順位窓: ちょうど 16 個、`1 <= min_rank <= max_rank`
    /// - `best_move_fallback_from`: 1..=17（17 は「常に一様抽選」）
    pub fn new(
        budgets_ms: Vec<u64>,
        rank_windows: Vec<RankWindow>,
        best_move_fallback_from: u8,
    ) -> Result<Self, ConfigError> {
        if budgets_ms.len() != LEVEL_COUNT {
            return Err(ConfigError::Invalid(format!(
                "budgets_ms needs {LEVEL_COUNT} entries, got {}",
                budgets_ms.len()
            )));
        }
        if budgets_ms.contains(&0) {
            return Err(ConfigError::Invalid("budgets_ms must be positive".into()));
        }
        if let Some(i) = budgets_ms.windows(2).position(|w| w[0] > w[1]) {
            return Err(ConfigError::Invalid(format!(
                "budgets_ms must be non-decreasing (level {} > level {})",
                i + 1,
                i + 2
            )));
        }
        if rank_windows.len() != LEVEL_COUNT {
            return Err(ConfigError::Invalid(format!(
                "rank_windows needs {LEVEL_COUNT} entries, got {}",
                rank_windows.len()
            )));
        }
        if let Some(i) = rank_windows.iter().position(|w| w.min_rank == 0 || w.min_rank > w.max_rank)
        {
            let w = rank_windows[i];
            return Err(ConfigError::Invalid(format!(
                "rank window for level {} is [{}, {}]; expected 1 <= min <= max",
                i + 1,
                w.min_rank,
                w.max_rank
            )));
        }
        if !(MIN_LEVEL..=MAX_LEVEL + 1).contains(&best_move_fallback_from) {
            return Err(ConfigError::Invalid(format!(
                "best_move_fallback_from must be within 1..={}",
                MAX_LEVEL + 1
            )));
        }
        Ok(Self {
            budgets_ms,
            rank_windows,
            best_move_fallback_from,
        })
    }

    /// レベルに対応する思考時間。
    pub fn time_budget(&self, level: Level) -> Duration {
        Duration::from_millis(self.budgets_ms[level.index()])
    }

    /// レベルに対応する候補順位の窓。
    pub fn rank_window(&self, level: Level) -> RankWindow {
        self.rank_windows[level.index()]
    }

    pub fn budgets_ms(&self) -> &[u64] {
        &self.budgets_ms
    }

    pub fn rank_windows(&self) -> &[RankWindow] {
        &self.rank_windows
    }

    pub fn best_move_fallback_from(&self) -> u8 {
        self.best_move_fallback_from
    }

    /// 窓に届かないとき 1 位を選ぶレベルか。
    pub fn prefers_best_on_shortfall(&self, level: Level) -> bool {
        level.get() >= self.best_move_fallback_from
    }
}
