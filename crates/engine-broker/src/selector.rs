//! 順位付き候補とレベルから 1 手を選ぶ。
//!
//! 乱数源は呼び出し側から渡す。テストでは seed 固定の PRNG で index を検証する。

use rand::Rng;

use crate::difficulty::{DifficultyProfile, Level};
use crate::types::SearchResult;

/// `n` 個の候補（良い順）から選ぶ index（0 始まり）を返す。戻り値は常に `0..n`。
///
/// - `n == 1`: レベルに関係なく唯一の候補
/// - 窓の下端が候補数を超える: 弱いレベルは全候補から一様抽選、
///   強いレベルは 1 位
/// - それ以外: 窓の上端を `n - 1` に切り詰め、その範囲から一様抽選
pub fn select_index<R: Rng>(
    n: usize,
    level: Level,
    profile: &DifficultyProfile,
    rng: &mut R,
) -> usize {
    if n <= 1 {
        return 0;
    }
    let last = n - 1;
    let window = profile.rank_window(level);
    let desired_start = window.min_rank.saturating_sub(1);
    let desired_end = window.max_rank.saturating_sub(1);

    if desired_start > last {
        if profile.prefers_best_on_shortfall(level) {
            return 0;
        }
        return rng.random_range(0..=last);
    }

    let end = desired_end.min(last).max(desired_start);
    rng.random_range(desired_start..=end)
}

/// 候補から 1 手を選び、(指し手, 1 始まりの順位) を返す。
pub fn select_move<'a, R: Rng>(
    result: &'a SearchResult,
    level: Level,
    profile: &DifficultyProfile,
    rng: &mut R,
) -> (&'a str, usize) {
    let index = select_index(result.len(), level, profile, rng);
    let mv = result.get(index).unwrap_or_else(|| result.best());
    (mv, index + 1)
}
