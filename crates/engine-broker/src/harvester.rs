//! MultiPV の info 行から順位付き候補手を集める。
//!
//! 各順位には最初に報告された指し手だけを残す（first-writer-wins）。
//! 深さが増えると同じ順位に別の手が来るが、最初の手も合法で使えるため上書きしない。

use crate::error::BrokerError;
use crate::types::{SearchResult, is_null_move};

#[derive(Debug)]
pub struct Harvester {
    slots: Vec<Option<String>>,
    bestmove: Option<String>,
}

impl Harvester {
    pub fn new(candidate_count: usize) -> Self {
        Self {
            slots: vec![None; candidate_count.max(1)],
            bestmove: None,
        }
    }

    /// `rank` 位の候補を記録する。範囲外の順位や埋まった枠は無視し、記録したら true。
    pub fn record_info(&mut self, rank: usize, mv: &str) -> bool {
        if rank == 0 || is_null_move(mv) {
            return false;
        }
        match self.slots.get_mut(rank - 1) {
            Some(slot) if slot.is_none() => {
                *slot = Some(mv.to_string());
                true
            }
            _ => false,
        }
    }

    /// エンジン自身の最善手。候補が 1 つも無いときの最後の手段にだけ使う。
    pub fn record_bestmove(&mut self, mv: &str) {
        if !is_null_move(mv) {
            self.bestmove = Some(mv.to_string());
        }
    }

    /// 埋まっている枠の数
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// 埋まった枠を順位順に詰めて結果を作る。
    ///
    /// 候補が空ならエンジンの最善手 1 つ、それも無ければ `NoCandidates`。
    /// 呼び出し後は空に戻る。
    pub fn finish(&mut self) -> Result<SearchResult, BrokerError> {
        let moves: Vec<String> = self.slots.iter_mut().filter_map(Option::take).collect();
        let bestmove = self.bestmove.take();
        SearchResult::new(moves)
            .or_else(|| bestmove.and_then(|mv| SearchResult::new(vec![mv])))
            .ok_or(BrokerError::NoCandidates)
    }
}
