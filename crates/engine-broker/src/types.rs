use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// 平手初期局面の FEN
pub const STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// エンジンが「指し手なし」を表すのに使うトークン
const NULL_MOVES: [&str; 2] = ["(none)", "0000"];

/// 指し手文字列が null move の番兵かどうか。
pub fn is_null_move(mv: &str) -> bool {
    NULL_MOVES.contains(&mv.trim())
}

/// 探索対象の局面。中身は解釈せずにエンジンへ渡す。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Position {
    StartPos,
    Fen(String),
}

impl Position {
    /// `startpos` または FEN 文字列から局面を作る。初期局面の FEN は `StartPos` に正規化する。
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text == "startpos" || text == STARTPOS_FEN {
            Position::StartPos
        } else {
            Position::Fen(text.to_string())
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::StartPos => f.write_str("startpos"),
            Position::Fen(fen) => write!(f, "fen {fen}"),
        }
    }
}

/// 1 手分の探索要求。手ごとに新しく作り、使い回さない。
#[derive(Clone, Debug)]
pub struct SearchRequest {
    pub position: Position,
    /// MultiPV で要求する候補手の数
    pub candidate_count: usize,
    pub time_budget: Duration,
}

impl SearchRequest {
    pub fn new(position: Position, candidate_count: usize, time_budget: Duration) -> Self {
        Self {
            position,
            candidate_count: candidate_count.max(1),
            time_budget,
        }
    }
}

/// 候補手のリスト（良い順）。空のまま構築されることはない。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    moves: Vec<String>,
}

impl SearchResult {
    /// 空なら `None`。
    pub fn new(moves: Vec<String>) -> Option<Self> {
        if moves.is_empty() {
            None
        } else {
            Some(Self { moves })
        }
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// 常に false（空の結果は作れない）。clippy の `len_without_is_empty` 対策。
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn best(&self) -> &str {
        &self.moves[0]
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.moves.get(index).map(String::as_str)
    }
}

/// どちらの経路でセッションが解決されたか
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    /// エンジン自身の `bestmove`
    Engine,
    /// セーフティタイマー（`stop` 後の猶予も切れた）
    SafetyTimer,
}

/// 成功したセッションの報告
#[derive(Clone, Debug)]
pub struct SearchReport {
    pub result: SearchResult,
    pub resolved_by: ResolvedBy,
    /// セーフティタイマーが発火して `stop` を送ったか
    pub timed_out: bool,
    pub elapsed: Duration,
}

/// 最終的に選ばれた指し手の出所
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MoveSource {
    /// エンジン候補の `rank` 位（1 始まり）
    Engine { rank: usize },
    /// セッション失敗時の合法手からの無作為抽出
    RandomLegal,
    /// 適用拒否後の合法手からの無作為抽出
    RetryAfterRejection,
}

/// `select_move` の出力
#[derive(Clone, Debug)]
pub struct SelectedMove<S> {
    pub mv: String,
    pub elapsed: Duration,
    pub source: MoveSource,
    /// move applier が返した適用後の状態
    pub state: S,
}

pub fn duration_to_millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
