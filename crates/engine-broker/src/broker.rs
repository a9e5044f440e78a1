//! 指し手選択の入口
//!
//! フォールバックの順序:
//!
//! 1. エンジン候補から難易度に応じて 1 手（窓に届かなければ selector 内で縮退）
//! 2. セッションが失敗したら合法手から無作為に 1 手
//! 3. 適用を拒否されたら、拒否された手を除いた合法手から無作為に 1 手
//! 4. 合法手が無ければ `None`（詰み・ステイルメイト）

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::channel::{EngineLauncher, ProcessLauncher};
use crate::config::BrokerConfig;
use crate::difficulty::{DifficultyProfile, Level};
use crate::error::{ApplicationError, BrokerError, ConfigError};
use crate::selector;
use crate::session::{EngineSession, SessionTiming};
use crate::types::{
    MoveSource, Position, SearchReport, SearchRequest, SelectedMove, duration_to_millis,
};

pub struct MoveBroker<L, R = Xoshiro256PlusPlus> {
    launcher: L,
    profile: DifficultyProfile,
    timing: SessionTiming,
    candidate_count: usize,
    options: Vec<String>,
    rng: R,
}

impl MoveBroker<ProcessLauncher> {
    /// 設定ファイルのエンジンで broker を作る。`engine.path` が必須。
    pub fn from_config(config: BrokerConfig) -> Result<Self, ConfigError> {
        let path = config
            .engine
            .path
            .clone()
            .ok_or_else(|| ConfigError::Invalid("engine.path is not set".into()))?;
        let launcher = ProcessLauncher::new(path, config.engine.args.clone());
        Ok(MoveBroker::new(launcher, config))
    }
}

impl<L: EngineLauncher> MoveBroker<L> {
    pub fn new(launcher: L, config: BrokerConfig) -> Self {
        let rng = Xoshiro256PlusPlus::seed_from_u64(rand::random());
        MoveBroker::with_rng(launcher, config, rng)
    }
}

impl<L: EngineLauncher, R: Rng> MoveBroker<L, R> {
    pub fn with_rng(launcher: L, config: BrokerConfig, rng: R) -> Self {
        Self {
            launcher,
            timing: config.search.timing(),
            candidate_count: config.search.multipv,
            options: config.engine.options,
            profile: config.difficulty,
            rng,
        }
    }

    /// 乱数源を seed 固定の PRNG に差し替える（再現用）。
    pub fn with_seed(self, seed: u64) -> MoveBroker<L, Xoshiro256PlusPlus> {
        MoveBroker {
            launcher: self.launcher,
            profile: self.profile,
            timing: self.timing,
            candidate_count: self.candidate_count,
            options: self.options,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    pub fn profile(&self) -> &DifficultyProfile {
        &self.profile
    }

    /// 局面と難易度から 1 手を選んで適用する。
    ///
    /// - `legal_moves`: 現局面の合法手を列挙する（フォールバック時のみ呼ぶ）
    /// - `apply`: 指し手を検証・適用し、適用後の状態を返す
    ///
    /// どの経路でもエラーは返さない。`None` は合法手が無いことを表す。
    pub async fn select_move<S, F, A>(
        &mut self,
        position: &Position,
        level: i64,
        mut legal_moves: F,
        mut apply: A,
    ) -> Option<SelectedMove<S>>
    where
        F: FnMut() -> Vec<String>,
        A: FnMut(&str) -> Result<S, ApplicationError>,
    {
        let started = Instant::now();
        let level = Level::new(level);
        let request = SearchRequest::new(
            position.clone(),
            self.candidate_count,
            self.profile.time_budget(level),
        );

        let (mv, source) = match self.search(request).await {
            Ok(report) => {
                let (mv, rank) =
                    selector::select_move(&report.result, level, &self.profile, &mut self.rng);
                info!(
                    "level {} picked {mv} (rank {rank}/{}) after {}ms, resolved by {:?}",
                    level.get(),
                    report.result.len(),
                    duration_to_millis(report.elapsed),
                    report.resolved_by
                );
                (mv.to_string(), MoveSource::Engine { rank })
            }
            Err(err) => {
                warn!("engine search failed ({err}); falling back to a random legal move");
                let mv = self.random_legal(&mut legal_moves, None)?;
                (mv, MoveSource::RandomLegal)
            }
        };

        match apply(&mv) {
            Ok(state) => Some(SelectedMove {
                mv,
                elapsed: started.elapsed(),
                source,
                state,
            }),
            Err(err) => {
                warn!("{err}; retrying with a random legal move");
                let retry = self.random_legal(&mut legal_moves, Some(&mv))?;
                match apply(&retry) {
                    Ok(state) => Some(SelectedMove {
                        mv: retry,
                        elapsed: started.elapsed(),
                        source: MoveSource::RetryAfterRejection,
                        state,
                    }),
                    Err(err) => {
                        warn!("{err}; giving up on this position");
                        None
                    }
                }
            }
        }
    }

    /// エンジンを起動して 1 回探索する。全体を外側のタイムアウトでも囲む。
    pub async fn search(&mut self, request: SearchRequest) -> Result<SearchReport, BrokerError> {
        let limit = self.timing.backstop(request.time_budget);
        let channel = self.launcher.launch().await.map_err(BrokerError::Launch)?;
        let session =
            EngineSession::new(channel, request, self.timing).with_options(self.options.clone());
        match tokio::time::timeout(limit, session.run()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(BrokerError::Timeout { waited: limit }),
        }
    }

    fn random_legal<F>(&mut self, legal_moves: &mut F, exclude: Option<&str>) -> Option<String>
    where
        F: FnMut() -> Vec<String>,
    {
        let mut moves = legal_moves();
        if let Some(rejected) = exclude {
            moves.retain(|m| m != rejected);
        }
        if moves.is_empty() {
            warn!("no legal move available; position is terminal");
            return None;
        }
        let index = self.rng.random_range(0..moves.len());
        Some(moves.swap_remove(index))
    }
}
