//! 1 回の探索を受け持つエンジンセッション
//!
//! 状態遷移は前進のみ:
//!
//! ```text
//! Created → Initializing → AwaitingSearch → Collecting → (Stopping) → Resolved → Terminated
//!                 └──────────────┴──────────────┴─────────────┴──→ Failed → Terminated
//! ```
//!
//! イベントは 1 本のループで処理し、次の受信行とセーフティタイマーを
//! `tokio::select!` で競わせる。`bestmove` とタイマーのどちらが先でも解決は
//! [`ResolveOnce`] で一度だけ。通信路は [`ChannelGuard`] が所有し、どの経路でも
//! ちょうど一度だけ解放される。

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::channel::{ENGINE_QUIT_TIMEOUT, EngineChannel};
use crate::codec::{self, Command, ProtocolEvent};
use crate::error::BrokerError;
use crate::harvester::Harvester;
use crate::types::{ResolvedBy, SearchReport, SearchRequest, duration_to_millis};

/// セッションの待ち時間の設定
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTiming {
    /// 思考時間に上乗せする猶予
    pub safety_margin: Duration,
    /// `stop` 送信後に後続の `bestmove` を待つ時間
    pub stop_grace: Duration,
    /// ハンドシェイク（`readyok` まで）の上限
    pub ready_timeout: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_millis(2000),
            stop_grace: Duration::from_millis(500),
            ready_timeout: Duration::from_millis(5000),
        }
    }
}

impl SessionTiming {
    /// 1 セッションが待ちうる最大時間。
    pub fn max_wait(&self, time_budget: Duration) -> Duration {
        self.ready_timeout + time_budget + self.safety_margin + self.stop_grace
    }

    /// セッション全体を囲む外側の打ち切り時間。`max_wait` の後のエンジン終了待ちも含む。
    pub fn backstop(&self, time_budget: Duration) -> Duration {
        self.max_wait(time_budget) + ENGINE_QUIT_TIMEOUT + self.stop_grace
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Initializing,
    AwaitingSearch,
    Collecting,
    /// セーフティタイマー発火後、`stop` への応答を待っている
    Stopping,
    Resolved,
    Failed,
    Terminated,
}

impl SessionState {
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Created, Initializing)
            | (Initializing, AwaitingSearch)
            | (AwaitingSearch, Collecting)
            | (AwaitingSearch | Collecting, Stopping)
            | (Initializing | AwaitingSearch | Collecting | Stopping, Resolved)
            | (Resolved | Failed, Terminated) => true,
            (Resolved | Failed | Terminated, Failed) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

/// 一度だけ成功する解決フラグ。先に書いた側が勝ち、後続は no-op。
#[derive(Debug, Default)]
pub struct ResolveOnce {
    resolved: AtomicBool,
}

impl ResolveOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解決権を取る。最初の呼び出しだけ true。
    pub fn claim(&self) -> bool {
        !self.resolved.swap(true, Ordering::AcqRel)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}

/// 通信路を所有し、解放をちょうど一度に限る。
///
/// `release()` を経ずに破棄された場合（呼び出し側のキャンセル等）は
/// `Drop` で `abort()` する。
pub struct ChannelGuard<C: EngineChannel> {
    channel: Option<C>,
}

impl<C: EngineChannel> ChannelGuard<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel: Some(channel),
        }
    }

    pub fn channel(&mut self) -> Result<&mut C, BrokerError> {
        self.channel
            .as_mut()
            .ok_or_else(|| BrokerError::protocol("engine channel already released"))
    }

    pub async fn release(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.shutdown().await;
        }
    }
}

impl<C: EngineChannel> Drop for ChannelGuard<C> {
    fn drop(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            warn!("engine session dropped before teardown; aborting engine");
            channel.abort();
        }
    }
}

enum Wake {
    Line(io::Result<Option<String>>),
    Deadline,
}

/// 1 回の探索の状態機械
pub struct EngineSession<C: EngineChannel> {
    guard: ChannelGuard<C>,
    request: SearchRequest,
    timing: SessionTiming,
    /// MultiPV 以外の追加 `setoption`（`Name=Value`）
    options: Vec<String>,
    state: SessionState,
    harvester: Harvester,
    resolver: ResolveOnce,
    started: Instant,
}

impl<C: EngineChannel> EngineSession<C> {
    pub fn new(channel: C, request: SearchRequest, timing: SessionTiming) -> Self {
        let harvester = Harvester::new(request.candidate_count);
        Self {
            guard: ChannelGuard::new(channel),
            request,
            timing,
            options: Vec::new(),
            state: SessionState::Created,
            harvester,
            resolver: ResolveOnce::new(),
            started: Instant::now(),
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    /// 探索を最後まで進め、通信路を解放してから結果を返す。
    pub async fn run(mut self) -> Result<SearchReport, BrokerError> {
        let outcome = self.drive().await;
        if let Err(err) = &outcome {
            if self.state != SessionState::Resolved {
                warn!("engine session failed in {:?}: {err}", self.state);
                self.advance(SessionState::Failed);
            }
        }
        self.guard.release().await;
        self.advance(SessionState::Terminated);
        outcome
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid session transition {:?} -> {next:?}",
            self.state
        );
        trace!("session {:?} -> {next:?}", self.state);
        self.state = next;
    }

    async fn send(&mut self, cmd: Command) -> Result<(), BrokerError> {
        let line = cmd.to_string();
        debug!(">>> {line}");
        self.guard.channel()?.send_line(&line).await.map_err(BrokerError::protocol)
    }

    async fn drive(&mut self) -> Result<SearchReport, BrokerError> {
        self.advance(SessionState::Initializing);
        self.send(Command::Uci).await?;
        self.send(Command::UciNewGame).await?;
        self.send(Command::multipv(self.request.candidate_count)).await?;
        for spec in self.options.clone() {
            self.send(Command::from_option_spec(&spec)).await?;
        }
        self.send(Command::IsReady).await?;

        let mut deadline = Instant::now() + self.timing.ready_timeout;
        loop {
            let wake = {
                let channel = self.guard.channel()?;
                tokio::select! {
                    line = channel.recv_line() => Wake::Line(line),
                    _ = tokio::time::sleep_until(deadline) => Wake::Deadline,
                }
            };

            let event = match wake {
                Wake::Deadline => match self.on_deadline().await? {
                    Some(next) => {
                        deadline = next;
                        continue;
                    }
                    None => return self.resolve(ResolvedBy::SafetyTimer),
                },
                Wake::Line(Ok(Some(line))) => {
                    debug!("<<< {line}");
                    match codec::decode_line(&line) {
                        Some(event) => event,
                        None => continue,
                    }
                }
                Wake::Line(Ok(None)) => {
                    ProtocolEvent::ProtocolError("engine closed the channel".to_string())
                }
                Wake::Line(Err(e)) => ProtocolEvent::ProtocolError(e.to_string()),
            };

            match event {
                ProtocolEvent::ReadyAck => {
                    if self.state == SessionState::Initializing {
                        deadline = self.start_search().await?;
                    } else {
                        trace!("ignoring readyok in {:?}", self.state);
                    }
                }
                ProtocolEvent::InfoLine { rank, mv } => match self.state {
                    SessionState::AwaitingSearch | SessionState::Collecting | SessionState::Stopping => {
                        self.harvester.record_info(rank, &mv);
                        if self.state == SessionState::AwaitingSearch {
                            self.advance(SessionState::Collecting);
                        }
                    }
                    _ => trace!("ignoring info before search start"),
                },
                // readyok より先に届いても解決経路に流す
                ProtocolEvent::BestMove { mv } => {
                    self.harvester.record_bestmove(&mv);
                    return self.resolve(ResolvedBy::Engine);
                }
                ProtocolEvent::ProtocolError(msg) => return Err(BrokerError::Protocol(msg)),
            }
        }
    }

    /// `readyok` を受けて局面と `go` を送り、セーフティタイマーの期限を返す。
    async fn start_search(&mut self) -> Result<Instant, BrokerError> {
        self.advance(SessionState::AwaitingSearch);
        self.send(Command::Position(self.request.position.clone())).await?;
        let budget = self.request.time_budget;
        self.send(Command::GoMovetime(duration_to_millis(budget))).await?;
        Ok(Instant::now() + budget + self.timing.safety_margin)
    }

    /// タイマー発火時の処理。待ちを延長するなら新しい期限、強制解決なら `None`。
    async fn on_deadline(&mut self) -> Result<Option<Instant>, BrokerError> {
        match self.state {
            SessionState::Initializing => Err(BrokerError::Timeout {
                waited: self.timing.ready_timeout,
            }),
            SessionState::AwaitingSearch | SessionState::Collecting => {
                warn!(
                    "safety timer fired after {}ms with {} candidate(s); sending stop",
                    duration_to_millis(self.started.elapsed()),
                    self.harvester.filled()
                );
                self.advance(SessionState::Stopping);
                if let Err(err) = self.send(Command::Stop).await {
                    warn!("failed to send stop ({err}); resolving with partial candidates");
                    return Ok(None);
                }
                Ok(Some(Instant::now() + self.timing.stop_grace))
            }
            _ => Ok(None),
        }
    }

    fn resolve(&mut self, by: ResolvedBy) -> Result<SearchReport, BrokerError> {
        if !self.resolver.claim() {
            return Err(BrokerError::protocol("session resolved twice"));
        }
        let timed_out = self.state == SessionState::Stopping;
        self.advance(SessionState::Resolved);
        let elapsed = self.started.elapsed();
        debug!("session resolved by {by:?} after {}ms", duration_to_millis(elapsed));
        match self.harvester.finish() {
            Ok(result) => Ok(SearchReport {
                result,
                resolved_by: by,
                timed_out,
                elapsed,
            }),
            Err(BrokerError::NoCandidates) if timed_out => {
                Err(BrokerError::Timeout { waited: elapsed })
            }
            Err(err) => Err(err),
        }
    }
}
