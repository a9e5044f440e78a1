//! 外部の探索エンジンに MultiPV で候補手を問い合わせ、難易度に応じた 1 手に変換する。
//!
//! 入口は [`MoveBroker::select_move`]。1 手ごとに新しいエンジンセッションを起動し、
//! 失敗時は合法手からの無作為抽出へ縮退する。

pub mod broker;
pub mod channel;
pub mod codec;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod harvester;
pub mod selector;
pub mod session;
pub mod types;

pub use broker::MoveBroker;
pub use channel::{EngineChannel, EngineLauncher, ProcessChannel, ProcessLauncher};
pub use codec::{Command, ProtocolEvent, decode_line};
pub use config::{BrokerConfig, EngineConfig, SearchConfig};
pub use difficulty::{DifficultyProfile, Level, RankWindow};
pub use error::{ApplicationError, BrokerError, ConfigError};
pub use harvester::Harvester;
pub use session::{ChannelGuard, EngineSession, ResolveOnce, SessionState, SessionTiming};
pub use types::{
    MoveSource, Position, ResolvedBy, STARTPOS_FEN, SearchReport, SearchRequest, SearchResult,
    SelectedMove,
};
