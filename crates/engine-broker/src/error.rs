//! エラー型
//!
//! `BrokerError` は 1 回の探索セッションが失敗した理由を表す。
//! どれも `MoveBroker::select_move` の内部で回復され、呼び出し側には伝播しない。

use std::io;
use std::time::Duration;

/// 探索セッションの失敗理由
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// エンジンプロセスを起動できなかった（チャネル障害の一種）
    #[error("failed to launch engine: {0}")]
    Launch(#[source] io::Error),

    /// 不正なメッセージ、チャネルの切断、読み書きエラー
    #[error("protocol error: {0}")]
    Protocol(String),

    /// セーフティタイマーが発火し、候補手が 1 つも得られなかった
    #[error("engine did not answer within {}ms", .waited.as_millis())]
    Timeout { waited: Duration },

    /// エンジンが使える指し手を返さなかった
    #[error("engine produced no usable candidate")]
    NoCandidates,
}

impl BrokerError {
    pub(crate) fn protocol(err: impl std::fmt::Display) -> Self {
        BrokerError::Protocol(err.to_string())
    }
}

/// 外部のルールエンジンが指し手の適用を拒否したことを表す。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("move {mv} rejected: {reason}")]
pub struct ApplicationError {
    pub mv: String,
    pub reason: String,
}

impl ApplicationError {
    pub fn new(mv: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            mv: mv.into(),
            reason: reason.into(),
        }
    }
}

/// 設定ファイルの読み込み・検証エラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
