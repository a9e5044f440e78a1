//! UCI プロトコルのエンコード・デコード
//!
//! 送信側は [`Command`] を `Display` で 1 行に変換する。受信側は
//! [`decode_line`] が生の 1 行を [`ProtocolEvent`] に変換し、関心のない行は
//! `None` として捨てる。

use std::fmt;

use crate::types::Position;

/// broker → engine のコマンド
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Uci,
    UciNewGame,
    SetOption { name: String, value: Option<String> },
    IsReady,
    Position(Position),
    GoMovetime(u64),
    Stop,
    Quit,
}

impl Command {
    pub fn multipv(count: usize) -> Self {
        Command::SetOption {
            name: "MultiPV".to_string(),
            value: Some(count.to_string()),
        }
    }

    /// `Name=Value` 形式（`=` なしは名前のみ）の追加オプションを解釈する。
    pub fn from_option_spec(spec: &str) -> Self {
        match spec.split_once('=') {
            Some((name, value)) => Command::SetOption {
                name: name.trim().to_string(),
                value: Some(value.trim().to_string()),
            },
            None => Command::SetOption {
                name: spec.trim().to_string(),
                value: None,
            },
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Uci => f.write_str("uci"),
            Command::UciNewGame => f.write_str("ucinewgame"),
            Command::SetOption {
                name,
                value: Some(value),
            } => write!(f, "setoption name {name} value {value}"),
            Command::SetOption { name, value: None } => write!(f, "setoption name {name}"),
            Command::IsReady => f.write_str("isready"),
            Command::Position(position) => write!(f, "position {position}"),
            Command::GoMovetime(ms) => write!(f, "go movetime {ms}"),
            Command::Stop => f.write_str("stop"),
            Command::Quit => f.write_str("quit"),
        }
    }
}

/// engine → broker のイベント
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolEvent {
    ReadyAck,
    /// `rank` 位（1 始まり）の PV の先頭手
    InfoLine { rank: usize, mv: String },
    BestMove { mv: String },
    /// チャネル障害。行のデコードからは生じず、チャネルの読み書きエラーから作られる。
    ProtocolError(String),
}

/// 受信した 1 行をイベントに変換する。未知の行・不完全な行は `None`。
pub fn decode_line(line: &str) -> Option<ProtocolEvent> {
    let mut tokens = line.split_whitespace();
    match tokens.next()? {
        "readyok" => Some(ProtocolEvent::ReadyAck),
        "bestmove" => {
            // `bestmove` 単独は「指し手なし」とみなす
            let mv = tokens.next().unwrap_or("(none)").to_string();
            Some(ProtocolEvent::BestMove { mv })
        }
        "info" => decode_info(tokens),
        _ => None,
    }
}

fn decode_info<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Option<ProtocolEvent> {
    // MultiPV=1 のエンジンは multipv を省略するので既定は 1 位
    let mut rank = 1usize;
    while let Some(tok) = tokens.next() {
        match tok {
            // 以降は自由文字列
            "string" => return None,
            "multipv" => {
                rank = tokens.next()?.parse().ok()?;
            }
            "pv" => {
                let mv = tokens.next()?;
                return Some(ProtocolEvent::InfoLine {
                    rank,
                    mv: mv.to_string(),
                });
            }
            _ => {}
        }
    }
    None
}
