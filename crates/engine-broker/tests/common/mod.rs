//! Common test utilities: a scripted in-memory engine channel

#![allow(dead_code)] // These utilities may be used by various test files

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use engine_broker::{EngineChannel, EngineLauncher};
use tokio::sync::mpsc;

/// エンジン側から返す 1 件
#[derive(Clone, Debug)]
pub enum Reply {
    Line(String),
    /// 指定時間後に届く行
    After(Duration, String),
    Eof,
    Error(io::ErrorKind),
}

impl Reply {
    pub fn line(s: impl Into<String>) -> Self {
        Reply::Line(s.into())
    }
}

enum Queued {
    Line(String),
    Eof,
    Error(io::ErrorKind),
}

/// 送信コマンド 1 行に対する応答を決める
pub type Script = Arc<dyn Fn(&str) -> Vec<Reply> + Send + Sync>;

/// 全セッション共通の計測値
#[derive(Clone, Default)]
pub struct Counters {
    pub launches: Arc<AtomicUsize>,
    pub shutdowns: Arc<AtomicUsize>,
    pub aborts: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<String>>>,
}

impl Counters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    /// shutdown と abort の合計
    pub fn teardowns(&self) -> usize {
        self.shutdowns() + self.aborts()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

pub struct ScriptedChannel {
    tx: mpsc::UnboundedSender<Queued>,
    rx: mpsc::UnboundedReceiver<Queued>,
    script: Script,
    counters: Counters,
    fail_writes: bool,
    shutdown_delay: Duration,
}

impl ScriptedChannel {
    fn push(&self, reply: Reply) {
        match reply {
            Reply::Line(line) => {
                let _ = self.tx.send(Queued::Line(line));
            }
            Reply::After(delay, line) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Queued::Line(line));
                });
            }
            Reply::Eof => {
                let _ = self.tx.send(Queued::Eof);
            }
            Reply::Error(kind) => {
                let _ = self.tx.send(Queued::Error(kind));
            }
        }
    }
}

#[async_trait]
impl EngineChannel for ScriptedChannel {
    async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.counters.sent.lock().unwrap().push(line.to_string());
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write failure"));
        }
        for reply in (self.script)(line) {
            self.push(reply);
        }
        Ok(())
    }

    async fn recv_line(&mut self) -> io::Result<Option<String>> {
        // tx を自分で持っているので、応答が無ければ永遠に待つ
        match self.rx.recv().await {
            Some(Queued::Line(line)) => Ok(Some(line)),
            Some(Queued::Eof) | None => Ok(None),
            Some(Queued::Error(kind)) => Err(io::Error::new(kind, "scripted read failure")),
        }
    }

    async fn shutdown(&mut self) {
        tokio::time::sleep(self.shutdown_delay).await;
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn abort(&mut self) {
        self.counters.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedLauncher {
    script: Script,
    /// 起動直後に届く応答
    initial: Vec<Reply>,
    fail_launch: bool,
    fail_writes: bool,
    /// `quit` 後に終了するまでの時間
    shutdown_delay: Duration,
    pub counters: Counters,
}

impl ScriptedLauncher {
    pub fn new(script: impl Fn(&str) -> Vec<Reply> + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            initial: Vec::new(),
            fail_launch: false,
            fail_writes: false,
            shutdown_delay: Duration::ZERO,
            counters: Counters::default(),
        }
    }

    pub fn with_initial(mut self, replies: Vec<Reply>) -> Self {
        self.initial = replies;
        self
    }

    pub fn with_shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = delay;
        self
    }

    pub fn failing_launch() -> Self {
        let mut launcher = Self::new(|_| Vec::new());
        launcher.fail_launch = true;
        launcher
    }

    pub fn failing_writes() -> Self {
        let mut launcher = Self::new(|_| Vec::new());
        launcher.fail_writes = true;
        launcher
    }

    pub fn counters(&self) -> Counters {
        self.counters.clone()
    }
}

#[async_trait]
impl EngineLauncher for ScriptedLauncher {
    type Channel = ScriptedChannel;

    async fn launch(&self) -> io::Result<ScriptedChannel> {
        if self.fail_launch {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such engine"));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = ScriptedChannel {
            tx,
            rx,
            script: self.script.clone(),
            counters: self.counters.clone(),
            fail_writes: self.fail_writes,
            shutdown_delay: self.shutdown_delay,
        };
        for reply in self.initial.clone() {
            channel.push(reply);
        }
        Ok(channel)
    }
}

/// `multipv 1..` の info 行
pub fn multipv_lines(moves: &[&str]) -> Vec<Reply> {
    moves
        .iter()
        .enumerate()
        .map(|(i, mv)| {
            Reply::line(format!(
                "info depth 10 seldepth 14 multipv {} score cp {} nodes 4096 pv {mv} e7e5",
                i + 1,
                40 - 15 * i as i32
            ))
        })
        .collect()
}

/// `readyok` を返し、`go` に候補と `bestmove` を即座に返すエンジン
pub fn instant_engine(moves: &[&str]) -> ScriptedLauncher {
    let moves: Vec<String> = moves.iter().map(|m| m.to_string()).collect();
    ScriptedLauncher::new(move |cmd| {
        let refs: Vec<&str> = moves.iter().map(String::as_str).collect();
        if cmd == "isready" {
            vec![Reply::line("readyok")]
        } else if cmd.starts_with("go ") {
            let mut replies = multipv_lines(&refs);
            let best = refs.first().copied().unwrap_or("(none)");
            replies.push(Reply::line(format!("bestmove {best} ponder e7e5")));
            replies
        } else {
            Vec::new()
        }
    })
}

/// `go` に候補だけ返して `bestmove` を出さず、`stop` には `on_stop` を返すエンジン
pub fn stalling_engine(moves: &[&str], on_stop: Vec<Reply>) -> ScriptedLauncher {
    let moves: Vec<String> = moves.iter().map(|m| m.to_string()).collect();
    ScriptedLauncher::new(move |cmd| {
        let refs: Vec<&str> = moves.iter().map(String::as_str).collect();
        match cmd {
            "isready" => vec![Reply::line("readyok")],
            "stop" => on_stop.clone(),
            _ if cmd.starts_with("go ") => multipv_lines(&refs),
            _ => Vec::new(),
        }
    })
}

pub fn legal(moves: &[&str]) -> Vec<String> {
    moves.iter().map(|m| m.to_string()).collect()
}
