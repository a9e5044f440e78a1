//! エンジンとの行単位の入出力
//!
//! セッションは [`EngineChannel`] 越しにしかエンジンと話さない。実運用では
//! [`ProcessLauncher`] が起動する [`ProcessChannel`]（子プロセスの stdin/stdout）、
//! テストでは in-memory の実装を差し込む。

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::trace;

pub const ENGINE_QUIT_TIMEOUT: Duration = Duration::from_millis(300);

/// 1 回の探索の間だけ使うエンジンとの通信路。
#[async_trait]
pub trait EngineChannel: Send {
    /// 1 行送る（改行は実装側が付ける）。
    async fn send_line(&mut self, line: &str) -> io::Result<()>;

    /// 次の 1 行を待つ。`Ok(None)` はエンジン側が閉じたことを表す。
    ///
    /// `tokio::select!` でタイマーと競わせるため cancel safe であること。
    async fn recv_line(&mut self) -> io::Result<Option<String>>;

    /// 正常終了の手順で通信路を閉じる。
    async fn shutdown(&mut self);

    /// 非同期処理が使えない経路（`Drop`）から即座に破棄する。
    fn abort(&mut self);
}

/// 探索ごとに新しい通信路を開く。
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    type Channel: EngineChannel;

    async fn launch(&self) -> io::Result<Self::Channel>;
}

/// 子プロセスとして起動した UCI エンジン
pub struct ProcessChannel {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    /// 読みかけの 1 行。`select!` で中断されても次の呼び出しで続きを読む。
    pending: Vec<u8>,
}

impl ProcessChannel {
    pub fn spawn(path: &Path, args: &[String]) -> io::Result<Self> {
        let mut cmd = Command::new(path);
        if !args.is_empty() {
            cmd.args(args);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // セッションの future ごと捨てられても子プロセスを残さない
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                io::Error::new(e.kind(), format!("failed to spawn engine at {}: {e}", path.display()))
            })?;
        let stdin = child.stdin.take().ok_or_else(|| io::Error::other("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| io::Error::other("no stdout"))?;
        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            pending: Vec::new(),
        })
    }
}

#[async_trait]
impl EngineChannel for ProcessChannel {
    async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await
    }

    async fn recv_line(&mut self) -> io::Result<Option<String>> {
        let read = self.stdout.read_until(b'\n', &mut self.pending).await?;
        if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }
        let line = line_from_bytes(&self.pending);
        self.pending.clear();
        Ok(Some(line))
    }

    async fn shutdown(&mut self) {
        let _ = self.send_line(&crate::codec::Command::Quit.to_string()).await;
        match tokio::time::timeout(ENGINE_QUIT_TIMEOUT, self.child.wait()).await {
            Ok(Ok(_)) => {}
            _ => {
                let _ = self.child.kill().await;
            }
        }
    }

    fn abort(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// 改行を落として文字列にする。UTF-8 でないバイトは置換文字になる。
fn line_from_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(line) => line.to_string(),
        Err(_) => {
            trace!("engine line is not valid UTF-8; decoding lossily");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// 設定されたパスと引数でエンジンを起動する。
#[derive(Clone, Debug)]
pub struct ProcessLauncher {
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            path: path.into(),
            args,
        }
    }
}

#[async_trait]
impl EngineLauncher for ProcessLauncher {
    type Channel = ProcessChannel;

    async fn launch(&self) -> io::Result<ProcessChannel> {
        ProcessChannel::spawn(&self.path, &self.args)
    }
}
