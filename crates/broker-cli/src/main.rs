//! `move-broker`: UCI エンジンに 1 局面を問い合わせ、難易度に応じた 1 手を JSON で出力する。
//!
//! ```text
//! move-broker --engine stockfish --level 3 --legal e2e4,d2d4,g1f3
//! {"move":"g1f3","elapsed_ms":164,"source":{"kind":"engine","rank":3}}
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use engine_broker::types::duration_to_millis;
use engine_broker::{ApplicationError, BrokerConfig, MoveBroker, MoveSource, Position};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "move-broker",
    about = "Ask a UCI engine for a difficulty-calibrated move"
)]
struct Args {
    /// TOML config file (engine, search and difficulty sections)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Engine binary; overrides `engine.path` from the config
    #[arg(long)]
    engine: Option<PathBuf>,

    /// FEN of the position, or `startpos`
    #[arg(long, default_value = "startpos")]
    fen: String,

    /// Difficulty level 1 (weakest) ..= 16 (strongest); out-of-range values are clamped
    #[arg(long, default_value_t = 16, allow_negative_numbers = true)]
    level: i64,

    /// Legal moves of the position, comma separated. Used for fallbacks and to
    /// validate the chosen move; when omitted, any engine move is accepted.
    #[arg(long, value_delimiter = ',')]
    legal: Vec<String>,

    /// Seed for move selection (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Log filter (e.g. `debug`, `engine_broker=trace`); falls back to RUST_LOG, then `info`
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

#[derive(Serialize)]
struct Output {
    #[serde(rename = "move")]
    mv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<MoveSource>,
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // stdout は結果の JSON 専用
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());
    tracing::debug!("arguments: {args:?}");

    let mut config = match &args.config {
        Some(path) => BrokerConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => BrokerConfig::default(),
    };
    if let Some(engine) = &args.engine {
        config.engine.path = Some(engine.clone());
    }

    let broker = MoveBroker::from_config(config)
        .context("an engine is required: pass --engine or set engine.path")?;
    let mut broker = match args.seed {
        Some(seed) => broker.with_seed(seed),
        None => broker,
    };

    let legal: Vec<String> = args
        .legal
        .iter()
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect();
    let position = Position::parse(&args.fen);

    let selected = broker
        .select_move(
            &position,
            args.level,
            || legal.clone(),
            |mv: &str| {
                if legal.is_empty() || legal.iter().any(|m| m == mv) {
                    Ok(())
                } else {
                    Err(ApplicationError::new(mv, "not in the --legal list"))
                }
            },
        )
        .await;

    let output = match selected {
        Some(selected) => Output {
            mv: Some(selected.mv),
            elapsed_ms: Some(duration_to_millis(selected.elapsed)),
            source: Some(selected.source),
        },
        None => Output {
            mv: None,
            elapsed_ms: None,
            source: None,
        },
    };
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}
