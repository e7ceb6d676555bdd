// Softener Replay - Recorded poll cycle replay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Softener Replay
//!
//! Feeds a recorded CSV of poll cycles through the softener metrics engine
//! and prints the result.
//!
//! ## Usage
//!
//! ```bash
//! # One JSON snapshot per cycle
//! softener-replay --csv recording.csv
//!
//! # Calibrated hardness, resume and persist state, Prometheus text at the end
//! softener-replay --csv today.csv --config softener.json --state state.json --format prometheus
//! ```

mod metrics;
mod replay;

use clap::{Parser, ValueEnum};
use metrics::encode_metrics;
use replay::{ReplayConfig, ReplayEngine, ReplayError};
use softener_metrics::{DeviceState, EngineConfig};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Output format on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One JSON snapshot per line
    Json,
    /// Prometheus text exposition after the last cycle
    Prometheus,
}

/// Softener metrics replay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSV recording to replay
    #[arg(short, long)]
    csv: String,

    /// Engine configuration (JSON)
    #[arg(long)]
    config: Option<String>,

    /// Device state file, loaded before and saved after the replay
    #[arg(long)]
    state: Option<String>,

    /// Device identifier for logs and metric labels
    #[arg(short, long, default_value = softener_metrics::engine::DEFAULT_DEVICE_ID)]
    device: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    // stdout carries the data, logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    info!("Softener Replay v{}", env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Replay failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), ReplayError> {
    let engine = match &args.config {
        Some(path) => EngineConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => {
            info!("No config given, hardness stays uncalibrated");
            EngineConfig::default()
        }
    };

    let mut replay = ReplayEngine::from_csv(ReplayConfig {
        csv_path: args.csv.clone(),
        device_id: args.device.clone(),
        engine,
    })?;

    let info = replay.dataset_info();
    info!(
        "Recording spans {} cycles from {} to {}",
        info.cycle_count,
        info.first.as_deref().unwrap_or("-"),
        info.last.as_deref().unwrap_or("-")
    );

    if let Some(path) = &args.state {
        replay.import_state(DeviceState::load(path)?)?;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.format {
        OutputFormat::Json => {
            replay.run(|snapshot| {
                writeln!(out, "{}", snapshot.to_json()?)?;
                Ok(())
            })?;
        }
        OutputFormat::Prometheus => {
            replay.run(|_| Ok(()))?;
            write!(out, "{}", encode_metrics()?)?;
        }
    }
    out.flush()?;

    if let Some(path) = &args.state {
        replay.export_state().save(path)?;
        info!("State saved to {}", path);
    }

    Ok(())
}
