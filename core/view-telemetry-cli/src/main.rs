//! view-telemetry: host CLI for the viewport-visibility telemetry engine.
//!
//! ## Subcommands
//!
//! - `replay`: Runs a signal script through the engine and writes the
//!   emitted records to the configured sink
//! - `check-config`: Loads and validates the configuration file
//! - `validate`: Checks a stream of emitted records against the record schema

mod logging;
mod replay;
mod script;
mod sinks;

use clap::{Parser, Subcommand, ValueEnum};
use fs_err as fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use view_telemetry_core::{load_config, SinkKind, TelemetryConfig};
use view_telemetry_protocol::TelemetryRecord;

#[derive(Parser)]
#[command(name = "view-telemetry")]
#[command(about = "Viewport-visibility telemetry engine host")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ~/.view-telemetry/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a signal script (reads stdin when no path is given)
    Replay {
        #[arg(value_name = "SCRIPT")]
        script: Option<PathBuf>,

        /// Override the configured sink
        #[arg(long, value_enum)]
        sink: Option<SinkArg>,

        /// Output file for the file sink
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Sleep between steps and use real timers instead of virtual time
        #[arg(long)]
        realtime: bool,
    },

    /// Validate the configuration file
    CheckConfig,

    /// Validate emitted records, one JSON document per line (reads stdin when
    /// no path is given)
    Validate {
        #[arg(value_name = "RECORDS")]
        records: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SinkArg {
    Tracing,
    Stdout,
    File,
}

impl From<SinkArg> for SinkKind {
    fn from(value: SinkArg) -> Self {
        match value {
            SinkArg::Tracing => SinkKind::Tracing,
            SinkArg::Stdout => SinkKind::Stdout,
            SinkArg::File => SinkKind::File,
        }
    }
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Replay {
            script,
            sink,
            output,
            realtime,
        } => run_replay(cli.config.as_deref(), script, sink, output, realtime),
        Commands::CheckConfig => run_check_config(cli.config.as_deref()),
        Commands::Validate { records } => run_validate(records),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "view-telemetry failed");
        drop(_logging_guard);
        std::process::exit(1);
    }
}

fn run_replay(
    config_path: Option<&Path>,
    script: Option<PathBuf>,
    sink: Option<SinkArg>,
    output: Option<PathBuf>,
    realtime: bool,
) -> Result<(), String> {
    let mut config = resolve_config(config_path);
    if let Some(kind) = sink {
        config.sink.kind = kind.into();
    }
    if output.is_some() {
        config.sink.path = output;
    }
    config.validate().map_err(|e| e.to_string())?;

    let input = read_input(script.as_deref())?;
    let steps = script::parse_script(&input)?;
    tracing::info!(steps = steps.len(), realtime, "Replaying signal script");

    let sink = sinks::build_sink(&config.sink)?;
    let stats = if realtime {
        replay::run_realtime(&steps, &config, sink)?
    } else {
        replay::run_virtual(&steps, &config, sink)?
    };

    tracing::info!(
        sessions = stats.sessions_started,
        batches = stats.batches_emitted,
        stable = stats.stable_batches,
        forced = stats.forced_batches,
        sink_failures = stats.sink_failures,
        "Replay complete"
    );
    Ok(())
}

fn run_check_config(config_path: Option<&Path>) -> Result<(), String> {
    let config = load_config(config_path).map_err(|e| e.to_string())?;
    tracing::info!(
        quiet_period_ms = config.stability.quiet_period_ms,
        min_dwell_ms = config.stability.min_dwell_ms,
        threshold = config.visibility.threshold,
        sink = ?config.sink.kind,
        "Configuration valid"
    );
    Ok(())
}

fn run_validate(records: Option<PathBuf>) -> Result<(), String> {
    let input = read_input(records.as_deref())?;
    let mut checked = 0usize;

    for (index, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: TelemetryRecord = serde_json::from_str(line)
            .map_err(|e| format!("line {}: invalid record: {}", index + 1, e))?;
        record
            .validate()
            .map_err(|e| format!("line {}: {}", index + 1, e))?;
        checked += 1;
    }

    tracing::info!(records = checked, "All records valid");
    Ok(())
}

/// A broken config file is logged and replaced by defaults so replay still runs.
fn resolve_config(path: Option<&Path>) -> TelemetryConfig {
    match load_config(path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to load config; using defaults");
            TelemetryConfig::default()
        }
    }
}

fn read_input(path: Option<&Path>) -> Result<String, String> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(|e| e.to_string()),
        None => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            Ok(input)
        }
    }
}
