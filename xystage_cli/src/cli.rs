//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;
use xystage_core::WellPosition;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "xystage", version, about = "XY stage well-plate positioner")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/xystage.toml")]
    pub config: PathBuf,

    /// Emit JSON (results on stdout, logs as JSON lines on stderr)
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG takes precedence
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List every well label of the configured plate, row-major
    Wells,
    /// Print the coordinates a well resolves to, without moving
    Resolve {
        /// Well label, e.g. A1 or h12
        #[arg(long)]
        well: String,
        /// Target inside the well
        #[arg(long, default_value = "center", value_parser = parse_position)]
        position: WellPosition,
    },
    /// Connect, home and move to a well
    MoveWell {
        #[arg(long)]
        well: String,
        #[arg(long, default_value = "center", value_parser = parse_position)]
        position: WellPosition,
    },
    /// Connect, home and move to absolute coordinates (mm)
    MoveXy {
        #[arg(long, allow_hyphen_values = true)]
        x: f64,
        #[arg(long, allow_hyphen_values = true)]
        y: f64,
    },
    /// Connect and report the live position
    Position,
    /// Connect and run the homing sequence
    Home,
    /// Connect and send an emergency stop
    Stop,
    /// Move through every stop of a visit-plan CSV
    Visit {
        /// CSV with headers well,position[,dwell_ms]
        #[arg(long, value_name = "FILE")]
        plan: PathBuf,
    },
    /// Quick health check (controller answers and homes)
    SelfCheck,
}

fn parse_position(s: &str) -> Result<WellPosition, String> {
    s.parse()
        .map_err(|_| format!("expected one of {}", WellPosition::names()))
}
