//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();
/// Effective limits used for the current run (for JSON details).
pub static LAST_LIMITS: OnceLock<RunLimits> = OnceLock::new();

#[derive(Copy, Clone, Debug)]
pub struct RunLimits {
    /// 0 when disabled.
    pub max_run_ms: u64,
    /// Default acknowledgment timeout; 0 waits forever.
    pub ack_timeout_ms: u64,
}

#[derive(Parser, Debug)]
#[command(name = "mixer", version, about = "Cocktail machine recipe runner")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/mixer_config.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a recipe to completion
    Run {
        /// Recipe TOML
        #[arg(long, value_name = "FILE")]
        recipe: PathBuf,
        /// Override runner.max_run_ms (0 disables the cap)
        #[arg(long, value_name = "MS")]
        max_run_ms: Option<u64>,
        /// Keep going after a failed step instead of aborting the recipe
        #[arg(long, action = ArgAction::SetTrue)]
        continue_on_failure: bool,
    },
    /// Quick check that the command channel can be opened and read
    SelfCheck,
    /// Health check for operational monitoring
    Health,
}
