//! CLI command definitions and dispatch for the `threadbot` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod check;
pub mod config;
pub mod console;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Bridge Discord threads to an LLM conversation engine.
#[derive(Parser)]
#[command(name = "threadbot", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Load configuration from this file instead of the data directory.
    #[arg(long, global = true, env = "THREADBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to Discord and serve conversations until interrupted.
    Serve,

    /// Run the engine against a local in-memory transport.
    Console,

    /// Verify model connectivity and the Discord token.
    Check,

    /// Print the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Default log filter for a verbosity level.
pub fn log_filter(quiet: bool, verbose: u8) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "warn,threadbot=info",
        1 => "info,threadbot=debug",
        _ => "trace",
    }
}
