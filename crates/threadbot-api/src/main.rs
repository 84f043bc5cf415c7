//! Threadbot entry point.
//!
//! Binary name: `threadbot`
//!
//! Parses CLI arguments, initializes tracing and configuration, then
//! dispatches to the selected subcommand.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use threadbot_observe::tracing_setup::{LogFormat, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "threadbot", &mut std::io::stdout());
        return Ok(());
    }

    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(cli::log_filter(cli.quiet, cli.verbose), format, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Serve => cli::serve::serve(&state, cli.quiet).await,
        Commands::Console => cli::console::run(&state, cli.json).await,
        Commands::Check => cli::check::check(&state, cli.json).await,
        Commands::Config => cli::config::show(&state, cli.json),
        Commands::Completions { .. } => Ok(()),
    }
}
