//! `threadbot serve`: run the engine against Discord.

use std::sync::Arc;

use anyhow::Result;
use console::style;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use threadbot_infra::discord::DiscordTransport;
use threadbot_infra::discord::gateway::GatewayListener;
use threadbot_infra::secret::require_secret;

use crate::state::AppState;

/// Capacity of the gateway → dispatcher event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub async fn serve(state: &AppState, quiet: bool) -> Result<()> {
    let token = require_secret(&state.config.discord.token_env)?;
    let transport = Arc::new(DiscordTransport::new(token));
    let engine = state.build_engine(transport.clone())?;

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let listener = GatewayListener::new(
        transport,
        state.config.discord.clone(),
        state.config.assistant_label.clone(),
    );
    let gateway = tokio::spawn(listener.run(tx, cancel.clone()));
    let dispatcher = tokio::spawn(engine.dispatcher().run(rx, cancel.clone()));

    if !quiet {
        println!();
        println!(
            "  {} Threadbot v{} serving Discord",
            style("⚡").bold(),
            env!("CARGO_PKG_VERSION")
        );
        println!(
            "  Model: {} ({})",
            style(&state.config.model.model).cyan(),
            state.config.model.provider
        );
        println!("  Press {} to stop.", style("Ctrl+C").bold());
        println!();
    }

    shutdown_signal().await;
    info!("Shutdown requested");

    cancel.cancel();
    if let Err(e) = gateway.await {
        warn!(error = %e, "Gateway task ended abnormally");
    }
    if let Err(e) = dispatcher.await {
        warn!(error = %e, "Dispatcher task ended abnormally");
    }
    engine.registry.shutdown();

    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
