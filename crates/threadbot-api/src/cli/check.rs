//! `threadbot check`: verify model connectivity and the Discord token.

use std::time::Duration;

use anyhow::{Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use threadbot_infra::discord::DiscordTransport;
use threadbot_infra::llm::test_provider_connection;
use threadbot_infra::secret::lookup_secret;

use crate::state::AppState;

/// Outcome of one check: `Ok(detail)` or `Err(reason)`.
type CheckResult = std::result::Result<String, String>;

pub async fn check(state: &AppState, json: bool) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    if json {
        spinner.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));

    spinner.set_message("Checking model provider...");
    let model = check_model(state).await;

    spinner.set_message("Checking Discord token...");
    let discord = check_discord(state).await;

    spinner.finish_and_clear();

    let model_ok = model.is_ok();
    if json {
        let report = serde_json::json!({
            "model": report_entry(&model),
            "discord": discord.as_ref().map(report_entry),
            "healthy": model_ok && discord.as_ref().is_none_or(|d| d.is_ok()),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!("  {} Threadbot health check", style("🔍").bold());
        println!();
        print_line(
            &format!(
                "Model {} ({})",
                state.config.model.model, state.config.model.provider
            ),
            &model,
        );
        match &discord {
            Some(result) => print_line("Discord token", result),
            None => println!(
                "  {} Discord token: {} not set, skipped",
                style("-").dim(),
                state.config.discord.token_env
            ),
        }
        println!();
    }

    if !model_ok || discord.as_ref().is_some_and(|d| d.is_err()) {
        bail!("health check failed");
    }
    Ok(())
}

async fn check_model(state: &AppState) -> CheckResult {
    let provider = state.provider().map_err(|e| format!("{e:#}"))?;
    test_provider_connection(&provider)
        .await
        .map(|()| "reachable".to_string())
        .map_err(|e| e.to_string())
}

/// `None` when no token is configured.
async fn check_discord(state: &AppState) -> Option<CheckResult> {
    let token = lookup_secret(&state.config.discord.token_env)?;
    let transport = DiscordTransport::new(token);
    Some(
        transport
            .current_user()
            .await
            .map(|user| format!("authenticated as {}", user.username))
            .map_err(|e| e.to_string()),
    )
}

fn report_entry(result: &CheckResult) -> serde_json::Value {
    match result {
        Ok(detail) => serde_json::json!({ "ok": true, "detail": detail }),
        Err(error) => serde_json::json!({ "ok": false, "error": error }),
    }
}

fn print_line(label: &str, result: &CheckResult) {
    match result {
        Ok(detail) => println!("  {} {label}: {detail}", style("✓").green()),
        Err(error) => println!("  {} {label}: {}", style("✗").red(), style(error).red()),
    }
}
