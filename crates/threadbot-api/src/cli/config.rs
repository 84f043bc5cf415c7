//! `threadbot config`: print the effective configuration.

use anyhow::Result;

use threadbot_infra::config::render_config;

use crate::state::AppState;

pub fn show(state: &AppState, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "data_dir": state.data_dir.display().to_string(),
            "config": state.config,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("# data dir: {}", state.data_dir.display());
        print!("{}", render_config(&state.config)?);
    }
    Ok(())
}
