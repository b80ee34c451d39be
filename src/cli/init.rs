use crate::cli::print_json;
use crate::context::StateContext;
use crate::state::InitOptions;
use crate::Result;
use colored::Colorize;
use serde_json::json;

pub async fn run(ctx: &StateContext, options: InitOptions) -> Result<bool> {
    let state = ctx.store.initialize(&options).await?;

    eprintln!(
        "{}",
        format!("✅ Initialized generation {}", state.generation_id).green()
    );
    print_json(&json!({
        "generationId": state.generation_id,
        "stateDir": ctx.config.state_dir,
        "outputsDir": ctx.config.outputs_dir,
        "autoSaveInterval": ctx.config.autosave_period_ms(),
    }))?;
    Ok(true)
}
