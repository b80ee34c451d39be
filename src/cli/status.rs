use crate::cli::print_json;
use crate::context::StateContext;
use crate::state::{Loaded, StateError};
use crate::Result;
use colored::Colorize;
use serde_json::json;

pub async fn run(ctx: &StateContext) -> Result<bool> {
    let state = match ctx.store.load().await {
        Loaded::Present(state) => state,
        Loaded::Absent => {
            eprintln!("{}", "No state initialized. Run: bookstate init".yellow());
            return Ok(false);
        }
        Loaded::Malformed(reason) => {
            return Err(StateError::Malformed {
                path: ctx.store.layout().current_state_file(),
                reason,
            }
            .into())
        }
    };

    print_json(&json!({
        "phase": state.current_phase,
        "status": state.status,
        "generationId": state.generation_id,
        "completedChapters": state.completed_chapters,
        "lastUpdate": state.last_update,
    }))?;
    Ok(true)
}
