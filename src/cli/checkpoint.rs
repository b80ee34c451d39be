//! Checkpoint commands: create, list, cleanup and resume

use crate::cli::print_json;
use crate::context::StateContext;
use crate::models::CheckpointType;
use crate::Result;
use colored::Colorize;
use serde_json::json;

pub async fn create(
    ctx: &StateContext,
    description: &str,
    checkpoint_type: CheckpointType,
) -> Result<bool> {
    let checkpoint_id = ctx.checkpoints.create(description, checkpoint_type).await?;
    eprintln!("{}", format!("📌 Checkpoint: {}", checkpoint_id).green());
    print_json(&json!({ "checkpointId": checkpoint_id }))?;
    Ok(true)
}

/// List checkpoints, oldest first; `limit` keeps only the newest ones
pub async fn list(ctx: &StateContext, limit: Option<usize>) -> Result<bool> {
    let mut summaries = ctx.checkpoints.summaries().await?;
    if let Some(limit) = limit.filter(|l| *l > 0) {
        let skip = summaries.len().saturating_sub(limit);
        summaries = summaries.split_off(skip);
    }
    print_json(&summaries)?;
    Ok(true)
}

pub async fn cleanup(ctx: &StateContext, keep: Option<usize>) -> Result<bool> {
    let keep = keep.unwrap_or(ctx.checkpoints.keep());
    let deleted = ctx.checkpoints.cleanup(keep).await;
    let kept = ctx.checkpoints.list().await?.len();
    print_json(&json!({ "deleted": deleted, "kept": kept }))?;
    Ok(true)
}

/// Restore the newest checkpoint
pub async fn resume(ctx: &StateContext) -> Result<bool> {
    let Some(latest) = ctx.checkpoints.latest().await? else {
        eprintln!("{}", "No checkpoints found".yellow());
        return Ok(false);
    };

    let state = ctx.checkpoints.restore(&latest.checkpoint_id).await?;
    eprintln!(
        "{}",
        format!("⏪ Restored checkpoint {}", latest.checkpoint_id).green()
    );
    print_json(&json!({
        "checkpointId": latest.checkpoint_id,
        "generationId": state.generation_id,
        "phase": state.current_phase.phase,
    }))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateConfig;
    use crate::state::InitOptions;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, StateContext) {
        let temp = TempDir::new().unwrap();
        let ctx = StateContext::new(StateConfig::rooted_at(temp.path()));
        ctx.store.initialize(&InitOptions::default()).await.unwrap();
        ctx.store.stop_autosave().await;
        (temp, ctx)
    }

    #[tokio::test]
    async fn test_resume_without_checkpoints() {
        let (_temp, ctx) = setup().await;
        assert!(!resume(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_cleanup_resume() {
        let (_temp, ctx) = setup().await;
        for _ in 0..3 {
            assert!(create(&ctx, "manual", CheckpointType::Manual).await.unwrap());
        }

        assert!(cleanup(&ctx, Some(1)).await.unwrap());
        assert_eq!(ctx.checkpoints.list().await.unwrap().len(), 1);
        assert!(resume(&ctx).await.unwrap());
    }
}
