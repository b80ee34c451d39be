//! Decision ledger commands

use crate::cli::print_json;
use crate::context::StateContext;
use crate::state::NewDecision;
use crate::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

#[derive(Subcommand)]
pub enum DecisionsCommands {
    /// List pending decisions across chapters
    List {
        /// Only this chapter
        #[arg(long)]
        chapter: Option<String>,
    },

    /// Record a pending decision for a chapter
    Add {
        /// Chapter ID
        chapter_id: String,

        /// Decision type, e.g. SEARCH_RESULTS_SELECTION
        #[arg(short = 't', long = "type")]
        decision_type: String,

        /// Decision context as JSON
        #[arg(long, default_value = "{}")]
        context: String,

        /// Explicit decision ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Resolve a pending decision
    Resolve {
        /// Chapter ID
        chapter_id: String,

        /// Decision ID
        decision_id: String,

        /// Resolution as JSON, e.g. '{"selected":[0,2]}' for selections
        #[arg(long, default_value = "null")]
        resolution: String,
    },
}

pub async fn run(ctx: &StateContext, cmd: DecisionsCommands) -> Result<bool> {
    let ledger = ctx.ledger();

    match cmd {
        DecisionsCommands::List { chapter } => {
            let mut pending = ledger.pending_decisions().await?;
            if let Some(chapter) = chapter {
                pending.retain(|entry| entry.chapter_id == chapter);
            }
            print_json(&pending)?;
        }
        DecisionsCommands::Add {
            chapter_id,
            decision_type,
            context,
            id,
        } => {
            let context: serde_json::Value =
                serde_json::from_str(&context).context("--context is not valid JSON")?;
            let mut decision = NewDecision::new(decision_type, context);
            if let Some(id) = id {
                decision = decision.with_id(id);
            }
            let pending = ledger.add_pending_decision(&chapter_id, decision).await?;
            print_json(&pending)?;
        }
        DecisionsCommands::Resolve {
            chapter_id,
            decision_id,
            resolution,
        } => {
            let resolution: serde_json::Value =
                serde_json::from_str(&resolution).context("--resolution is not valid JSON")?;
            let chapter = ledger
                .resolve_decision(&chapter_id, &decision_id, resolution)
                .await?;
            eprintln!(
                "{}",
                format!("✅ Resolved {} in {}", decision_id, chapter_id).green()
            );
            print_json(&chapter)?;
        }
    }

    Ok(true)
}
