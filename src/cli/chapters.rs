//! Chapter structure commands

use crate::cli::print_json;
use crate::config::{active_chapters, clear_active_chapters, set_active_chapters};
use crate::context::StateContext;
use crate::Result;
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum ChaptersCommands {
    /// Make a JSON chapter structure the active one
    Set {
        /// JSON file: {"chapters": [...]} or a bare array
        #[arg(long)]
        file: PathBuf,
    },

    /// Show the chapter structure in effect and where it came from
    Show,

    /// Remove the active structure
    Clear,
}

pub fn run(ctx: &StateContext, cmd: ChaptersCommands) -> Result<bool> {
    match cmd {
        ChaptersCommands::Set { file } => {
            let chapters = set_active_chapters(&ctx.config, &file)?;
            eprintln!(
                "{}",
                format!("📚 Active structure: {} chapters", chapters.len()).green()
            );
            print_json(&json!({ "chapters": chapters }))?;
        }
        ChaptersCommands::Show => {
            let (source, chapters) = active_chapters(&ctx.config);
            print_json(&json!({ "source": source, "chapters": chapters }))?;
        }
        ChaptersCommands::Clear => {
            let removed = clear_active_chapters(&ctx.config)?;
            if !removed {
                eprintln!("{}", "No active structure to clear".yellow());
            }
            print_json(&json!({ "removed": removed }))?;
        }
    }
    Ok(true)
}
