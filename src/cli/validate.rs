//! Validation commands

use crate::cli::print_json;
use crate::context::StateContext;
use crate::Result;
use clap::Subcommand;
use colored::Colorize;
use serde_json::json;

#[derive(Subcommand)]
pub enum ValidateCommands {
    /// Cross-check the global state against chapter states
    Consistency {
        #[arg(long)]
        fix: bool,
    },

    /// Reconcile output files with recorded sections
    Outputs {
        #[arg(long)]
        fix: bool,
    },

    /// Validate state files against their JSON schemas
    State {
        #[arg(long)]
        fix: bool,
    },

    /// Check that every chapter has enough output files
    Coverage {
        /// Override the minimum sections per chapter
        #[arg(long)]
        min: Option<usize>,
    },

    /// Consistency, outputs and coverage together
    All {
        #[arg(long)]
        fix: bool,

        #[arg(long)]
        min: Option<usize>,
    },
}

pub async fn run(ctx: &StateContext, cmd: ValidateCommands) -> Result<bool> {
    let valid = match cmd {
        ValidateCommands::Consistency { fix } => {
            let report = ctx.consistency().validate(fix).await?;
            print_json(&report)?;
            report.valid
        }
        ValidateCommands::Outputs { fix } => {
            let report = ctx.outputs().validate(fix).await?;
            print_json(&report)?;
            report.valid
        }
        ValidateCommands::State { fix } => {
            let report = ctx.schema()?.validate(fix).await?;
            print_json(&report)?;
            report.valid
        }
        ValidateCommands::Coverage { min } => {
            let (_, chapters) = ctx.chapter_structure();
            let report = ctx.coverage(min).validate(&chapters).await?;
            print_json(&report)?;
            report.valid
        }
        ValidateCommands::All { fix, min } => {
            let consistency = ctx.consistency().validate(fix).await?;
            let outputs = ctx.outputs().validate(fix).await?;
            let (_, chapters) = ctx.chapter_structure();
            let coverage = ctx.coverage(min).validate(&chapters).await?;

            let valid = consistency.valid && outputs.valid && coverage.valid;
            print_json(&json!({
                "valid": valid,
                "consistency": consistency,
                "outputs": outputs,
                "coverage": coverage,
            }))?;
            valid
        }
    };

    if !valid {
        eprintln!("{}", "❌ Validation failed".red());
    }
    Ok(valid)
}
