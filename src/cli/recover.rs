use crate::cli::print_json;
use crate::context::StateContext;
use crate::state::{RecoveryReport, RecoveryStrategy};
use crate::Result;
use colored::Colorize;

/// A recovered state is valid unless its consistency pass still found problems
pub(crate) fn recovered_valid(report: &RecoveryReport) -> bool {
    report.consistency.as_ref().map_or(true, |c| c.valid)
}

pub async fn run(ctx: &StateContext, fix: bool) -> Result<bool> {
    let report = ctx.recovery()?.recover(fix).await?;

    let notice = match report.strategy {
        RecoveryStrategy::StateOk if report.schema_repaired => {
            "State repaired with schema defaults".yellow()
        }
        RecoveryStrategy::StateOk => "State is usable".green(),
        RecoveryStrategy::Checkpoint => "Recovered from latest checkpoint".yellow(),
        RecoveryStrategy::FreshInit => "Initialized a fresh state".yellow(),
    };
    eprintln!("{}", notice);

    print_json(&report)?;

    let valid = recovered_valid(&report);
    if !valid {
        eprintln!("{}", "❌ Consistency problems remain after recovery".red());
    }
    Ok(valid)
}
