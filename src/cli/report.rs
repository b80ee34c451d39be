use crate::cli::print_json;
use crate::context::StateContext;
use crate::validator::outputs_report;
use crate::Result;

pub async fn run(ctx: &StateContext) -> Result<bool> {
    let (_, chapters) = ctx.chapter_structure();
    let report = outputs_report(&ctx.chapters, &ctx.config.outputs_dir, &chapters).await?;
    print_json(&report)?;
    Ok(true)
}
