use super::{print_json, Context, Outcome};
use crate::output;

pub async fn run(ctx: &Context, table: &str) -> anyhow::Result<Outcome> {
    let report = ctx.engine.dependencies(table).await;
    if ctx.json {
        print_json(&report)?;
    } else {
        output::print_dependencies(&report);
    }
    Ok(Outcome::Success)
}
