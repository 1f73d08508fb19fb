use super::{print_json, Context, Outcome};
use crate::output;

pub async fn table(ctx: &Context, table: &str) -> anyhow::Result<Outcome> {
    let records = ctx.engine.list_for_table(table).await?;
    if ctx.json {
        print_json(&records)?;
    } else {
        output::print_records(&format!("table '{}'", table), &records);
    }
    Ok(Outcome::Success)
}

pub async fn model(ctx: &Context, model: &str) -> anyhow::Result<Outcome> {
    let records = ctx.engine.list_for_model(model).await?;
    if ctx.json {
        print_json(&records)?;
    } else {
        let fqn = ctx.engine.models().build_fully_qualified_name(model);
        output::print_records(&format!("model '{}'", fqn), &records);
    }
    Ok(Outcome::Success)
}
