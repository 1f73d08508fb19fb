use smart_migrations::TableStatus;

use super::{print_json, Context, Outcome};
use crate::output;

pub async fn table(ctx: &Context, table: &str) -> anyhow::Result<Outcome> {
    let status = ctx.engine.status_for_table(table).await?;
    show(ctx, &status)
}

pub async fn model(ctx: &Context, model: &str) -> anyhow::Result<Outcome> {
    let status = ctx.engine.status_for_model(model).await?;
    show(ctx, &status)
}

fn show(ctx: &Context, status: &TableStatus) -> anyhow::Result<Outcome> {
    if ctx.json {
        print_json(status)?;
    } else {
        output::print_status(status);
    }
    Ok(Outcome::Success)
}
