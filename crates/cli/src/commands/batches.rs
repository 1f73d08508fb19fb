use console::style;

use super::{print_json, Context, Outcome};

pub async fn run(ctx: &Context) -> anyhow::Result<Outcome> {
    let batches = ctx.engine.executed_batches().await?;
    if ctx.json {
        print_json(&batches)?;
        return Ok(Outcome::Success);
    }

    if batches.is_empty() {
        println!("No migrations have been executed");
    } else {
        println!("{}", style("Executed batches").bold());
        for batch in &batches {
            let records = ctx.engine.ledger().records_for_batch(*batch).await?;
            println!("  {} ({} migration(s))", style(batch).cyan(), records.len());
        }
    }
    Ok(Outcome::Success)
}
