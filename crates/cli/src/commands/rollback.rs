use anyhow::Context as _;
use console::style;
use inquire::Confirm;
use serde::Serialize;
use smart_migrations::{RollbackOptions, RollbackPlan, RollbackResult, RollbackSummary};

use super::{print_json, Context, Outcome};
use crate::output;
use crate::ConfirmArgs;

#[derive(Serialize)]
struct RollbackReport<'a> {
    plan: &'a RollbackPlan,
    dry_run: bool,
    results: Vec<RollbackResult>,
    summary: Option<RollbackSummary>,
}

pub async fn table(
    ctx: &Context,
    table: &str,
    options: &RollbackOptions,
    confirm: &ConfirmArgs,
) -> anyhow::Result<Outcome> {
    let plan = ctx.engine.plan_table_rollback(table, options).await?;
    execute(ctx, plan, confirm).await
}

pub async fn model(
    ctx: &Context,
    model: &str,
    options: &RollbackOptions,
    confirm: &ConfirmArgs,
) -> anyhow::Result<Outcome> {
    let plan = ctx.engine.plan_model_rollback(model, options).await?;
    execute(ctx, plan, confirm).await
}

pub async fn batch(
    ctx: &Context,
    batch: i64,
    options: &RollbackOptions,
    confirm: &ConfirmArgs,
) -> anyhow::Result<Outcome> {
    let plan = ctx.engine.plan_batch_rollback(batch, options).await?;
    execute(ctx, plan, confirm).await
}

pub async fn migration(
    ctx: &Context,
    identifier: &str,
    confirm: &ConfirmArgs,
) -> anyhow::Result<Outcome> {
    let plan = ctx.engine.plan_migration_rollback(identifier).await?;
    execute(ctx, plan, confirm).await
}

async fn execute(
    ctx: &Context,
    plan: RollbackPlan,
    confirm: &ConfirmArgs,
) -> anyhow::Result<Outcome> {
    if confirm.dry_run {
        if ctx.json {
            print_json(&RollbackReport {
                plan: &plan,
                dry_run: true,
                results: Vec::new(),
                summary: None,
            })?;
        } else {
            output::print_plan(&plan, true);
        }
        return Ok(Outcome::Success);
    }

    if !ctx.json {
        output::print_plan(&plan, false);
    }

    if !confirm.yes && !confirmed(&plan)? {
        if !ctx.json {
            println!("{} Rollback cancelled.", style("✗").red());
        }
        return Ok(Outcome::Cancelled);
    }

    let results = ctx.engine.execute_plan(&plan).await?;
    let summary = RollbackSummary::from_results(&results);

    if ctx.json {
        print_json(&RollbackReport {
            plan: &plan,
            dry_run: false,
            results,
            summary: Some(summary),
        })?;
    } else {
        println!();
        output::print_results(&results);
    }

    Ok(if summary.all_succeeded() {
        Outcome::Success
    } else {
        Outcome::PartialFailure
    })
}

fn confirmed(plan: &RollbackPlan) -> anyhow::Result<bool> {
    if !console::user_attended() {
        anyhow::bail!(
            "Refusing to roll back without confirmation; \
             pass --yes when not running interactively"
        );
    }

    let mut prompt = format!("Roll back {} migration(s) for {}?", plan.len(), plan.target);
    if !plan.warnings().is_empty() {
        prompt.push_str(" Other tables reference it.");
    }

    Confirm::new(&prompt)
        .with_default(false)
        .with_help_message("Each migration's down operation runs and its ledger record is removed")
        .prompt()
        .context("Failed to get confirmation")
}
