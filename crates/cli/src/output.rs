//! Terminal rendering for plans, results and status

use console::style;
use smart_migrations::{
    DependencyReport, MigrationRecord, RollbackPlan, RollbackResult, RollbackSummary, TableStatus,
};

pub fn print_plan(plan: &RollbackPlan, dry_run: bool) {
    let heading = if dry_run { "Would roll back" } else { "Rolling back" };
    println!(
        "{} {} ({} migration{}, batch{} {})",
        style(heading).bold(),
        style(&plan.target).cyan(),
        plan.len(),
        if plan.len() == 1 { "" } else { "s" },
        if plan.batches.len() == 1 { "" } else { "es" },
        join_batches(&plan.batches)
    );
    for record in &plan.selection {
        println!("  {} {}", style("↩").dim(), record_line(record));
    }

    let warnings = plan.warnings();
    if !warnings.is_empty() {
        println!();
        for warning in warnings {
            println!("{} {}", style("⚠").yellow(), warning);
        }
    }
}

pub fn print_results(results: &[RollbackResult]) {
    for result in results {
        if result.success {
            println!("{} {}", style("✓").green(), result.identifier);
        } else {
            println!(
                "{} {} [{}] {}",
                style("✗").red(),
                result.identifier,
                result.status,
                style(result.error.as_deref().unwrap_or_default()).dim()
            );
        }
    }

    let summary = RollbackSummary::from_results(results);
    println!();
    if summary.all_succeeded() {
        println!("{} Rolled back {} migration(s)", style("✓").green().bold(), summary.succeeded);
    } else {
        println!(
            "{} {} succeeded, {} failed, {} ledger record(s) removed",
            style("!").yellow().bold(),
            summary.succeeded,
            summary.failed,
            summary.ledger_removed
        );
    }
}

pub fn print_records(title: &str, records: &[MigrationRecord]) {
    if records.is_empty() {
        println!("No migrations found for {}", title);
        return;
    }
    println!("{} {}", style("Migrations for").bold(), style(title).cyan());
    for record in records {
        println!("  {}", record_line(record));
    }
}

pub fn print_status(status: &TableStatus) {
    println!("{} {}", style("Table").bold(), style(&status.table).cyan());
    println!("  migrations:   {}", status.count);
    println!("  batches:      {}", join_batches(&status.batches));
    println!("  latest batch: {}", status.latest_batch);
}

pub fn print_dependencies(report: &DependencyReport) {
    println!("{} {}", style("Foreign keys for").bold(), style(&report.table).cyan());
    if report.is_empty() {
        println!("  none found");
        return;
    }
    for edge in &report.outgoing {
        println!("  {} {}", style("→").dim(), edge);
    }
    for edge in &report.incoming {
        println!("  {} {}", style("←").yellow(), edge);
    }
}

fn record_line(record: &MigrationRecord) -> String {
    format!("{} {}", style(format!("[{}]", record.batch)).dim(), record.identifier)
}

fn join_batches(batches: &[i64]) -> String {
    if batches.is_empty() {
        return "-".to_string();
    }
    batches.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
}
