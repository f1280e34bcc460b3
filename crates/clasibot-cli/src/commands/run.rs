//! Classification run and job log commands

use std::sync::Arc;

use anyhow::{Context, Result};
use clasibot_core::config::Config;
use clasibot_core::db::Database;
use clasibot_core::orchestrator::Orchestrator;
use clasibot_core::{CompanyOutcome, JobStatus, RunSummary};

use super::truncate;

pub async fn cmd_run(db: &Database, config: Config, json: bool) -> Result<()> {
    let orchestrator = Orchestrator::from_config(db.clone(), config)
        .context("Cannot start a run without ledger and session endpoints")?;
    let orchestrator = Arc::new(orchestrator);

    if !json {
        println!("🔄 Running classification over connected companies...");
    }
    let summary = orchestrator.run().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("📊 Run {}", summary.run_id);
    println!("   ─────────────────────────────");
    println!("   Companies: {}", summary.outcomes.len());
    println!("   ✅ Success: {}", summary.count(JobStatus::Success));
    println!(
        "   ⚠️  Partial failure: {}",
        summary.count(JobStatus::PartialFailure)
    );
    println!("   ❌ Failed: {}", summary.count(JobStatus::Failed));
    println!(
        "   Next review: {}",
        summary.next_review.format("%Y-%m-%d %H:%M UTC")
    );

    if !summary.outcomes.is_empty() {
        println!();
        print_outcomes(&summary.outcomes);
    }
}

pub fn cmd_outcomes(
    db: &Database,
    run_id: Option<&str>,
    company_id: Option<&str>,
    limit: i64,
) -> Result<()> {
    let outcomes = match (run_id, company_id) {
        (_, Some(company)) => db.list_company_outcomes(company, limit)?,
        (Some(run), None) => db.list_run_outcomes(run)?,
        (None, None) => match db.latest_run_id()? {
            Some(run) => {
                println!("Latest run: {}", run);
                db.list_run_outcomes(&run)?
            }
            None => {
                println!("No runs recorded yet. Start one with: clasibot run");
                return Ok(());
            }
        },
    };

    if outcomes.is_empty() {
        println!("No outcomes found.");
        return Ok(());
    }

    print_outcomes(&outcomes);
    Ok(())
}

fn print_outcomes(outcomes: &[CompanyOutcome]) {
    println!(
        "{:<20} {:<16} {:>7} {:>10}  {}",
        "Company", "Status", "Chunks", "Classified", "Message"
    );
    println!("{}", "─".repeat(80));
    for outcome in outcomes {
        println!(
            "{:<20} {:<16} {:>3}/{:<3} {:>10}  {}",
            truncate(&outcome.company_id, 20),
            outcome.status.as_str(),
            outcome.completed_chunks,
            outcome.max_chunks,
            outcome.classified,
            truncate(&outcome.message, 40),
        );
        if outcome.status == JobStatus::Failed && !outcome.detail.is_empty() {
            println!("{:<20} {}", "", truncate(&outcome.detail, 58));
        }
    }
}
