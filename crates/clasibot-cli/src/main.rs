//! Clasibot CLI - Scheduled transaction classification
//!
//! Usage:
//!   clasibot init                          Initialize database
//!   clasibot companies add ID --name NAME  Register a company
//!   clasibot run                           Classify every connected company once
//!   clasibot serve --port 3000             Start the trigger / job log server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Serve { port, host } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_serve(&cli.db, &host, port, cli.no_encrypt, config).await
        }
        Commands::Run { json } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_run(&db, config, json).await
        }
        Commands::Classify {
            name,
            company,
            categories,
            amount,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_classify(&db, &config, &company, &name, amount, &categories).await
        }
        Commands::Confirm {
            name,
            category,
            company,
            amount,
            date,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_confirm(
                &db,
                &name,
                &category,
                company.as_deref(),
                amount,
                date.as_deref(),
            )
        }
        Commands::Companies { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(CompaniesAction::List) => commands::cmd_companies_list(&db),
                Some(CompaniesAction::Add {
                    company_id,
                    name,
                    firm,
                    industry,
                }) => commands::cmd_companies_add(
                    &db,
                    &company_id,
                    &name,
                    firm.as_deref(),
                    industry.as_deref(),
                ),
                Some(CompaniesAction::Connect { company_id }) => {
                    commands::cmd_companies_connect(&db, &company_id, true)
                }
                Some(CompaniesAction::Disconnect { company_id }) => {
                    commands::cmd_companies_connect(&db, &company_id, false)
                }
            }
        }
        Commands::NextReview { set_days } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_next_review(&db, config.orchestrator.review_interval_days, set_days)
        }
        Commands::Outcomes {
            run,
            company,
            limit,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_outcomes(&db, run.as_deref(), company.as_deref(), limit)
        }
    }
}
