//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Clasibot - Classify for-review bank transactions for bookkeeping firms
#[derive(Parser)]
#[command(name = "clasibot")]
#[command(about = "Scheduled transaction classification for accounting ledgers", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "clasibot.db", global = true)]
    pub db: PathBuf,

    /// Config file (defaults to ~/.config/clasibot/config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set CLASIBOT_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the web server (scheduler trigger, next review, job log)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Run one classification pass over every connected company
    Run {
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Preview the categories proposed for one transaction name (no write-back)
    Classify {
        /// Transaction name as it appears on the bank feed
        name: String,

        /// Company whose history feeds the matching tier
        #[arg(short, long)]
        company: String,

        /// Comma-separated list of valid category names
        #[arg(long, value_delimiter = ',', required = true)]
        categories: Vec<String>,

        /// Transaction amount (negative = expense)
        #[arg(short, long, default_value = "-1.0", allow_hyphen_values = true)]
        amount: f64,
    },

    /// Record a confirmed classification
    Confirm {
        /// Transaction name
        name: String,

        /// Confirmed category name
        category: String,

        /// Also add the confirmation to this company's matching history
        #[arg(short, long)]
        company: Option<String>,

        /// Transaction amount for the history entry
        #[arg(short, long, default_value = "0.0", allow_hyphen_values = true)]
        amount: f64,

        /// Transaction date for the history entry (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Manage the company registry
    Companies {
        #[command(subcommand)]
        action: Option<CompaniesAction>,
    },

    /// Show or set the next scheduled review
    NextReview {
        /// Set the next review to this many days from now
        #[arg(long)]
        set_days: Option<i64>,
    },

    /// Show job log outcomes
    Outcomes {
        /// Run ID (defaults to the latest run)
        #[arg(long, conflicts_with = "company")]
        run: Option<String>,

        /// Show recent outcomes for one company instead
        #[arg(long)]
        company: Option<String>,

        /// Maximum outcomes to show for a company
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum CompaniesAction {
    /// List registered companies
    List,

    /// Register or update a company
    Add {
        /// Ledger company ID
        company_id: String,

        /// Company name
        #[arg(short, long)]
        name: String,

        /// Bookkeeping firm the synthetic bookkeeper signs in through
        #[arg(short, long)]
        firm: Option<String>,

        /// Industry hint for the LLM tier
        #[arg(short, long)]
        industry: Option<String>,
    },

    /// Mark the synthetic bookkeeper as invited to a company
    Connect {
        /// Ledger company ID
        company_id: String,
    },

    /// Stop scheduled runs for a company
    Disconnect {
        /// Ledger company ID
        company_id: String,
    },
}
