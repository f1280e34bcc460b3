//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use chrono::{NaiveDate, Utc};
use clap::Parser;
use clasibot_core::config::Config;
use clasibot_core::db::Database;
use clasibot_core::{ClassifiedBy, ClassifiedHistoryEntry, NewCompany};

use crate::cli::{Cli, CompaniesAction, Commands};
use crate::commands::{self, truncate};

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn register(db: &Database, company_id: &str) {
    db.upsert_company(&NewCompany {
        company_id: company_id.into(),
        name: format!("Company {}", company_id),
        ..Default::default()
    })
    .unwrap();
}

fn categories(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ========== Companies Command Tests ==========

#[test]
fn test_cmd_companies_list_empty() {
    let db = setup_test_db();
    assert!(commands::cmd_companies_list(&db).is_ok());
}

#[test]
fn test_cmd_companies_add() {
    let db = setup_test_db();
    commands::cmd_companies_add(&db, "123", "Maple Bakery", Some("Firm A"), Some("Bakeries"))
        .unwrap();

    let company = db.get_company("123").unwrap().unwrap();
    assert_eq!(company.name, "Maple Bakery");
    assert_eq!(company.firm_name.as_deref(), Some("Firm A"));
    assert_eq!(company.industry.as_deref(), Some("Bakeries"));
    assert!(!company.bookkeeper_connected);

    assert!(commands::cmd_companies_list(&db).is_ok());
}

#[test]
fn test_cmd_companies_add_keeps_connection() {
    let db = setup_test_db();
    commands::cmd_companies_add(&db, "123", "Maple Bakery", None, None).unwrap();
    commands::cmd_companies_connect(&db, "123", true).unwrap();

    commands::cmd_companies_add(&db, "123", "Maple Bakery Ltd", None, None).unwrap();

    let company = db.get_company("123").unwrap().unwrap();
    assert_eq!(company.name, "Maple Bakery Ltd");
    assert!(company.bookkeeper_connected);
}

#[test]
fn test_cmd_companies_connect_and_disconnect() {
    let db = setup_test_db();
    register(&db, "123");

    commands::cmd_companies_connect(&db, "123", true).unwrap();
    assert_eq!(db.list_connected_companies().unwrap().len(), 1);

    commands::cmd_companies_connect(&db, "123", false).unwrap();
    assert!(db.list_connected_companies().unwrap().is_empty());
}

#[test]
fn test_cmd_companies_connect_unknown() {
    let db = setup_test_db();
    let result = commands::cmd_companies_connect(&db, "missing", true);
    assert!(result.is_err());
}

// ========== Confirm Command Tests ==========

#[test]
fn test_cmd_confirm_increments_count() {
    let db = setup_test_db();
    commands::cmd_confirm(&db, "ACME SUPPLY", "Office Supplies", None, 0.0, None).unwrap();
    commands::cmd_confirm(&db, "Acme Supply", "Office Supplies", None, 0.0, None).unwrap();

    let record = db.get_classification_record("acme supply").unwrap().unwrap();
    let office = record
        .categories
        .iter()
        .find(|c| c.category == "Office Supplies")
        .unwrap();
    assert_eq!(office.count, 2);
}

#[test]
fn test_cmd_confirm_with_company_adds_history() {
    let db = setup_test_db();
    register(&db, "c1");
    commands::cmd_confirm(
        &db,
        "FIGMA",
        "Software",
        Some("c1"),
        -15.0,
        Some("2024-06-01"),
    )
    .unwrap();

    let since = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let history = db.list_classified_history("c1", since).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].category, "Software");
    assert_eq!(history[0].date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
}

#[test]
fn test_cmd_confirm_invalid_date() {
    let db = setup_test_db();
    let result = commands::cmd_confirm(&db, "FIGMA", "Software", Some("c1"), 0.0, Some("06/01/2024"));
    assert!(result.is_err());
    // Nothing was recorded
    assert!(db.get_classification_record("figma").unwrap().is_none());
}

// ========== Classify Command Tests ==========

#[tokio::test]
async fn test_classify_preview_uses_matching_history() {
    let db = setup_test_db();
    register(&db, "c1");
    db.add_classified_history(&ClassifiedHistoryEntry {
        company_id: "c1".into(),
        name: "FIGMA".into(),
        amount: -15.0,
        category: "Software".into(),
        date: Utc::now().date_naive(),
    })
    .unwrap();

    let result = commands::classify_preview(
        &db,
        &Config::default(),
        None,
        "c1",
        "FIGMA",
        -15.0,
        &categories(&["Meals", "Software"]),
    )
    .await
    .unwrap();

    assert_eq!(result.classified_by, ClassifiedBy::Matching);
    assert_eq!(result.possible_categories[0].name, "Software");
    let shown = result.classified_categories();
    assert_eq!(shown[0].category.name, "Software");
    assert_eq!(shown[0].classified_by, ClassifiedBy::Matching);
}

#[tokio::test]
async fn test_classify_preview_falls_back_to_database() {
    let db = setup_test_db();
    for _ in 0..3 {
        db.record_confirmed_classification("ACME SUPPLY", "Office Supplies")
            .unwrap();
    }

    let result = commands::classify_preview(
        &db,
        &Config::default(),
        None,
        "c1",
        "ACME SUPPLY",
        -40.0,
        &categories(&["Office Supplies", "Meals"]),
    )
    .await
    .unwrap();

    assert_eq!(result.classified_by, ClassifiedBy::Database);
    assert_eq!(result.possible_categories[0].name, "Office Supplies");
}

#[tokio::test]
async fn test_classify_preview_unknown_name_is_empty() {
    let db = setup_test_db();

    let result = commands::classify_preview(
        &db,
        &Config::default(),
        None,
        "c1",
        "SOMETHING NEW",
        -5.0,
        &categories(&["Meals"]),
    )
    .await
    .unwrap();

    assert!(result.possible_categories.is_empty());
}

#[tokio::test]
async fn test_classify_preview_requires_categories() {
    let db = setup_test_db();
    let result = commands::classify_preview(
        &db,
        &Config::default(),
        None,
        "c1",
        "FIGMA",
        -5.0,
        &categories(&[" ", ""]),
    )
    .await;
    assert!(result.is_err());
}

// ========== Next Review Command Tests ==========

#[test]
fn test_cmd_next_review_initializes_default() {
    let db = setup_test_db();
    assert!(db.get_next_review().unwrap().is_none());

    commands::cmd_next_review(&db, 7, None).unwrap();

    let stored = db.get_next_review().unwrap().unwrap();
    let days = (stored - Utc::now()).num_days();
    assert!((6..=7).contains(&days));
}

#[test]
fn test_cmd_next_review_set_days() {
    let db = setup_test_db();
    commands::cmd_next_review(&db, 7, Some(1)).unwrap();

    let stored = db.get_next_review().unwrap().unwrap();
    assert!((stored - Utc::now()).num_hours() <= 24);
}

#[test]
fn test_cmd_next_review_rejects_negative() {
    let db = setup_test_db();
    assert!(commands::cmd_next_review(&db, 7, Some(-1)).is_err());
    assert!(db.get_next_review().unwrap().is_none());
}

// ========== Run / Outcomes Command Tests ==========

#[tokio::test]
async fn test_cmd_run_without_endpoints_fails() {
    let db = setup_test_db();
    let result = commands::cmd_run(&db, Config::default(), false).await;
    assert!(result.is_err());
    assert!(db.latest_run_id().unwrap().is_none());
}

#[test]
fn test_cmd_outcomes_without_runs() {
    let db = setup_test_db();
    assert!(commands::cmd_outcomes(&db, None, None, 20).is_ok());
}

#[test]
fn test_cmd_outcomes_for_run_and_company() {
    use clasibot_core::{CompanyOutcome, JobStatus};

    let db = setup_test_db();
    db.record_company_outcome(&CompanyOutcome {
        run_id: "run-1".into(),
        company_id: "c1".into(),
        status: JobStatus::Failed,
        message: "Failed to complete auth process".into(),
        detail: "login refused".into(),
        completed_chunks: 0,
        max_chunks: 0,
        classified: 0,
        finished_at: Utc::now(),
    })
    .unwrap();

    assert!(commands::cmd_outcomes(&db, None, None, 20).is_ok());
    assert!(commands::cmd_outcomes(&db, Some("run-1"), None, 20).is_ok());
    assert!(commands::cmd_outcomes(&db, None, Some("c1"), 20).is_ok());
    assert!(commands::cmd_outcomes(&db, Some("missing"), None, 20).is_ok());
}

// ========== Init / Open Tests ==========

#[test]
fn test_cmd_init_unencrypted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clasibot.db");
    commands::cmd_init(&path, true).unwrap();
    assert!(path.exists());
}

#[test]
fn test_load_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[orchestrator]\nchunk_size = 10\n").unwrap();

    let config = commands::load_config(Some(&path)).unwrap();
    assert_eq!(config.orchestrator.chunk_size, 10);
}

#[test]
fn test_load_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.toml");
    assert!(commands::load_config(Some(&path)).is_err());
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_classify_args() {
    let cli = Cli::try_parse_from([
        "clasibot",
        "classify",
        "UBER EATS",
        "--company",
        "c1",
        "--categories",
        "Meals,Travel",
        "--amount",
        "-12.5",
    ])
    .unwrap();

    match cli.command {
        Commands::Classify {
            name,
            company,
            categories,
            amount,
        } => {
            assert_eq!(name, "UBER EATS");
            assert_eq!(company, "c1");
            assert_eq!(categories, vec!["Meals", "Travel"]);
            assert_eq!(amount, -12.5);
        }
        _ => panic!("expected classify"),
    }
}

#[test]
fn test_parse_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["clasibot", "companies", "list", "--no-encrypt", "--db", "x.db"])
        .unwrap();
    assert!(cli.no_encrypt);
    assert_eq!(cli.db.to_str(), Some("x.db"));
    assert!(matches!(
        cli.command,
        Commands::Companies {
            action: Some(CompaniesAction::List)
        }
    ));
}

#[test]
fn test_parse_outcomes_conflicting_filters() {
    let result = Cli::try_parse_from(["clasibot", "outcomes", "--run", "r1", "--company", "c1"]);
    assert!(result.is_err());
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a long company name", 10), "a long ...");
    assert_eq!(truncate("Café Crème Brûlée", 8), "Café ...");
}
