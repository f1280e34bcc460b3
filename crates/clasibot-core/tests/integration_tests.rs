//! Integration tests for clasibot-core
//!
//! These tests exercise the full confirm → schedule → classify → write back
//! workflow against an in-memory ledger.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clasibot_core::{
    merge_results, AIClient, Category, ClassifiedBy, ClassifiedHistoryEntry, CompanyInfo,
    CompanyLocation, Config, Database, DatabaseSource, InMemoryLedger, JobStatus, LedgerAccount,
    LedgerFixture, MatchingSource, MockBackend, NewCompany, Orchestrator,
    RawForReviewTransaction, Resolver, SessionManager, StaticSessionProvider, TaxCode,
    TransactionDescriptor,
};

fn categories() -> Vec<Category> {
    vec![
        Category::new("10", "Meals"),
        Category::new("11", "Travel"),
        Category::new("12", "Software"),
        Category::new("13", "Office Supplies"),
    ]
}

fn pending(id: &str, name: &str, amount: f64) -> RawForReviewTransaction {
    RawForReviewTransaction {
        id: id.into(),
        olb_txn_id: format!("olb-{}", id),
        account_id: "35".into(),
        description: name.into(),
        orig_description: name.into(),
        amount,
        olb_txn_date: "2024-06-03T00:00:00".into(),
        accept_type: "ADD".into(),
        add_as_txn: None,
        tax_rates: vec!["GST Purchase".into()],
    }
}

/// Company with history, shared records and a BC ledger
fn seeded_database() -> Database {
    let db = Database::in_memory().expect("Failed to create test database");

    db.upsert_company(&NewCompany {
        company_id: "maple".into(),
        name: "Maple Bakery".into(),
        firm_name: Some("North Books".into()),
        industry: Some("Bakeries".into()),
        bookkeeper_connected: true,
    })
    .unwrap();

    db.add_classified_history(&ClassifiedHistoryEntry {
        company_id: "maple".into(),
        name: "Figma Inc".into(),
        amount: -15.0,
        category: "Software".into(),
        date: Utc::now().date_naive(),
    })
    .unwrap();

    for _ in 0..12 {
        db.record_confirmed_classification("Acme Office Supplies", "Office Supplies")
            .unwrap();
    }
    for _ in 0..2 {
        db.record_confirmed_classification("Acme Office Supplies", "Software")
            .unwrap();
    }

    db
}

fn maple_ledger() -> InMemoryLedger {
    let info = CompanyInfo {
        name: "Maple Bakery".into(),
        industry: Some("Bakeries".into()),
        location: CompanyLocation {
            country: "CA".into(),
            sub_location: Some("BC".into()),
        },
    };
    InMemoryLedger::new().with_company(
        "maple",
        LedgerFixture::new(info)
            .with_categories(categories())
            .with_tax_codes(vec![
                TaxCode::new("1", "GST", &["GST Purchase"]),
                TaxCode::new("2", "GST/PST BC", &["GST Purchase", "PST (BC) Purchase"]),
                TaxCode::new("3", "HST ON", &["HST (ON) Purchase"]),
            ])
            .with_account(
                LedgerAccount::new("35", "Chequing"),
                vec![
                    pending("t1", "FIGMA INC", -15.0),
                    pending("t2", "ACME OFFICE SUPPLIES", -80.0),
                    pending("t3", "UBER EATS", -22.0),
                    pending("t4", "MYSTERY VENDOR", -9.0),
                    pending("t5", "E-TRANSFER DEPOSIT", 500.0),
                ],
            ),
    )
}

fn orchestrator(db: Database, ledger: InMemoryLedger) -> Arc<Orchestrator> {
    let sessions = SessionManager::new(
        Arc::new(StaticSessionProvider::new()),
        Duration::from_secs(5),
    );
    let ai: AIClient = MockBackend::new().with_response("uber", "Meals").into();
    let mut config = Config::default();
    config.orchestrator.chunk_size = 2;
    Arc::new(Orchestrator::new(db, Arc::new(ledger), sessions, config).with_ai(ai))
}

// =============================================================================
// Scheduled Run
// =============================================================================

#[tokio::test]
async fn test_full_classification_run() {
    let db = seeded_database();
    let ledger = maple_ledger();
    let orch = orchestrator(db.clone(), ledger.clone());

    let summary = orch.run().await;
    assert_eq!(summary.outcomes.len(), 1);

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status, JobStatus::Success);
    // four expenses in chunks of two; the deposit is ignored
    assert_eq!(outcome.max_chunks, 2);
    assert_eq!(outcome.completed_chunks, 2);
    // the mystery vendor has no category and is left for review
    assert_eq!(outcome.classified, 3);

    let written = ledger.written("maple");
    let by_id = |id: &str| written.iter().find(|w| w.transaction.id == id).unwrap();

    let figma = by_id("t1");
    assert_eq!(figma.result.classified_by, ClassifiedBy::Matching);
    assert_eq!(figma.category().unwrap().name, "Software");

    let acme = by_id("t2");
    assert_eq!(acme.result.classified_by, ClassifiedBy::Database);
    let names: Vec<&str> = acme
        .result
        .possible_categories
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["Office Supplies", "Software"]);

    let uber = by_id("t3");
    assert_eq!(uber.result.classified_by, ClassifiedBy::Llm);
    assert_eq!(uber.category().unwrap().name, "Meals");

    // GST Purchase is only in GST and GST/PST BC; the smaller bundle wins
    assert_eq!(uber.tax_code.as_ref().unwrap().name, "GST");
    assert!(written.iter().all(|w| w.transaction.id != "t4" && w.transaction.id != "t5"));

    // job log and next review
    let logged = db.list_run_outcomes(&summary.run_id).unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].status, JobStatus::Success);
    assert_eq!(db.latest_run_id().unwrap(), Some(summary.run_id.clone()));
    assert!(db.get_next_review().unwrap().is_some());
    assert!(!db.get_company("maple").unwrap().unwrap().classification_failed);
}

#[tokio::test]
async fn test_second_run_only_sees_leftovers() {
    let db = seeded_database();
    let ledger = maple_ledger();
    let orch = orchestrator(db, ledger.clone());

    orch.run().await;
    let second = orch.run().await;

    let outcome = &second.outcomes[0];
    assert_eq!(outcome.status, JobStatus::Success);
    assert_eq!(outcome.max_chunks, 1);
    assert_eq!(outcome.classified, 0);
    assert_eq!(ledger.written("maple").len(), 3);
}

// =============================================================================
// Resolver
// =============================================================================

#[tokio::test]
async fn test_confirmation_feeds_the_database_tier() {
    let db = Database::in_memory().unwrap();
    let resolver = Resolver::new(Duration::from_secs(5))
        .with_matching(MatchingSource::new(Vec::new(), 0.85))
        .with_database(DatabaseSource::new(db.clone(), 3));
    let txn = TransactionDescriptor::new("t1", "Shell Canada #4412", -60.0);

    let before = resolver.resolve(&txn, &categories()).await;
    assert!(!before.is_resolved());

    db.record_confirmed_classification("SHELL CANADA #4412", "Travel")
        .unwrap();

    let after = resolver.resolve(&txn, &categories()).await;
    assert_eq!(after.classified_by, ClassifiedBy::Database);
    assert_eq!(after.top().unwrap().name, "Travel");

    let merged = merge_results(vec![before, after]);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].classified_by, ClassifiedBy::Database);
}
