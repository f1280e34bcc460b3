//! Classification resolver
//!
//! Runs the candidate sources as a cascade, cheapest and most trusted first:
//!
//! 1. Matching: the company's own history. Any hit wins outright.
//! 2. Database: frequency of confirmed categories across companies.
//! 3. LLM: a single category guessed by the language model.
//!
//! A source that errors or times out counts as having no candidates. The
//! resolver holds no mutable state, so resolving the same input twice gives
//! the same categories.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{CategorizedResult, Category, ClassifiedBy, TransactionDescriptor};
use crate::sources::CandidateSource;

/// Cascade over up to three candidate sources
pub struct Resolver {
    matching: Option<Box<dyn CandidateSource>>,
    database: Option<Box<dyn CandidateSource>>,
    llm: Option<Box<dyn CandidateSource>>,
    timeout: Duration,
}

impl Resolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            matching: None,
            database: None,
            llm: None,
            timeout,
        }
    }

    pub fn with_matching(mut self, source: impl CandidateSource + 'static) -> Self {
        self.matching = Some(Box::new(source));
        self
    }

    pub fn with_database(mut self, source: impl CandidateSource + 'static) -> Self {
        self.database = Some(Box::new(source));
        self
    }

    pub fn with_llm(mut self, source: impl CandidateSource + 'static) -> Self {
        self.llm = Some(Box::new(source));
        self
    }

    /// Resolve one transaction
    pub async fn resolve(
        &self,
        transaction: &TransactionDescriptor,
        valid: &[Category],
    ) -> CategorizedResult {
        if let Some(result) = self.resolve_local(transaction, valid).await {
            return result;
        }

        let categories = match &self.llm {
            Some(llm) => {
                self.bounded(llm.kind(), &transaction.transaction_id, llm.query(transaction, valid))
                    .await
            }
            None => Vec::new(),
        };
        self.finish(transaction, categories)
    }

    /// Resolve many transactions, preserving input order
    ///
    /// The Matching and Database tiers run concurrently per transaction. When
    /// more than one transaction falls through to the LLM tier they are sent
    /// in one batched request.
    pub async fn resolve_batch(
        &self,
        transactions: &[TransactionDescriptor],
        valid: &[Category],
    ) -> Vec<CategorizedResult> {
        let local = join_all(transactions.iter().map(|t| self.resolve_local(t, valid))).await;

        let pending: Vec<usize> = local
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_none())
            .map(|(i, _)| i)
            .collect();

        let mut llm_results: HashMap<usize, Vec<Category>> = HashMap::new();
        if let (Some(llm), false) = (&self.llm, pending.is_empty()) {
            if pending.len() == 1 {
                let t = &transactions[pending[0]];
                let found = self
                    .bounded(llm.kind(), &t.transaction_id, llm.query(t, valid))
                    .await;
                llm_results.insert(pending[0], found);
            } else {
                let batch: Vec<TransactionDescriptor> =
                    pending.iter().map(|&i| transactions[i].clone()).collect();
                let label = format!("batch of {}", batch.len());
                let found = self
                    .bounded_batch(llm.kind(), &label, llm.query_batch(&batch, valid))
                    .await;
                for (slot, categories) in pending.iter().zip(found) {
                    llm_results.insert(*slot, categories);
                }
            }
        }

        local
            .into_iter()
            .zip(transactions)
            .enumerate()
            .map(|(i, (result, t))| match result {
                Some(result) => result,
                None => self.finish(t, llm_results.remove(&i).unwrap_or_default()),
            })
            .collect()
    }

    /// Tiers 1 and 2; `None` means fall through to the LLM
    async fn resolve_local(
        &self,
        transaction: &TransactionDescriptor,
        valid: &[Category],
    ) -> Option<CategorizedResult> {
        for source in [&self.matching, &self.database].into_iter().flatten() {
            let found = self
                .bounded(source.kind(), &transaction.transaction_id, source.query(transaction, valid))
                .await;
            if !found.is_empty() {
                debug!(
                    transaction = %transaction.transaction_id,
                    source = %source.kind(),
                    candidates = found.len(),
                    "Resolved"
                );
                return Some(CategorizedResult::new(
                    transaction.transaction_id.clone(),
                    found,
                    source.kind(),
                ));
            }
        }
        None
    }

    fn finish(&self, transaction: &TransactionDescriptor, categories: Vec<Category>) -> CategorizedResult {
        if categories.is_empty() {
            debug!(transaction = %transaction.transaction_id, "No candidates from any source");
            return CategorizedResult::unresolved(transaction.transaction_id.clone());
        }
        CategorizedResult::new(
            transaction.transaction_id.clone(),
            categories.into_iter().take(1).collect(),
            ClassifiedBy::Llm,
        )
    }

    async fn bounded<F>(&self, kind: ClassifiedBy, label: &str, call: F) -> Vec<Category>
    where
        F: Future<Output = Result<Vec<Category>>>,
    {
        match with_timeout(self.timeout, kind, call).await {
            Ok(found) => found,
            Err(e) => {
                warn!(source = %kind, transaction = %label, error = %e, "Source unavailable");
                Vec::new()
            }
        }
    }

    async fn bounded_batch<F>(&self, kind: ClassifiedBy, label: &str, call: F) -> Vec<Vec<Category>>
    where
        F: Future<Output = Result<Vec<Vec<Category>>>>,
    {
        match with_timeout(self.timeout, kind, call).await {
            Ok(found) => found,
            Err(e) => {
                warn!(source = %kind, transactions = %label, error = %e, "Source unavailable");
                Vec::new()
            }
        }
    }
}

async fn with_timeout<T, F>(timeout: Duration, kind: ClassifiedBy, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Error::SourceUnavailable(format!("{}: {}", kind, e))),
        Err(_) => Err(Error::SourceUnavailable(format!(
            "{} timed out after {}s",
            kind,
            timeout.as_secs()
        ))),
    }
}

/// Merge results that share a transaction id
///
/// Applies [`CategorizedResult::merge`] per id; output follows the order in
/// which ids first appear.
pub fn merge_results(results: impl IntoIterator<Item = CategorizedResult>) -> Vec<CategorizedResult> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, CategorizedResult> = HashMap::new();

    for result in results {
        match merged.remove(&result.transaction_id) {
            Some(existing) => {
                let id = result.transaction_id.clone();
                merged.insert(id, existing.merge(result));
            }
            None => {
                order.push(result.transaction_id.clone());
                merged.insert(result.transaction_id.clone(), result);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::db::Database;
    use crate::models::ClassifiedHistoryEntry;
    use crate::sources::{DatabaseSource, LlmSource, MatchingSource};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, NaiveDate};

    fn valid() -> Vec<Category> {
        vec![
            Category::new("1", "Meals"),
            Category::new("2", "Travel"),
            Category::new("3", "Software"),
            Category::new("4", "Office Supplies"),
        ]
    }

    fn history(name: &str, category: &str) -> ClassifiedHistoryEntry {
        ClassifiedHistoryEntry {
            company_id: "c1".into(),
            name: name.into(),
            amount: -20.0,
            category: category.into(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        }
    }

    fn acme_db() -> Database {
        let db = Database::in_memory().unwrap();
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

    fn resolver(mock: MockBackend) -> Resolver {
        Resolver::new(std::time::Duration::from_secs(5))
            .with_matching(MatchingSource::new(vec![history("Uber Eats", "Meals")], 0.85))
            .with_database(DatabaseSource::new(acme_db(), 3))
            .with_llm(LlmSource::new(mock.into()))
    }

    /// Source that never answers in time
    struct Stalled;

    #[async_trait]
    impl CandidateSource for Stalled {
        fn kind(&self) -> ClassifiedBy {
            ClassifiedBy::Matching
        }

        async fn query(
            &self,
            _transaction: &TransactionDescriptor,
            _valid: &[Category],
        ) -> Result<Vec<Category>> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(vec![Category::new("1", "Meals")])
        }
    }

    #[tokio::test]
    async fn test_matching_wins() {
        // the LLM would say Travel, but matching short-circuits
        let mock = MockBackend::new().with_response("uber", "Travel");
        let r = resolver(mock.clone());
        let txn = TransactionDescriptor::new("t1", "Uber Eats", -18.0);

        let result = r.resolve(&txn, &valid()).await;
        assert_eq!(result.classified_by, ClassifiedBy::Matching);
        assert_eq!(result.possible_categories, vec![Category::new("1", "Meals")]);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_database_tier() {
        let r = resolver(MockBackend::new());
        let txn = TransactionDescriptor::new("t2", "Acme Office Supplies", -45.0);

        let result = r.resolve(&txn, &valid()).await;
        assert_eq!(result.classified_by, ClassifiedBy::Database);
        let names: Vec<&str> = result
            .possible_categories
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Office Supplies", "Software"]);
    }

    #[tokio::test]
    async fn test_llm_tier() {
        let r = resolver(MockBackend::new().with_response("air canada", "Travel"));
        let txn = TransactionDescriptor::new("t3", "AIR CANADA 0142", -412.0);

        let result = r.resolve(&txn, &valid()).await;
        assert_eq!(result.classified_by, ClassifiedBy::Llm);
        assert_eq!(result.possible_categories, vec![Category::new("2", "Travel")]);
    }

    #[tokio::test]
    async fn test_unresolved_and_failing_llm() {
        let r = resolver(MockBackend::failing());
        let txn = TransactionDescriptor::new("t4", "Mystery Vendor", -3.0);

        let result = r.resolve(&txn, &valid()).await;
        assert!(!result.is_resolved());
        assert_eq!(result.classified_by, ClassifiedBy::Llm);
    }

    #[tokio::test]
    async fn test_timeout_falls_through() {
        let r = Resolver::new(std::time::Duration::from_millis(50))
            .with_matching(Stalled)
            .with_database(DatabaseSource::new(acme_db(), 3));
        let txn = TransactionDescriptor::new("t5", "Acme Office Supplies", -45.0);

        let result = r.resolve(&txn, &valid()).await;
        assert_eq!(result.classified_by, ClassifiedBy::Database);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_batches_llm() {
        let mock = MockBackend::new()
            .with_response("air canada", "Travel")
            .with_response("adobe", "Software");
        let r = resolver(mock.clone());

        let txns = vec![
            TransactionDescriptor::new("a", "AIR CANADA", -400.0),
            TransactionDescriptor::new("b", "Uber Eats", -15.0),
            TransactionDescriptor::new("c", "Acme Office Supplies", -45.0),
            TransactionDescriptor::new("d", "ADOBE *CREATIVE CLD", -79.0),
            TransactionDescriptor::new("e", "Mystery", -1.0),
        ];
        let results = r.resolve_batch(&txns, &valid()).await;

        let ids: Vec<&str> = results.iter().map(|r| r.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        let tags: Vec<ClassifiedBy> = results.iter().map(|r| r.classified_by).collect();
        assert_eq!(
            tags,
            vec![
                ClassifiedBy::Llm,
                ClassifiedBy::Matching,
                ClassifiedBy::Database,
                ClassifiedBy::Llm,
                ClassifiedBy::Llm,
            ]
        );
        assert_eq!(results[3].top().map(|c| c.name.as_str()), Some("Software"));
        assert!(!results[4].is_resolved());
        assert_eq!(mock.batch_calls(), 1);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_matches_single_resolution() {
        let r = resolver(MockBackend::new().with_response("air canada", "Travel"));
        let txns = vec![
            TransactionDescriptor::new("b", "Uber Eats", -15.0),
            TransactionDescriptor::new("c", "Acme Office Supplies", -45.0),
        ];
        let batch = r.resolve_batch(&txns, &valid()).await;
        for (txn, batched) in txns.iter().zip(&batch) {
            let single = r.resolve(txn, &valid()).await;
            assert_eq!(single.possible_categories, batched.possible_categories);
            assert_eq!(single.classified_by, batched.classified_by);
        }
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let r = resolver(MockBackend::new().with_response("air canada", "Travel"));
        let txn = TransactionDescriptor::new("t1", "AIR CANADA", -400.0);
        let first = r.resolve(&txn, &valid()).await;
        let second = r.resolve(&txn, &valid()).await;
        assert_eq!(first, second);
    }

    #[test]
    fn test_merge_results_per_transaction() {
        let llm = CategorizedResult::new("t1", vec![Category::new("2", "Travel")], ClassifiedBy::Llm);
        let mut matching =
            CategorizedResult::new("t1", vec![Category::new("1", "Meals")], ClassifiedBy::Matching);
        // older, but higher confidence
        matching.computed_at = llm.computed_at - ChronoDuration::hours(1);
        let other = CategorizedResult::new("t2", vec![Category::new("3", "Software")], ClassifiedBy::Database);

        let merged = merge_results(vec![llm, other, matching]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].transaction_id, "t1");
        assert_eq!(merged[0].classified_by, ClassifiedBy::Matching);
        assert_eq!(merged[1].transaction_id, "t2");
    }

    #[test]
    fn test_merge_prefers_newer_on_equal_confidence() {
        let mut old = CategorizedResult::new("t1", vec![Category::new("1", "Meals")], ClassifiedBy::Database);
        let new = CategorizedResult::new("t1", vec![Category::new("2", "Travel")], ClassifiedBy::Database);
        old.computed_at = new.computed_at - ChronoDuration::minutes(5);

        let merged = merge_results(vec![new.clone(), old]);
        assert_eq!(merged[0].possible_categories, new.possible_categories);
    }
}
