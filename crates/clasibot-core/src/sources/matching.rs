//! Fuzzy matching against a company's classification history

use async_trait::async_trait;
use chrono::{Months, NaiveDate, Utc};
use tracing::debug;

use crate::db::Database;
use crate::error::Result;
use crate::models::{
    normalize_name, Category, ClassifiedBy, ClassifiedHistoryEntry, TransactionDescriptor,
    MAX_POSSIBLE_CATEGORIES,
};

use super::{find_valid, CandidateSource};

/// Shortest name allowed to count as contained in another
const MIN_CONTAINED_LEN: usize = 4;

/// First day of the matching window, `years` years before today
pub fn history_since(years: u32) -> NaiveDate {
    Utc::now()
        .date_naive()
        .checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}

/// Matches transaction names against previously confirmed ones
///
/// Similarity is Jaro-Winkler over normalized names. One name containing the
/// other counts as a perfect match. Hits at or above the threshold are ranked
/// by similarity, then by how close the past amount is to this one.
pub struct MatchingSource {
    vocabulary: Vec<(String, ClassifiedHistoryEntry)>,
    threshold: f64,
}

impl MatchingSource {
    pub fn new(history: Vec<ClassifiedHistoryEntry>, threshold: f64) -> Self {
        let vocabulary = history
            .into_iter()
            .map(|entry| (normalize_name(&entry.name), entry))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        Self {
            vocabulary,
            threshold,
        }
    }

    /// Load a company's locally confirmed history from the last `years` years
    pub fn load(db: &Database, company_id: &str, years: u32, threshold: f64) -> Result<Self> {
        let since = history_since(years);
        let history = db.list_classified_history(company_id, since)?;
        debug!(company_id = %company_id, entries = history.len(), "Loaded matching vocabulary");
        Ok(Self::new(history, threshold))
    }

    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    fn similarity(a: &str, b: &str) -> f64 {
        let shorter = a.len().min(b.len());
        if shorter >= MIN_CONTAINED_LEN && (a.contains(b) || b.contains(a)) {
            return 1.0;
        }
        strsim::jaro_winkler(a, b)
    }
}

#[async_trait]
impl CandidateSource for MatchingSource {
    fn kind(&self) -> ClassifiedBy {
        ClassifiedBy::Matching
    }

    async fn query(
        &self,
        transaction: &TransactionDescriptor,
        valid: &[Category],
    ) -> Result<Vec<Category>> {
        let name = transaction.normalized_name();
        if name.is_empty() {
            return Ok(Vec::new());
        }
        let amount = transaction.amount.abs();

        let mut hits: Vec<(f64, f64, &ClassifiedHistoryEntry)> = self
            .vocabulary
            .iter()
            .filter_map(|(known, entry)| {
                let score = Self::similarity(&name, known);
                (score >= self.threshold).then(|| (score, (entry.amount.abs() - amount).abs(), entry))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        });

        let mut result: Vec<Category> = Vec::new();
        for (_, _, entry) in hits {
            if let Some(category) = find_valid(valid, &entry.category) {
                if !result.iter().any(|c| c.id == category.id) {
                    result.push(category.clone());
                }
            }
            if result.len() >= MAX_POSSIBLE_CATEGORIES {
                break;
            }
        }

        debug!(
            transaction = %transaction.transaction_id,
            candidates = result.len(),
            "Matching lookup"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, amount: f64, category: &str) -> ClassifiedHistoryEntry {
        ClassifiedHistoryEntry {
            company_id: "c1".into(),
            name: name.into(),
            amount,
            category: category.into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        }
    }

    fn valid() -> Vec<Category> {
        vec![
            Category::new("10", "Meals"),
            Category::new("11", "Travel"),
            Category::new("12", "Software"),
        ]
    }

    #[tokio::test]
    async fn test_exact_history_match() {
        let source = MatchingSource::new(vec![entry("Uber Eats", -25.0, "Meals")], 0.85);
        let txn = TransactionDescriptor::new("t1", "UBER EATS", -31.0);
        let found = source.query(&txn, &valid()).await.unwrap();
        assert_eq!(found, vec![Category::new("10", "Meals")]);
    }

    #[tokio::test]
    async fn test_containment_counts_as_match() {
        let source = MatchingSource::new(vec![entry("Uber Eats", -25.0, "Meals")], 0.85);
        let txn = TransactionDescriptor::new("t1", "UBER EATS TORONTO ON 4412", -31.0);
        let found = source.query(&txn, &valid()).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_below_threshold() {
        let source = MatchingSource::new(vec![entry("Shell Canada", -60.0, "Travel")], 0.85);
        let txn = TransactionDescriptor::new("t1", "Adobe Creative Cloud", -80.0);
        assert!(source.query(&txn, &valid()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ranked_by_amount_closeness() {
        let source = MatchingSource::new(
            vec![
                entry("Amazon", -500.0, "Software"),
                entry("Amazon", -20.0, "Meals"),
            ],
            0.85,
        );
        let txn = TransactionDescriptor::new("t1", "Amazon", -22.0);
        let found = source.query(&txn, &valid()).await.unwrap();
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Meals", "Software"]);
    }

    #[tokio::test]
    async fn test_filters_invalid_and_dedupes() {
        let source = MatchingSource::new(
            vec![
                entry("Uber Eats", -25.0, "Meals"),
                entry("Uber Eats", -26.0, "meals"),
                entry("Uber Eats", -27.0, "Old Category"),
            ],
            0.85,
        );
        let txn = TransactionDescriptor::new("t1", "Uber Eats", -25.0);
        let found = source.query(&txn, &valid()).await.unwrap();
        assert_eq!(found, vec![Category::new("10", "Meals")]);
    }

    #[test]
    fn test_short_names_need_real_similarity() {
        assert!(MatchingSource::similarity("abc", "abc corp") < 1.0);
        assert_eq!(MatchingSource::similarity("uber", "uber eats"), 1.0);
    }

    #[test]
    fn test_load_window() {
        let db = Database::in_memory().unwrap();
        let today = Utc::now().date_naive();
        db.add_classified_history(&ClassifiedHistoryEntry {
            date: today,
            ..entry("Uber Eats", -25.0, "Meals")
        })
        .unwrap();
        db.add_classified_history(&ClassifiedHistoryEntry {
            date: today - chrono::Duration::days(365 * 7),
            ..entry("Old Diner", -25.0, "Meals")
        })
        .unwrap();

        let source = MatchingSource::load(&db, "c1", 5, 0.85).unwrap();
        assert_eq!(source.len(), 1);
    }
}
