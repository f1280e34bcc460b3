//! Frequency lookup of confirmed classifications

use async_trait::async_trait;
use tracing::debug;

use crate::db::Database;
use crate::error::Result;
use crate::models::{Category, ClassifiedBy, TransactionDescriptor};

use super::CandidateSource;

/// Looks up how often each category was confirmed for a transaction name
///
/// Returns the `limit` most frequent categories that are still valid.
#[derive(Clone)]
pub struct DatabaseSource {
    db: Database,
    limit: usize,
}

impl DatabaseSource {
    pub fn new(db: Database, limit: usize) -> Self {
        Self {
            db,
            limit: limit.max(1),
        }
    }
}

#[async_trait]
impl CandidateSource for DatabaseSource {
    fn kind(&self) -> ClassifiedBy {
        ClassifiedBy::Database
    }

    async fn query(
        &self,
        transaction: &TransactionDescriptor,
        valid: &[Category],
    ) -> Result<Vec<Category>> {
        let found = self
            .db
            .top_categories_for(&transaction.name, valid, self.limit)?;
        debug!(
            transaction = %transaction.transaction_id,
            candidates = found.len(),
            "Database lookup"
        );
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_top_counts() {
        let db = Database::in_memory().unwrap();
        for _ in 0..12 {
            db.record_confirmed_classification("Acme Office Supplies", "Office Supplies")
                .unwrap();
        }
        for _ in 0..2 {
            db.record_confirmed_classification("Acme Office Supplies", "Software")
                .unwrap();
        }

        let valid = vec![
            Category::new("1", "Software"),
            Category::new("2", "Office Supplies"),
        ];
        let source = DatabaseSource::new(db, 3);
        let txn = TransactionDescriptor::new("t1", "ACME OFFICE SUPPLIES", -45.0);
        let found = source.query(&txn, &valid).await.unwrap();
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Office Supplies", "Software"]);
    }

    #[tokio::test]
    async fn test_no_record() {
        let source = DatabaseSource::new(Database::in_memory().unwrap(), 3);
        let txn = TransactionDescriptor::new("t1", "Unknown Vendor", -5.0);
        let valid = vec![Category::new("1", "Meals")];
        assert!(source.query(&txn, &valid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let db = Database::in_memory().unwrap();
        db.record_confirmed_classification("Shell", "Fuel").unwrap();
        let valid = vec![Category::new("1", "Fuel")];
        let source = DatabaseSource::new(db, 3);

        let txns = vec![
            TransactionDescriptor::new("a", "Nobody", -1.0),
            TransactionDescriptor::new("b", "SHELL", -60.0),
        ];
        let found = source.query_batch(&txns, &valid).await.unwrap();
        assert!(found[0].is_empty());
        assert_eq!(found[1], vec![Category::new("1", "Fuel")]);
    }
}
