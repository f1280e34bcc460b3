//! Candidate source adapters
//!
//! Each tier of the classification cascade answers the same question: which
//! of the company's valid categories fit this transaction? Sources are
//! read-only and never decide on their own; the resolver orders them.
//!
//! - [`MatchingSource`]: fuzzy match against the company's confirmed history
//! - [`DatabaseSource`]: cross-company frequency of confirmed categories
//! - [`LlmSource`]: ask a language model, with optional web context

mod database;
mod llm;
mod matching;

pub use database::DatabaseSource;
pub use llm::LlmSource;
pub use matching::{history_since, MatchingSource};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

use crate::error::Result;
use crate::models::{Category, ClassifiedBy, TransactionDescriptor};

/// One tier of the classification cascade
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Tag attached to results from this source
    fn kind(&self) -> ClassifiedBy;

    /// Candidate categories for one transaction, best first
    async fn query(
        &self,
        transaction: &TransactionDescriptor,
        valid: &[Category],
    ) -> Result<Vec<Category>>;

    /// Candidates for several transactions, in input order
    ///
    /// The default runs the single queries concurrently. A failed item comes
    /// back empty.
    async fn query_batch(
        &self,
        transactions: &[TransactionDescriptor],
        valid: &[Category],
    ) -> Result<Vec<Vec<Category>>> {
        let results = join_all(transactions.iter().map(|t| self.query(t, valid))).await;
        Ok(results
            .into_iter()
            .zip(transactions)
            .map(|(result, t)| {
                result.unwrap_or_else(|e| {
                    warn!(source = %self.kind(), transaction = %t.transaction_id, error = %e, "Source query failed");
                    Vec::new()
                })
            })
            .collect())
    }
}

/// Map a category name onto the valid category with the same name
pub(crate) fn find_valid<'a>(valid: &'a [Category], name: &str) -> Option<&'a Category> {
    let name = name.trim();
    valid
        .iter()
        .find(|c| c.name.trim().eq_ignore_ascii_case(name))
}
