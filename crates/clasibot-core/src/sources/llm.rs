//! Language model tier

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info};

use crate::ai::parsing::{is_declined, parse_categories, search_query};
use crate::ai::{AIBackend, AIClient, ClassificationRequest};
use crate::enrichment::Enricher;
use crate::error::Result;
use crate::models::{Category, ClassifiedBy, TransactionDescriptor};

use super::CandidateSource;

/// Asks a language model to pick one category
///
/// When an enricher is configured, a knowledge graph description is added to
/// the prompt. A reply of `None <query>` triggers one web search whose snippets
/// are added before the model is asked again.
#[derive(Clone)]
pub struct LlmSource {
    ai: AIClient,
    enricher: Option<Arc<dyn Enricher>>,
    industry: Option<String>,
    location: Option<String>,
}

impl LlmSource {
    pub fn new(ai: AIClient) -> Self {
        Self {
            ai,
            enricher: None,
            industry: None,
            location: None,
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Company industry and location included in every prompt
    pub fn with_company(mut self, industry: Option<&str>, location: Option<&str>) -> Self {
        self.industry = industry.map(str::to_string);
        self.location = location.map(str::to_string);
        self
    }

    async fn build_request(
        &self,
        transaction: &TransactionDescriptor,
        valid: &[Category],
    ) -> ClassificationRequest {
        let names = valid.iter().map(|c| c.name.clone()).collect();
        let mut request = ClassificationRequest::new(&transaction.name, transaction.amount, names)
            .with_industry(self.industry.as_deref())
            .with_location(self.location.as_deref());

        if let Some(enricher) = &self.enricher {
            if let Some(description) = enricher.describe(&transaction.name).await {
                request = request.with_context(description);
            }
        }
        request
    }

    /// First valid category named in a reply
    fn pick(reply: &str, valid: &[Category]) -> Vec<Category> {
        if is_declined(reply) {
            return Vec::new();
        }
        parse_categories(reply, valid).into_iter().take(1).collect()
    }
}

#[async_trait]
impl CandidateSource for LlmSource {
    fn kind(&self) -> ClassifiedBy {
        ClassifiedBy::Llm
    }

    async fn query(
        &self,
        transaction: &TransactionDescriptor,
        valid: &[Category],
    ) -> Result<Vec<Category>> {
        if valid.is_empty() {
            return Ok(Vec::new());
        }

        let request = self.build_request(transaction, valid).await;
        let mut reply = self.ai.classify(&request).await?;

        if let (Some(query), Some(enricher)) = (search_query(&reply), &self.enricher) {
            let snippets = enricher.search(&query).await;
            if !snippets.is_empty() {
                debug!(transaction = %transaction.transaction_id, query = %query, "Re-asking with search results");
                let request = snippets
                    .into_iter()
                    .fold(request, |r, snippet| r.with_context(snippet));
                reply = self.ai.classify(&request).await?;
            }
        }

        Ok(Self::pick(&reply, valid))
    }

    /// One model request for all transactions
    ///
    /// Declined items come back empty; there is no per-item search re-ask.
    async fn query_batch(
        &self,
        transactions: &[TransactionDescriptor],
        valid: &[Category],
    ) -> Result<Vec<Vec<Category>>> {
        if transactions.is_empty() || valid.is_empty() {
            return Ok(vec![Vec::new(); transactions.len()]);
        }

        let requests = join_all(transactions.iter().map(|t| self.build_request(t, valid))).await;
        let answers = self.ai.classify_batch(&requests).await?;
        info!(
            transactions = transactions.len(),
            model = %self.ai.model(),
            "Batched LLM classification"
        );

        Ok(answers
            .iter()
            .map(|answer| match answer {
                Some(reply) => Self::pick(reply, valid),
                None => Vec::new(),
            })
            .collect())
    }
}
