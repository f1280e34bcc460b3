//! Web enrichment for the LLM tier
//!
//! Two collaborators add context about an unfamiliar business before the model
//! is asked: a knowledge graph lookup (one short description) and a custom web
//! search (a few result snippets). Both are optional and never fatal; failures
//! are logged and yield nothing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::EnrichmentConfig;
use crate::error::{Error, Result};

/// Placeholder used when the knowledge graph has nothing trustworthy
pub const NO_DESCRIPTION: &str = "No description available";

/// Minimum knowledge graph score for a description to be used
pub const MIN_RESULT_SCORE: f64 = 10.0;

const SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
const KNOWLEDGE_GRAPH_URL: &str = "https://kgsearch.googleapis.com/v1/entities:search";
const ENTITY_TYPES: [&str; 3] = ["Organization", "Corporation", "LocalBusiness"];

/// Context provider consulted by the LLM source
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Short description of the business, `None` when nothing scores high enough
    async fn describe(&self, name: &str) -> Option<String>;

    /// Search result snippets for a query, possibly empty
    async fn search(&self, query: &str) -> Vec<String>;
}

/// Custom search client
#[derive(Clone)]
pub struct SearchClient {
    client: Client,
    base_url: String,
    api_key: String,
    engine_id: String,
    num_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    snippet: Option<String>,
}

impl SearchClient {
    pub fn new(api_key: &str, engine_id: &str, num_results: usize) -> Self {
        Self {
            client: Client::new(),
            base_url: SEARCH_URL.to_string(),
            api_key: api_key.to_string(),
            engine_id: engine_id.to_string(),
            num_results: num_results.clamp(1, 10),
        }
    }

    /// Point the client at a different endpoint
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub async fn snippets(&self, query: &str) -> Result<Vec<String>> {
        let num = self.num_results.to_string();
        let params = [
            ("key", self.api_key.as_str()),
            ("cx", self.engine_id.as_str()),
            ("q", query),
            ("num", num.as_str()),
        ];

        debug!(query = %query, "Querying custom search");

        let response = self.client.get(&self.base_url).query(&params).send().await?;
        if !response.status().is_success() {
            return Err(Error::SourceUnavailable(format!(
                "custom search returned {}",
                response.status()
            )));
        }

        let body: SearchResponse = response.json().await?;
        Ok(body
            .items
            .into_iter()
            .filter_map(|item| item.snippet)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(self.num_results)
            .collect())
    }
}

/// Knowledge graph entity search client
#[derive(Clone)]
pub struct KnowledgeGraphClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeGraphResponse {
    #[serde(default)]
    item_list_element: Vec<KnowledgeGraphItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeGraphItem {
    #[serde(default)]
    result_score: f64,
    result: KnowledgeGraphEntity,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeGraphEntity {
    #[serde(default)]
    detailed_description: Option<DetailedDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailedDescription {
    #[serde(default)]
    article_body: String,
}

impl KnowledgeGraphClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: KNOWLEDGE_GRAPH_URL.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// The best entity's description, or [`NO_DESCRIPTION`]
    ///
    /// Only one result is requested; its description counts when the result
    /// score is above [`MIN_RESULT_SCORE`].
    pub async fn description(&self, query: &str) -> Result<String> {
        let mut params: Vec<(&str, &str)> = vec![
            ("query", query),
            ("key", self.api_key.as_str()),
            ("limit", "1"),
        ];
        params.extend(ENTITY_TYPES.iter().map(|t| ("types", *t)));

        let response = self.client.get(&self.base_url).query(&params).send().await?;
        if !response.status().is_success() {
            return Err(Error::SourceUnavailable(format!(
                "knowledge graph returned {}",
                response.status()
            )));
        }

        let body: KnowledgeGraphResponse = response.json().await?;
        let description = body
            .item_list_element
            .into_iter()
            .filter(|item| item.result_score > MIN_RESULT_SCORE)
            .filter_map(|item| item.result.detailed_description)
            .map(|d| d.article_body.trim().to_string())
            .find(|body| !body.is_empty());

        Ok(description.unwrap_or_else(|| NO_DESCRIPTION.to_string()))
    }
}

/// Enricher backed by the two web APIs
///
/// Either client may be missing, in which case that kind of context is skipped.
#[derive(Clone)]
pub struct WebEnricher {
    search: Option<SearchClient>,
    knowledge_graph: Option<KnowledgeGraphClient>,
    timeout: Duration,
}

impl WebEnricher {
    pub fn new(
        search: Option<SearchClient>,
        knowledge_graph: Option<KnowledgeGraphClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            search,
            knowledge_graph,
            timeout,
        }
    }

    /// Build from configuration, `None` when no credentials are set
    pub fn from_config(config: &EnrichmentConfig, timeout: Duration) -> Option<Self> {
        let search = match (&config.search_api_key, &config.search_engine_id) {
            (Some(key), Some(cx)) => Some(SearchClient::new(key, cx, config.search_results)),
            _ => None,
        };
        let knowledge_graph = config
            .knowledge_graph_api_key
            .as_deref()
            .map(KnowledgeGraphClient::new);

        if search.is_none() && knowledge_graph.is_none() {
            return None;
        }
        Some(Self::new(search, knowledge_graph, timeout))
    }
}

#[async_trait]
impl Enricher for WebEnricher {
    async fn describe(&self, name: &str) -> Option<String> {
        let client = self.knowledge_graph.as_ref()?;
        match tokio::time::timeout(self.timeout, client.description(name)).await {
            Ok(Ok(description)) if description != NO_DESCRIPTION => Some(description),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!(error = %e, "Knowledge graph lookup failed");
                None
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Knowledge graph lookup timed out");
                None
            }
        }
    }

    async fn search(&self, query: &str) -> Vec<String> {
        let Some(client) = self.search.as_ref() else {
            return Vec::new();
        };
        match tokio::time::timeout(self.timeout, client.snippets(query)).await {
            Ok(Ok(snippets)) => snippets,
            Ok(Err(e)) => {
                warn!(error = %e, "Custom search failed");
                Vec::new()
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Custom search timed out");
                Vec::new()
            }
        }
    }
}

/// Fixed enrichment for tests and offline runs
#[derive(Clone, Default)]
pub struct StaticEnricher {
    descriptions: Vec<(String, String)>,
    snippets: Vec<(String, Vec<String>)>,
}

impl StaticEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Description for names containing `key` (case-insensitive)
    pub fn with_description(mut self, key: &str, description: &str) -> Self {
        self.descriptions
            .push((key.to_lowercase(), description.to_string()));
        self
    }

    /// Snippets for queries containing `key` (case-insensitive)
    pub fn with_snippets(mut self, key: &str, snippets: &[&str]) -> Self {
        self.snippets.push((
            key.to_lowercase(),
            snippets.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }
}

#[async_trait]
impl Enricher for StaticEnricher {
    async fn describe(&self, name: &str) -> Option<String> {
        let name = name.to_lowercase();
        self.descriptions
            .iter()
            .find(|(key, _)| name.contains(key.as_str()))
            .map(|(_, d)| d.clone())
    }

    async fn search(&self, query: &str) -> Vec<String> {
        let query = query.to_lowercase();
        self.snippets
            .iter()
            .find(|(key, _)| query.contains(key.as_str()))
            .map(|(_, s)| s.clone())
            .unwrap_or_default()
    }
}
