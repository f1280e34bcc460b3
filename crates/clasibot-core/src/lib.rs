//! Clasibot Core Library
//!
//! Transaction classification for bookkeeping firms:
//! - Classification cascade (company history, shared records, language model)
//! - Province-scoped tax code resolution
//! - Synthetic bookkeeper sessions and the accounting ledger client
//! - Scheduled batch runs over every connected company
//! - Database access and migrations
//! - Pluggable AI backends (Ollama, OpenAI-compatible, mock)
//! - Web search and knowledge graph enrichment

pub mod ai;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod query_result;
pub mod resolver;
pub mod session;
pub mod sources;
pub mod tax;

/// Test utilities including a mock OpenAI-compatible server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, ClassificationRequest, MockBackend, OllamaBackend, OpenAICompatibleBackend};
pub use config::Config;
pub use db::Database;
pub use enrichment::{Enricher, StaticEnricher, WebEnricher};
pub use error::{Error, Result};
pub use ledger::{HttpLedger, InMemoryLedger, Ledger, LedgerFixture, WriteBackReport};
pub use models::*;
pub use orchestrator::{CompanyBatchJob, CompanyContext, Orchestrator};
pub use query_result::{QueryResult, QueryStatus};
pub use resolver::{merge_results, Resolver};
pub use session::{
    HttpSessionProvider, InviteContext, SessionManager, SessionProvider, SessionTokens,
    StaticSessionProvider,
};
pub use sources::{history_since, CandidateSource, DatabaseSource, LlmSource, MatchingSource};
pub use tax::{Province, TaxCode, TaxCodeResolver};
