//! Runtime configuration
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables:
//!
//! - `CRON_SECRET`: Bearer credential required by the scheduler trigger
//! - `LEDGER_BASE_URL` / `LEDGER_AGENT_ID`: accounting ledger endpoint
//! - `SESSION_SERVICE_URL`: synthetic login service
//! - `SEARCH_API_KEY` / `SEARCH_ENGINE_ID`: custom search enrichment
//! - `KNOWLEDGE_GRAPH_API_KEY`: knowledge graph enrichment
//! - `CLASIBOT_CHUNK_SIZE`, `CLASIBOT_CALL_TIMEOUT_SECS`, `CLASIBOT_DATABASE_TOP_N`,
//!   `CLASIBOT_MATCH_THRESHOLD`, `CLASIBOT_REVIEW_INTERVAL_DAYS`
//!
//! Example file:
//!
//! ```toml
//! [classifier]
//! database_top_n = 3
//! match_threshold = 0.85
//!
//! [orchestrator]
//! chunk_size = 25
//! call_timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Resolver tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Categories returned by the database tier
    pub database_top_n: usize,
    /// Minimum Jaro-Winkler similarity for a matching hit
    pub match_threshold: f64,
    /// How far back the matching vocabulary reaches
    pub history_years: u32,
    /// Per-source call timeout
    pub call_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            database_top_n: 3,
            match_threshold: 0.85,
            history_years: 5,
            call_timeout_secs: 30,
        }
    }
}

impl ClassifierConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }
}

/// Batch run tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Transactions per chunk
    pub chunk_size: usize,
    /// Timeout for session, ledger and write-back calls
    pub call_timeout_secs: u64,
    /// Days between scheduled reviews
    pub review_interval_days: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_size: 25,
            call_timeout_secs: 30,
            review_interval_days: 7,
        }
    }
}

impl OrchestratorConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }
}

/// External endpoints
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub ledger_base_url: Option<String>,
    pub ledger_agent_id: Option<String>,
    pub session_service_url: Option<String>,
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("ledger_base_url", &self.ledger_base_url)
            .field("ledger_agent_id", &self.ledger_agent_id.as_ref().map(|_| "<set>"))
            .field("session_service_url", &self.session_service_url)
            .finish()
    }
}

/// Search and knowledge graph credentials
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub search_api_key: Option<String>,
    pub search_engine_id: Option<String>,
    pub knowledge_graph_api_key: Option<String>,
    /// Snippets requested from custom search
    pub search_results: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            search_api_key: None,
            search_engine_id: None,
            knowledge_graph_api_key: None,
            search_results: 3,
        }
    }
}

impl std::fmt::Debug for EnrichmentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentConfig")
            .field("search_api_key", &self.search_api_key.as_ref().map(|_| "<set>"))
            .field("search_engine_id", &self.search_engine_id)
            .field(
                "knowledge_graph_api_key",
                &self.knowledge_graph_api_key.as_ref().map(|_| "<set>"),
            )
            .field("search_results", &self.search_results)
            .finish()
    }
}

/// Top-level configuration
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub classifier: ClassifierConfig,
    pub orchestrator: OrchestratorConfig,
    pub endpoints: EndpointConfig,
    pub enrichment: EnrichmentConfig,
    /// Shared secret for the scheduler trigger
    pub cron_secret: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("classifier", &self.classifier)
            .field("orchestrator", &self.orchestrator)
            .field("endpoints", &self.endpoints)
            .field("enrichment", &self.enrichment)
            .field("cron_secret", &self.cron_secret.as_ref().map(|_| "<set>"))
            .finish()
    }
}

/// Default config file location (`~/.config/clasibot/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("clasibot").join("config.toml"))
}

impl Config {
    /// Load configuration
    ///
    /// An explicit `path` must exist. Without one, the default location is used
    /// when present. Environment variables are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => Self::default(),
            },
        };
        config.apply_env();
        Ok(config)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading config file");
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from environment variables
    pub fn apply_env(&mut self) {
        if let Some(v) = env_string("CRON_SECRET") {
            self.cron_secret = Some(v);
        }
        if let Some(v) = env_string("LEDGER_BASE_URL") {
            self.endpoints.ledger_base_url = Some(v);
        }
        if let Some(v) = env_string("LEDGER_AGENT_ID") {
            self.endpoints.ledger_agent_id = Some(v);
        }
        if let Some(v) = env_string("SESSION_SERVICE_URL") {
            self.endpoints.session_service_url = Some(v);
        }
        if let Some(v) = env_string("SEARCH_API_KEY") {
            self.enrichment.search_api_key = Some(v);
        }
        if let Some(v) = env_string("SEARCH_ENGINE_ID") {
            self.enrichment.search_engine_id = Some(v);
        }
        if let Some(v) = env_string("KNOWLEDGE_GRAPH_API_KEY") {
            self.enrichment.knowledge_graph_api_key = Some(v);
        }
        if let Some(v) = env_parse("CLASIBOT_CHUNK_SIZE") {
            self.orchestrator.chunk_size = v;
        }
        if let Some(v) = env_parse("CLASIBOT_CALL_TIMEOUT_SECS") {
            self.orchestrator.call_timeout_secs = v;
            self.classifier.call_timeout_secs = v;
        }
        if let Some(v) = env_parse("CLASIBOT_REVIEW_INTERVAL_DAYS") {
            self.orchestrator.review_interval_days = v;
        }
        if let Some(v) = env_parse("CLASIBOT_DATABASE_TOP_N") {
            self.classifier.database_top_n = v;
        }
        if let Some(v) = env_parse("CLASIBOT_MATCH_THRESHOLD") {
            self.classifier.match_threshold = v;
        }
    }

    /// The trigger secret, or a configuration error when unset
    pub fn require_cron_secret(&self) -> Result<&str> {
        self.cron_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Configuration("CRON_SECRET is not set".into()))
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key = key, value = %raw, "Ignoring unparseable environment variable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.classifier.database_top_n, 3);
        assert_eq!(config.orchestrator.chunk_size, 25);
        assert_eq!(config.orchestrator.review_interval_days, 7);
        assert_eq!(config.enrichment.search_results, 3);
        assert!(config.require_cron_secret().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml(
            r#"
            cron_secret = "s3cret"

            [classifier]
            database_top_n = 5

            [endpoints]
            ledger_base_url = "https://ledger.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.classifier.database_top_n, 5);
        assert_eq!(config.classifier.match_threshold, 0.85);
        assert_eq!(config.orchestrator.chunk_size, 25);
        assert_eq!(config.require_cron_secret().unwrap(), "s3cret");
        assert_eq!(
            config.endpoints.ledger_base_url.as_deref(),
            Some("https://ledger.example.com")
        );
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml("[classifier]\ndatabase_top_n = \"many\""),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[orchestrator]\nchunk_size = 10\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.orchestrator.chunk_size, 10);

        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config {
            cron_secret: Some("hunter2".into()),
            ..Default::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("<set>"));
    }

    #[test]
    fn test_timeouts_never_zero() {
        let config = OrchestratorConfig {
            call_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.call_timeout(), Duration::from_secs(1));
    }
}
