//! Pluggable language model backend abstraction
//!
//! The LLM tier of the resolver talks to a model through this interface.
//! Backends are plain HTTP clients for locally hosted or OpenAI-compatible
//! servers.
//!
//! # Architecture
//!
//! - `AIBackend` trait: raw completion plus single and batch classification
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OllamaBackend`, `OpenAICompatibleBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (ollama, openai_compatible, mock). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Default model name (default: llama3.2)
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required for openai_compatible backend)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod prompts;
pub mod types;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use async_trait::async_trait;

use crate::error::Result;

/// Interface shared by all language model backends
///
/// Backends only have to provide `complete`; the classification methods build
/// prompts and parse replies on top of it.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Send a system instruction and a prompt, return the raw reply text
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;

    /// Ask for one transaction, returning the raw reply
    async fn classify(&self, request: &ClassificationRequest) -> Result<String> {
        let prompt = prompts::classification_prompt(request);
        self.complete(prompts::SYSTEM_INSTRUCTION, &prompt).await
    }

    /// Ask for several transactions in one request
    ///
    /// Returns one answer per request, in order. `None` means the model
    /// declined or skipped that item.
    async fn classify_batch(&self, requests: &[ClassificationRequest]) -> Result<Vec<Option<String>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = prompts::batch_prompt(requests);
        let reply = self
            .complete(prompts::BATCH_SYSTEM_INSTRUCTION, &prompt)
            .await?;
        parsing::parse_batch_reply(&reply, requests.len())
    }

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// OpenAI-compatible backend (vLLM, LocalAI, llama-server, hosted APIs)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `ollama` (default): Uses OLLAMA_HOST and OLLAMA_MODEL
    /// - `openai_compatible`: Uses OPENAI_COMPATIBLE_HOST and OPENAI_COMPATIBLE_MODEL
    /// - `mock`: Creates a mock backend for testing
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaBackend::from_env().map(AIClient::Ollama),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to ollama");
                OllamaBackend::from_env().map(AIClient::Ollama)
            }
        }
    }

    /// Create an Ollama backend directly
    pub fn ollama(host: &str, model: &str) -> Self {
        AIClient::Ollama(OllamaBackend::new(host, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }
}

impl From<MockBackend> for AIClient {
    fn from(backend: MockBackend) -> Self {
        AIClient::Mock(backend)
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        match self {
            AIClient::Ollama(b) => b.complete(system, prompt).await,
            AIClient::OpenAICompatible(b) => b.complete(system, prompt).await,
            AIClient::Mock(b) => b.complete(system, prompt).await,
        }
    }

    async fn classify(&self, request: &ClassificationRequest) -> Result<String> {
        match self {
            AIClient::Ollama(b) => b.classify(request).await,
            AIClient::OpenAICompatible(b) => b.classify(request).await,
            AIClient::Mock(b) => b.classify(request).await,
        }
    }

    async fn classify_batch(&self, requests: &[ClassificationRequest]) -> Result<Vec<Option<String>>> {
        match self {
            AIClient::Ollama(b) => b.classify_batch(requests).await,
            AIClient::OpenAICompatible(b) => b.classify_batch(requests).await,
            AIClient::Mock(b) => b.classify_batch(requests).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.model(),
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.host(),
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_client_mock() {
        let client = AIClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        assert!(AIClient::mock().health_check().await);
        assert!(!AIClient::from(MockBackend::unhealthy()).health_check().await);
    }

    #[tokio::test]
    async fn test_delegates_classify() {
        let client = AIClient::from(MockBackend::new().with_response("UBER", "Meals"));
        let request = ClassificationRequest::new("UBER EATS", -20.0, vec!["Meals".into()]);
        assert_eq!(client.classify(&request).await.unwrap(), "Meals");
    }
}
