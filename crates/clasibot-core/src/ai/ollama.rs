//! Ollama backend implementation
//!
//! HTTP client for the Ollama generate API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

use super::AIBackend;

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl AIBackend for OllamaBackend {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            system,
            prompt,
            stream: false,
            options: OllamaOptions { temperature: 0.0 },
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let ollama_response: OllamaResponse = response.json().await?;
        debug!(model = %self.model, "Ollama response: {}", ollama_response.response);

        Ok(ollama_response.response.trim().to_string())
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_new_trims_trailing_slash() {
        let backend = OllamaBackend::new("http://localhost:11434/", "llama3.2");
        assert_eq!(backend.host(), "http://localhost:11434");
        assert_eq!(backend.model(), "llama3.2");
        assert_eq!(backend.with_model("gemma3").model(), "gemma3");
    }

    #[test]
    fn test_request_serialization() {
        let request = OllamaRequest {
            model: "llama3.2",
            system: "sys",
            prompt: "hello",
            stream: false,
            options: OllamaOptions { temperature: 0.0 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["system"], "sys");
        assert_eq!(json["stream"], false);
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let backend = OllamaBackend::new("http://127.0.0.1:1", "llama3.2");
        assert!(!backend.health_check().await);
    }
}
