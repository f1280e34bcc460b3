//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API
//! (vLLM, LocalAI, llama-server, text-generation-inference, hosted APIs).
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::AIBackend;

/// OpenAI-compatible backend
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            ..Self::new(base_url, model)
        }
    }

    /// Create from environment variables
    ///
    /// Required: `OPENAI_COMPATIBLE_HOST`
    /// Optional: `OPENAI_COMPATIBLE_MODEL` (default: gpt-3.5-turbo)
    /// Optional: `OPENAI_COMPATIBLE_API_KEY`
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OPENAI_COMPATIBLE_HOST").ok()?;
        let model = std::env::var("OPENAI_COMPATIBLE_MODEL")
            .unwrap_or_else(|_| "gpt-3.5-turbo".to_string());
        let mut backend = Self::new(&host, &model);
        backend.api_key = std::env::var("OPENAI_COMPATIBLE_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        Some(backend)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref api_key) => builder.header("Authorization", format!("Bearer {}", api_key)),
            None => builder,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: Some(0.0),
            max_tokens: None,
            stream: false,
        };

        let response = self
            .with_auth(
                self.http_client
                    .post(format!("{}/v1/chat/completions", self.base_url)),
            )
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InvalidData(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let chat_response: ChatCompletionResponse = response.json().await?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::InvalidData("No response from OpenAI API".into()))?;
        debug!(model = %self.model, "Chat completion: {}", content);
        Ok(content.trim().to_string())
    }

    async fn health_check(&self) -> bool {
        // /v1/models is standard; /health covers LocalAI and friends
        for path in ["/v1/models", "/health"] {
            if let Ok(resp) = self
                .with_auth(self.http_client.get(format!("{}{}", self.base_url, path)))
                .send()
                .await
            {
                if resp.status().is_success() {
                    return true;
                }
            }
        }
        false
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
    use crate::ai::types::ClassificationRequest;
    use crate::test_utils::MockLlmServer;

    #[test]
    fn test_backend_new() {
        let backend = OpenAICompatibleBackend::new("http://localhost:12434/", "llama3.2");
        assert_eq!(backend.model(), "llama3.2");
        assert_eq!(backend.host(), "http://localhost:12434");
        assert!(backend.api_key.is_none());
    }

    #[test]
    fn test_backend_with_api_key() {
        let backend =
            OpenAICompatibleBackend::with_api_key("http://localhost:12434", "gpt-4", "sk-test123");
        assert_eq!(backend.model(), "gpt-4");
        assert_eq!(backend.api_key, Some("sk-test123".to_string()));
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatCompletionRequest {
            model: "llama3.2".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "Hello".to_string(),
            }],
            temperature: None,
            max_tokens: None,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["content"], "Hello");
        assert!(json.get("temperature").is_none());
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let backend = OpenAICompatibleBackend::new("http://127.0.0.1:1", "llama3.2");
        assert!(!backend.health_check().await);
    }

    #[tokio::test]
    async fn test_classify_against_mock_server() {
        let server = MockLlmServer::start().await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "mock-model");
        assert!(backend.health_check().await);

        let request = ClassificationRequest::new(
            "UBER EATS",
            -18.25,
            vec!["Meals".into(), "Travel".into()],
        );
        let reply = backend.classify(&request).await.unwrap();
        assert_eq!(reply, "Meals");
    }

    #[tokio::test]
    async fn test_batch_against_mock_server() {
        let server = MockLlmServer::start().await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "mock-model");

        let categories = vec!["Meals".to_string(), "Travel".to_string()];
        let requests = vec![
            ClassificationRequest::new("UBER EATS", -18.25, categories.clone()),
            ClassificationRequest::new("MYSTERY VENDOR", -5.0, categories.clone()),
            ClassificationRequest::new("AIR CANADA", -420.0, categories),
        ];
        let answers = backend.classify_batch(&requests).await.unwrap();
        assert_eq!(
            answers,
            vec![Some("Meals".to_string()), None, Some("Travel".to_string())]
        );
    }
}
