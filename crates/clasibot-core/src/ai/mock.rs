//! Mock backend for testing
//!
//! Replies are looked up by transaction name, so tests can script the model
//! without a running server. Calls are counted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::parsing::is_declined;
use super::types::ClassificationRequest;
use super::AIBackend;

/// Mock AI backend for testing
///
/// A reply is chosen by the first configured key contained in the upper-cased
/// transaction name. When the request carries extra context (after a search
/// re-ask) the `with_context_response` table is consulted first. Unknown
/// names get "None".
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    failing: bool,
    responses: Vec<(String, String)>,
    context_responses: Vec<(String, String)>,
    calls: Arc<AtomicUsize>,
    batch_calls: Arc<AtomicUsize>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            failing: false,
            responses: Vec::new(),
            context_responses: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            batch_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Every request fails, as if the server were down
    pub fn failing() -> Self {
        Self {
            healthy: false,
            failing: true,
            ..Self::new()
        }
    }

    /// Reply `reply` for names containing `key`
    pub fn with_response(mut self, key: &str, reply: &str) -> Self {
        self.responses.push((key.to_uppercase(), reply.to_string()));
        self
    }

    /// Reply `reply` for names containing `key` once context was added
    pub fn with_context_response(mut self, key: &str, reply: &str) -> Self {
        self.context_responses
            .push((key.to_uppercase(), reply.to_string()));
        self
    }

    /// Single classification calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Batch classification calls made so far
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn reply_for(&self, request: &ClassificationRequest) -> String {
        let name = request.name.to_uppercase();
        let lookup = |table: &[(String, String)]| {
            table
                .iter()
                .find(|(key, _)| name.contains(key.as_str()))
                .map(|(_, reply)| reply.clone())
        };

        let scripted = if request.context.is_empty() {
            None
        } else {
            lookup(&self.context_responses)
        };
        scripted
            .or_else(|| lookup(&self.responses))
            .unwrap_or_else(|| "None".to_string())
    }

    fn check_available(&self) -> Result<()> {
        if self.failing {
            return Err(Error::SourceUnavailable("mock backend is down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
        self.check_available()?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("None".to_string())
    }

    async fn classify(&self, request: &ClassificationRequest) -> Result<String> {
        self.check_available()?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply_for(request))
    }

    async fn classify_batch(&self, requests: &[ClassificationRequest]) -> Result<Vec<Option<String>>> {
        self.check_available()?;
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(requests
            .iter()
            .map(|r| {
                let reply = self.reply_for(r);
                if is_declined(&reply) {
                    None
                } else {
                    Some(reply)
                }
            })
            .collect())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> ClassificationRequest {
        ClassificationRequest::new(name, -10.0, vec!["Meals".into(), "Travel".into()])
    }

    #[tokio::test]
    async fn test_scripted_replies() {
        let mock = MockBackend::new()
            .with_response("uber", "Meals")
            .with_response("acme", "None Acme Ltd Calgary")
            .with_context_response("acme", "Travel");

        assert_eq!(mock.classify(&request("UBER EATS")).await.unwrap(), "Meals");
        assert_eq!(
            mock.classify(&request("ACME LTD")).await.unwrap(),
            "None Acme Ltd Calgary"
        );
        let with_context = request("ACME LTD").with_context("Travel agency");
        assert_eq!(mock.classify(&with_context).await.unwrap(), "Travel");
        assert_eq!(mock.classify(&request("Unknown")).await.unwrap(), "None");
        assert_eq!(mock.calls(), 4);
    }

    #[tokio::test]
    async fn test_batch_counts_once() {
        let mock = MockBackend::new().with_response("uber", "Meals");
        let answers = mock
            .classify_batch(&[request("UBER"), request("OTHER")])
            .await
            .unwrap();
        assert_eq!(answers, vec![Some("Meals".to_string()), None]);
        assert_eq!(mock.batch_calls(), 1);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_failing_backend() {
        let mock = MockBackend::failing();
        assert!(mock.classify(&request("UBER")).await.is_err());
        assert!(mock.classify_batch(&[request("UBER")]).await.is_err());
        assert!(!mock.health_check().await);
    }
}
