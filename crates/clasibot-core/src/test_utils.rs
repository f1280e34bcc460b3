//! Test utilities for clasibot-core
//!
//! Small axum servers standing in for the external collaborators: a mock
//! OpenAI-compatible model server, and a generic wrapper for serving any
//! router on a random local port.

use std::net::SocketAddr;

use axum::{
    extract::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Serves an arbitrary router on 127.0.0.1 until dropped
pub struct MockServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockServer {
    /// Start serving `app` on an available port
    pub async fn serve(app: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Mock OpenAI-compatible model server
///
/// Answers `Meals` for names containing UBER, `Travel` for AIR CANADA and
/// `None <name>` for everything else. Batched prompts get a JSON array.
pub struct MockLlmServer {
    inner: MockServer,
}

impl MockLlmServer {
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/health", get(|| async { "ok" }))
            .route("/v1/chat/completions", post(handle_chat));
        Self {
            inner: MockServer::serve(app).await,
        }
    }

    pub fn url(&self) -> String {
        self.inner.url()
    }
}

async fn handle_models() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "object": "list",
        "data": [{"id": "mock-model", "object": "model"}]
    }))
}

async fn handle_chat(Json(request): Json<ChatRequest>) -> Json<ChatResponse> {
    let prompt = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let content = if prompt.contains("Transactions:") {
        let answers: Vec<String> = quoted_names(&prompt)
            .into_iter()
            .map(|name| answer_for(&name).unwrap_or_else(|| "None".to_string()))
            .collect();
        serde_json::to_string(&answers).unwrap()
    } else {
        let name = quoted_names(&prompt).into_iter().next().unwrap_or_default();
        answer_for(&name).unwrap_or_else(|| format!("None {}", name))
    };

    Json(ChatResponse {
        model: request.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content,
            },
        }],
    })
}

fn answer_for(name: &str) -> Option<String> {
    let upper = name.to_uppercase();
    if upper.contains("UBER") {
        Some("Meals".to_string())
    } else if upper.contains("AIR CANADA") {
        Some("Travel".to_string())
    } else {
        None
    }
}

/// Names quoted after `a transaction from "` in a prompt, in order
fn quoted_names(prompt: &str) -> Vec<String> {
    const MARKER: &str = "a transaction from \"";
    let mut names = Vec::new();
    let mut rest = prompt;
    while let Some(start) = rest.find(MARKER) {
        rest = &rest[start + MARKER.len()..];
        match rest.find('"') {
            Some(end) => {
                names.push(rest[..end].to_string());
                rest = &rest[end..];
            }
            None => break,
        }
    }
    names
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize)]
struct ChatChoice {
    index: u32,
    message: ChatMessage,
}
