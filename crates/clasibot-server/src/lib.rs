//! Clasibot Web Server
//!
//! Axum-based HTTP surface for scheduled classification runs.
//!
//! - `POST|GET /api/classify/trigger`: start a run (Bearer `CRON_SECRET`)
//! - `GET /api/next-review`: when the next review is due
//! - `GET /api/runs/latest`, `GET /api/runs/:run_id`: job log (Bearer `CRON_SECRET`)
//! - `GET /health`
//!
//! The trigger secret is compared in constant time. Error responses carry a
//! sanitized `{"error": ...}` body; internal errors are only logged.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use clasibot_core::config::Config;
use clasibot_core::db::Database;
use clasibot_core::orchestrator::Orchestrator;
use clasibot_core::AIBackend;

mod handlers;
mod scheduler;

pub use scheduler::{start_classify_scheduler, ClassifyScheduleConfig};

/// Authorization header carrying the trigger secret
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Shared secret for the trigger and job log routes; `None` rejects every call with 500
    pub cron_secret: Option<String>,
    /// Days between reviews, used when no next review is stored yet
    pub review_interval_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cron_secret: None,
            review_interval_days: 7,
        }
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            cron_secret: config.cron_secret.clone().filter(|s| !s.is_empty()),
            review_interval_days: config.orchestrator.review_interval_days,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("cron_secret", &self.cron_secret.as_ref().map(|_| "<set>"))
            .field("review_interval_days", &self.review_interval_days)
            .finish()
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    /// `None` when the ledger or session endpoints are not configured
    pub orchestrator: Option<Arc<Orchestrator>>,
}

/// Bearer secret middleware for the scheduler routes
///
/// A missing secret configuration is a server fault (500), never an open
/// door. Rejected requests do no work.
async fn trigger_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(secret) = state.config.cron_secret.as_deref() else {
        error!(path = %request.uri().path(), "CRON_SECRET is not configured");
        return AppError::internal("Server misconfiguration").into_response();
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "));

    match provided {
        Some(key) if secret_matches(key, secret) => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "Unauthorized scheduler request");
            AppError::unauthorized().into_response()
        }
    }
}

/// Compare the provided secret using constant-time comparison
fn secret_matches(provided: &str, secret: &str) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();
    let secret_bytes = secret.as_bytes();
    // Only compare if lengths match (constant-time for same-length keys)
    provided_bytes.len() == secret_bytes.len() && provided_bytes.ct_eq(secret_bytes).into()
}

pub fn create_router(
    db: Database,
    config: ServerConfig,
    orchestrator: Option<Arc<Orchestrator>>,
) -> Router {
    let state = Arc::new(AppState {
        db,
        config,
        orchestrator,
    });

    let protected = Router::new()
        .route(
            "/classify/trigger",
            get(handlers::trigger_classification).post(handlers::trigger_classification),
        )
        .route("/runs/latest", get(handlers::latest_run))
        .route("/runs/:run_id", get(handlers::get_run))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            trigger_auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/next-review", get(handlers::get_next_review))
        .merge(protected);

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Start the server
///
/// Builds the orchestrator from `config`; without ledger and session
/// endpoints the server still answers read routes but refuses to trigger.
pub async fn serve(db: Database, host: &str, port: u16, config: Config) -> anyhow::Result<()> {
    let orchestrator = match Orchestrator::from_config(db.clone(), config.clone()) {
        Ok(orch) => Some(Arc::new(orch)),
        Err(e) => {
            warn!("Classification runs disabled: {}", e);
            None
        }
    };
    serve_with_config(db, host, port, ServerConfig::from(&config), orchestrator).await
}

/// Start the server with an explicit configuration and orchestrator
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
    orchestrator: Option<Arc<Orchestrator>>,
) -> anyhow::Result<()> {
    if config.cron_secret.is_none() {
        warn!("CRON_SECRET is not set - the trigger will reject every request");
    }

    check_ai_connection().await;

    if let (Some(schedule), Some(orch)) = (ClassifyScheduleConfig::from_env(), &orchestrator) {
        start_classify_scheduler(Arc::clone(orch), schedule);
    }

    let app = create_router(db, config, orchestrator);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log AI backend connection status
async fn check_ai_connection() {
    match clasibot_core::AIClient::from_env() {
        Some(client) => {
            if client.health_check().await {
                info!("AI backend connected: {} ({})", client.host(), client.model());
            } else {
                warn!(
                    "AI backend not reachable at {} - the LLM tier will fall through",
                    client.host()
                );
            }
        }
        None => info!("AI backend not configured (set AI_BACKEND / OLLAMA_HOST to enable the LLM tier)"),
    }
}

/// Application error type
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Unauthorized".to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
