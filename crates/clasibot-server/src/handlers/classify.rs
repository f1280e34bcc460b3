//! Scheduler trigger

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use tracing::{error, info};

use crate::{AppError, AppState};
use clasibot_core::QueryResult;

/// POST|GET /api/classify/trigger - Start a classification run
///
/// Answers 202 with the run id as soon as the run is spawned; the run itself
/// continues in the background.
pub async fn trigger_classification(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<QueryResult>), AppError> {
    let Some(orchestrator) = state.orchestrator.as_ref() else {
        error!("Trigger received but the ledger or session service is not configured");
        return Err(AppError::internal("Server misconfiguration"));
    };

    let (run_id, _handle) = orchestrator.start_run();
    info!(run_id = %run_id, "Classification run triggered");

    Ok((
        StatusCode::ACCEPTED,
        Json(QueryResult::success("Classification run started", run_id)),
    ))
}
