//! Job log handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::{AppError, AppState};
use clasibot_core::{CompanyOutcome, JobStatus};

/// Outcomes of one run
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: String,
    pub success: usize,
    pub partial_failure: usize,
    pub failed: usize,
    pub outcomes: Vec<CompanyOutcome>,
}

impl RunResponse {
    fn new(run_id: String, outcomes: Vec<CompanyOutcome>) -> Self {
        let count = |status: JobStatus| outcomes.iter().filter(|o| o.status == status).count();
        Self {
            success: count(JobStatus::Success),
            partial_failure: count(JobStatus::PartialFailure),
            failed: count(JobStatus::Failed),
            run_id,
            outcomes,
        }
    }
}

/// GET /api/runs/latest - Outcomes of the most recent run
pub async fn latest_run(State(state): State<Arc<AppState>>) -> Result<Json<RunResponse>, AppError> {
    let run_id = state
        .db
        .latest_run_id()?
        .ok_or_else(|| AppError::not_found("No runs recorded yet"))?;
    let outcomes = state.db.list_run_outcomes(&run_id)?;
    Ok(Json(RunResponse::new(run_id, outcomes)))
}

/// GET /api/runs/:run_id - Outcomes of one run
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunResponse>, AppError> {
    let outcomes = state.db.list_run_outcomes(&run_id)?;
    if outcomes.is_empty() {
        return Err(AppError::not_found("Run not found"));
    }
    Ok(Json(RunResponse::new(run_id, outcomes)))
}
