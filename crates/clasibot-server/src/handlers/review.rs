//! Next review date

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{AppError, AppState};

#[derive(Debug, Serialize)]
pub struct NextReviewResponse {
    pub next_review: DateTime<Utc>,
}

/// GET /api/next-review - When the next scheduled review is due
///
/// Stores and returns now + the review interval when nothing is stored yet.
pub async fn get_next_review(
    State(state): State<Arc<AppState>>,
) -> Result<Json<NextReviewResponse>, AppError> {
    let next_review = state
        .db
        .get_or_init_next_review(state.config.review_interval_days)?;
    Ok(Json(NextReviewResponse { next_review }))
}
