//! `GET /api/history`

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::models::AnalysisResult;
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Requested limit, defaulting to 10; outside 1..=50 is a 400
    pub fn limit(&self) -> AppResult<usize> {
        let limit = self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_HISTORY_LIMIT, limit
            )));
        }
        Ok(limit)
    }
}

/// Most recent analyses, newest first
///
/// Storage failures degrade to an empty list.
pub async fn handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<AnalysisResult>>> {
    let limit = query.limit()?;

    match state.store().recent_analyses(limit).await {
        Ok(analyses) => Ok(Json(analyses)),
        Err(e) => {
            tracing::error!(error = %e, limit = limit, "Failed to load analysis history");
            Ok(Json(Vec::new()))
        }
    }
}
