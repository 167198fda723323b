//! Analysis endpoints
//!
//! `POST /api/analyze` runs the pipeline and stores the result;
//! `GET /api/analysis/{id}` reads a stored result back.

use crate::error::{AppError, AppResult};
use crate::handlers::{ApiJson, AppState};
use crate::middleware::RequestId;
use crate::models::{AnalysisRequest, AnalysisResult, FlagHistoryEntry};
use axum::{
    Extension, Json,
    extract::{Path, State},
};

/// Analyze one message
///
/// The pipeline runs to completion; its duration is bounded by the
/// transport timeout and the retry budget.
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    ApiJson(request): ApiJson<AnalysisRequest>,
) -> AppResult<Json<AnalysisResult>> {
    let result = state.pipeline().analyze(&request, request_id).await?;

    state.store().insert_analysis(&result).await.map_err(|e| {
        tracing::error!(
            request_id = %request_id,
            analysis_id = %result.id,
            error = %e,
            "Failed to store analysis result"
        );
        AppError::from(e)
    })?;

    if let Some(relationship_id) = result.relationship_id.as_deref() {
        link_to_relationship(&state, request_id, relationship_id, &result).await;
    }

    Ok(Json(result))
}

/// Append the analysis to its relationship's history
///
/// Unknown ids and storage failures are logged; the analysis itself already
/// succeeded.
async fn link_to_relationship(
    state: &AppState,
    request_id: RequestId,
    relationship_id: &str,
    result: &AnalysisResult,
) {
    let entry = FlagHistoryEntry::from_analysis(result);
    match state
        .store()
        .record_relationship_analysis(relationship_id, entry)
        .await
    {
        Ok(Some(relationship)) => tracing::debug!(
            request_id = %request_id,
            relationship_id = %relationship_id,
            health_score = relationship.health_score,
            "Relationship history updated"
        ),
        Ok(None) => tracing::warn!(
            request_id = %request_id,
            relationship_id = %relationship_id,
            "Analysis referenced an unknown relationship"
        ),
        Err(e) => tracing::error!(
            request_id = %request_id,
            relationship_id = %relationship_id,
            error = %e,
            "Failed to update relationship history"
        ),
    }
}

/// Fetch a stored analysis by id
pub async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<AnalysisResult>> {
    state
        .store()
        .find_analysis(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Analysis".to_string()))
}
