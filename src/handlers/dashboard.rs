//! `GET /api/dashboard`

use crate::handlers::AppState;
use crate::models::DashboardData;
use crate::models::dashboard::DASHBOARD_WINDOW;
use axum::{Json, extract::State};

/// Aggregate statistics over the most recent analyses
///
/// Storage failures degrade to the empty dashboard (health score 100).
pub async fn handler(State(state): State<AppState>) -> Json<DashboardData> {
    match state.store().recent_analyses(DASHBOARD_WINDOW).await {
        Ok(analyses) => Json(DashboardData::from_analyses(&analyses)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load analyses for dashboard");
            Json(DashboardData::default())
        }
    }
}
