//! Relationship endpoints

use crate::error::{AppError, AppResult};
use crate::handlers::{ApiJson, AppState};
use crate::middleware::RequestId;
use crate::models::{NewRelationship, Relationship};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

/// `POST /api/relationships`
pub async fn create_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    ApiJson(request): ApiJson<NewRelationship>,
) -> AppResult<(StatusCode, Json<Relationship>)> {
    request.validate()?;

    let relationship = Relationship::new(request);
    state.store().insert_relationship(&relationship).await?;

    tracing::info!(
        request_id = %request_id,
        relationship_id = %relationship.id,
        "Relationship created"
    );

    Ok((StatusCode::CREATED, Json(relationship)))
}

/// `GET /api/relationships`
pub async fn list_handler(State(state): State<AppState>) -> AppResult<Json<Vec<Relationship>>> {
    Ok(Json(state.store().list_relationships().await?))
}

/// `GET /api/relationships/{id}`
pub async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Relationship>> {
    state
        .store()
        .find_relationship(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Relationship".to_string()))
}
