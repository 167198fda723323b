//! JSON body extractor with API-shaped rejections
//!
//! Wraps Axum's `Json` extractor so malformed or incomplete bodies come back
//! as `400 {"error": "..."}` like every other validation failure, instead of
//! Axum's plain-text 415/422 responses.

use crate::error::AppError;
use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;

/// JSON extractor whose rejection is an [`AppError::Validation`]
///
/// # Example
///
/// ```ignore
/// pub async fn handler(
///     ApiJson(request): ApiJson<AnalysisRequest>,
/// ) -> AppResult<Json<AnalysisResult>> {
///     // A missing `text` field never reaches this point
/// }
/// ```
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection.body_text(), "Rejected request body");
                Err(rejection_to_error(&rejection))
            }
        }
    }
}

fn rejection_to_error(rejection: &JsonRejection) -> AppError {
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Content-Type must be application/json".to_string()
        }
        JsonRejection::JsonSyntaxError(_) => format!("Malformed JSON body: {}", rejection.body_text()),
        JsonRejection::JsonDataError(_) => format!("Invalid request body: {}", rejection.body_text()),
        // BytesRejection or future rejection types
        _ => rejection.body_text(),
    };
    AppError::Validation(message)
}
