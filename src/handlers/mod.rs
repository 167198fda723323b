//! HTTP request handlers for the myaei API

use crate::analysis::AnalysisPipeline;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::llm::{ChatCompletion, GroqClient};
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::storage::{self, AnalysisStore};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod analyze;
pub mod dashboard;
pub mod extractor;
pub mod health;
pub mod history;
pub mod metrics;
pub mod relationships;

pub use extractor::ApiJson;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pipeline: Arc<AnalysisPipeline>,
    store: Arc<dyn AnalysisStore>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create the production state: Groq client plus the configured store
    pub async fn new(config: Config) -> AppResult<Self> {
        let metrics = Arc::new(
            Metrics::new()
                .map_err(|e| AppError::Internal(format!("Failed to register metrics: {}", e)))?,
        );
        let gateway = GroqClient::from_config(&config.llm)
            .map_err(|e| AppError::Config(format!("Failed to build LLM client: {}", e)))?;
        let store = storage::connect(&config.storage).await?;

        tracing::info!(
            endpoint = %gateway.endpoint(),
            model = %config.llm.model(),
            storage = store.backend_name(),
            credential_configured = config.llm.api_key().is_some(),
            "Application state initialised"
        );

        Self::with_components(config, Arc::new(gateway), store, metrics)
    }

    /// Assemble state from explicit parts (tests inject a scripted gateway)
    pub fn with_components(
        config: Config,
        gateway: Arc<dyn ChatCompletion>,
        store: Arc<dyn AnalysisStore>,
        metrics: Arc<Metrics>,
    ) -> AppResult<Self> {
        let pipeline = AnalysisPipeline::new(gateway, &config, metrics.clone())?;
        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            store,
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pipeline(&self) -> &AnalysisPipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &dyn AnalysisStore {
        self.store.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Full application router with tracing, CORS and request-id layers
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health::handler))
        .route("/api/analyze", post(analyze::handler))
        .route("/api/analysis/{id}", get(analyze::get_handler))
        .route("/api/history", get(history::handler))
        .route("/api/dashboard", get(dashboard::handler))
        .route(
            "/api/relationships",
            post(relationships::create_handler).get(relationships::list_handler),
        )
        .route("/api/relationships/{id}", get(relationships::get_handler))
        .route("/metrics", get(metrics::handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(middleware::from_fn(request_id_middleware))
}


#[cfg(test)]
mod tests {
    use super::test_support::test_state;
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_appstate_is_clonable() {
        let state = test_state();
        let state2 = state.clone();
        assert_eq!(state2.config().server.port, 3000);
        assert_eq!(state2.store().backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_router_sets_request_id_header() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
