//! Analysis pipeline
//!
//! prompt -> provider call -> normalize (each attempt) -> map, or fallback on
//! exhaustion. Configuration, invalid-input and rate-limit failures end the
//! request with an error; everything else is retried.

use crate::config::{Config, ExhaustionPolicy};
use crate::error::{AppError, AppResult};
use crate::llm::{
    AttemptError, ChatCompletion, LlmError, RetryError, RetryPolicy, SamplingParams,
    execute_with_retry,
};
use crate::metrics::{Metrics, Outcome};
use crate::middleware::RequestId;
use crate::models::{AnalysisRequest, AnalysisResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

pub mod fallback;
pub mod mapper;
pub mod normalizer;
pub mod prompt;

pub use fallback::fallback_fields;
pub use mapper::map_result;
pub use normalizer::{NormalizationFailure, NormalizedAnalysis, normalize};
pub use prompt::PromptBuilder;

/// Which reply shape the model is asked for and validated against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    /// `sentiment`, `interpretation`
    Standard,
    /// Standard plus `emotional_tone`, `communication_style`
    #[default]
    Enhanced,
}

impl SchemaVersion {
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            SchemaVersion::Standard => &["sentiment", "interpretation"],
            SchemaVersion::Enhanced => &[
                "sentiment",
                "interpretation",
                "emotional_tone",
                "communication_style",
            ],
        }
    }
}

/// Runs one analysis end to end
///
/// Holds no per-request state; one instance is shared by all handlers.
pub struct AnalysisPipeline {
    gateway: Arc<dyn ChatCompletion>,
    prompts: PromptBuilder,
    sampling: SamplingParams,
    policy: RetryPolicy,
    on_exhaustion: ExhaustionPolicy,
    metrics: Arc<Metrics>,
}

impl AnalysisPipeline {
    pub fn new(
        gateway: Arc<dyn ChatCompletion>,
        config: &Config,
        metrics: Arc<Metrics>,
    ) -> AppResult<Self> {
        let policy = RetryPolicy::from_config(&config.llm)
            .map_err(|e| AppError::Config(format!("llm.max_retries: {}", e)))?;

        Ok(Self {
            gateway,
            prompts: PromptBuilder::new(config.analysis.schema),
            sampling: SamplingParams::from_config(&config.llm),
            policy,
            on_exhaustion: config.analysis.on_exhaustion,
            metrics,
        })
    }

    pub fn schema(&self) -> SchemaVersion {
        self.prompts.schema()
    }

    /// Analyze one message; records outcome and latency metrics
    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
        request_id: RequestId,
    ) -> AppResult<AnalysisResult> {
        let started = Instant::now();
        let result = self.run(request, request_id).await;

        let outcome = match &result {
            Ok((_, outcome)) => *outcome,
            Err(_) => Outcome::Error,
        };
        self.metrics
            .observe_analysis(outcome, started.elapsed().as_secs_f64() * 1000.0);

        result.map(|(analysis, _)| analysis)
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        request_id: RequestId,
    ) -> AppResult<(AnalysisResult, Outcome)> {
        request.validate()?;

        let completion = self.prompts.build(request, &self.sampling);
        let schema = self.schema();

        tracing::info!(
            request_id = %request_id,
            text_length = request.text.chars().count(),
            has_context = request.context().is_some(),
            schema = ?schema,
            "Starting analysis"
        );

        let attempt = execute_with_retry(
            self.gateway.as_ref(),
            &completion,
            &self.policy,
            request_id,
            &self.metrics,
            |raw| normalize(raw, schema),
        )
        .await;

        match attempt {
            Ok(done) => {
                let outcome = if done.value.repaired {
                    Outcome::Repaired
                } else {
                    Outcome::Parsed
                };
                tracing::info!(
                    request_id = %request_id,
                    attempts = done.attempts,
                    outcome = outcome.as_str(),
                    "Analysis completed"
                );
                Ok((map_result(&done.value.fields, request), outcome))
            }
            Err(RetryError::Fatal(error)) => Err(fatal_error(error)),
            Err(RetryError::Exhausted { attempts, last }) => {
                self.exhausted(request, request_id, attempts, last)
            }
        }
    }

    fn exhausted(
        &self,
        request: &AnalysisRequest,
        request_id: RequestId,
        attempts: usize,
        last: AttemptError<NormalizationFailure>,
    ) -> AppResult<(AnalysisResult, Outcome)> {
        let reason = match (&last, self.on_exhaustion) {
            (AttemptError::Rejected(failure), _) => {
                tracing::warn!(
                    request_id = %request_id,
                    attempts = attempts,
                    reason = %failure.reason,
                    raw_preview = %failure.raw_preview,
                    "No attempt produced a usable reply, returning fallback analysis"
                );
                failure.reason.clone()
            }
            (AttemptError::Provider(error), ExhaustionPolicy::Fallback) => {
                tracing::warn!(
                    request_id = %request_id,
                    attempts = attempts,
                    error = %error,
                    "LLM provider failed on every attempt, returning fallback analysis"
                );
                error.to_string()
            }
            (AttemptError::Provider(error), ExhaustionPolicy::Fail) => {
                return Err(if error.is_unavailability() {
                    AppError::UpstreamUnavailable {
                        attempts,
                        reason: error.to_string(),
                    }
                } else {
                    AppError::Internal(format!(
                        "Analysis failed after {} attempts: {}",
                        attempts, error
                    ))
                });
            }
        };

        Ok((
            map_result(&fallback_fields(&reason), request),
            Outcome::Fallback,
        ))
    }
}

/// Map a non-retryable provider error to its HTTP-facing form
fn fatal_error(error: LlmError) -> AppError {
    match error {
        LlmError::MissingCredential | LlmError::Unauthorized { .. } => {
            tracing::error!(error = %error, "LLM provider is not configured correctly");
            AppError::Config(error.to_string())
        }
        LlmError::InvalidRequest(message) => AppError::Validation(message),
        LlmError::RateLimited {
            retry_after_seconds,
        } => AppError::RateLimited {
            retry_after_seconds,
        },
        other => AppError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::llm::CompletionRequest;
    use std::str::FromStr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted replies, repeating the last one
    struct Scripted {
        replies: Mutex<Vec<Result<String, LlmError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn clone_reply(reply: &Result<String, LlmError>) -> Result<String, LlmError> {
        match reply {
            Ok(text) => Ok(text.clone()),
            Err(LlmError::Server { status, message }) => Err(LlmError::Server {
                status: *status,
                message: message.clone(),
            }),
            Err(LlmError::RateLimited {
                retry_after_seconds,
            }) => Err(LlmError::RateLimited {
                retry_after_seconds: *retry_after_seconds,
            }),
            Err(LlmError::MissingCredential) => Err(LlmError::MissingCredential),
            Err(other) => Err(LlmError::Unexpected(other.to_string())),
        }
    }

    #[async_trait]
    impl ChatCompletion for Scripted {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            let replies = self.replies.lock().unwrap();
            let reply = replies.get(index).or(replies.last()).unwrap();
            clone_reply(reply)
        }
    }

    fn config(extra: &str) -> Config {
        Config::from_str(&format!(
            "[server]\nhost = \"127.0.0.1\"\nport = 3000\n\n[llm]\nretry_backoff_ms = 0\n{}",
            extra
        ))
        .unwrap()
    }

    fn pipeline(gateway: Arc<Scripted>, config: &Config) -> AnalysisPipeline {
        AnalysisPipeline::new(gateway, config, Arc::new(Metrics::new().unwrap())).unwrap()
    }

    const GOOD: &str = r#"{"flags": [], "sentiment": "positive", "interpretation": "warm",
        "emotional_tone": "kind", "communication_style": "assertive"}"#;

    #[test]
    fn test_schema_version_parses_lowercase() {
        let config = config("\n[analysis]\nschema = \"standard\"\n");
        assert_eq!(config.analysis.schema, SchemaVersion::Standard);
        assert_eq!(SchemaVersion::default(), SchemaVersion::Enhanced);
    }

    #[tokio::test]
    async fn test_empty_text_makes_no_call() {
        let gateway = Scripted::new(vec![Ok(GOOD.to_string())]);
        let pipeline = pipeline(gateway.clone(), &config(""));

        let err = pipeline
            .analyze(&AnalysisRequest::new("   "), RequestId::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_valid_reply_maps_to_result() {
        let gateway = Scripted::new(vec![Ok(GOOD.to_string())]);
        let pipeline = pipeline(gateway.clone(), &config(""));

        let result = pipeline
            .analyze(&AnalysisRequest::new("Thanks!"), RequestId::new())
            .await
            .unwrap();

        assert_eq!(result.interpretation, "warm");
        assert!(!result.is_fallback());
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_reissued() {
        let gateway = Scripted::new(vec![
            Ok("I'd rather not.".to_string()),
            Ok(GOOD.to_string()),
        ]);
        let pipeline = pipeline(gateway.clone(), &config(""));

        let result = pipeline
            .analyze(&AnalysisRequest::new("hi"), RequestId::new())
            .await
            .unwrap();

        assert!(!result.is_fallback());
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_exhaustion_falls_back_even_in_fail_mode() {
        let gateway = Scripted::new(vec![Ok("no json here".to_string())]);
        let pipeline = pipeline(
            gateway.clone(),
            &config("\n[analysis]\non_exhaustion = \"fail\"\n"),
        );

        let result = pipeline
            .analyze(&AnalysisRequest::new("hi"), RequestId::new())
            .await
            .unwrap();

        assert!(result.is_fallback());
        assert_eq!(result.confidence_score, Some(0.0));
        assert_eq!(gateway.calls(), 3);
    }

    #[tokio::test]
    async fn test_server_error_exhaustion_fail_mode_is_503() {
        let gateway = Scripted::new(vec![Err(LlmError::Server {
            status: 502,
            message: "bad gateway".to_string(),
        })]);
        let pipeline = pipeline(
            gateway.clone(),
            &config("\n[analysis]\non_exhaustion = \"fail\"\n"),
        );

        let err = pipeline
            .analyze(&AnalysisRequest::new("hi"), RequestId::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UpstreamUnavailable { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_unexpected_error_exhaustion_fail_mode_is_internal() {
        let gateway = Scripted::new(vec![Err(LlmError::Unexpected("garbled".to_string()))]);
        let pipeline = pipeline(
            gateway.clone(),
            &config("\n[analysis]\non_exhaustion = \"fail\"\n"),
        );

        let err = pipeline
            .analyze(&AnalysisRequest::new("hi"), RequestId::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_not_retried() {
        let gateway = Scripted::new(vec![Err(LlmError::RateLimited {
            retry_after_seconds: Some(3),
        })]);
        let pipeline = pipeline(gateway.clone(), &config(""));

        let err = pipeline
            .analyze(&AnalysisRequest::new("hi"), RequestId::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::RateLimited {
                retry_after_seconds: Some(3)
            }
        ));
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_credential_is_config_error() {
        let gateway = Scripted::new(vec![Err(LlmError::MissingCredential)]);
        let pipeline = pipeline(gateway.clone(), &config(""));

        let err = pipeline
            .analyze(&AnalysisRequest::new("hi"), RequestId::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(gateway.calls(), 1);
    }
}
