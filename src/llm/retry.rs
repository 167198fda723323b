//! Bounded retry around a `ChatCompletion`
//!
//! Each attempt calls the provider and hands the raw reply to an `accept`
//! closure (the normalizer). The loop stops on the first accepted reply, on a
//! fatal provider error, or after `max_retries` attempts in total.
//!
//! Backoff between attempts:
//! - connection, timeout, 5xx: `base * 2^(attempt-1)` (1s, 2s, 4s with the default base)
//! - unexpected provider failures and rejected replies: `base`
//! - no sleep after the final attempt

use super::{ChatCompletion, CompletionRequest, LlmError, RetryClass};
use crate::config::LlmConfig;
use crate::metrics::{AttemptResult, Metrics};
use crate::middleware::RequestId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default base backoff in milliseconds
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;
/// Cap on any single backoff
///
/// With the default base, attempt 6 would be 32s and is capped to 30s.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Attempt budget and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
    backoff_base_ms: u64,
}

impl RetryPolicy {
    /// # Errors
    /// Returns an error if `max_retries` is 0 (at least 1 attempt is required)
    pub fn new(max_retries: usize, backoff_base_ms: u64) -> Result<Self, &'static str> {
        if max_retries == 0 {
            return Err("max_retries must be at least 1");
        }
        Ok(Self {
            max_retries,
            backoff_base_ms,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, &'static str> {
        Self::new(config.max_retries(), config.retry_backoff_ms())
    }

    /// Total number of provider calls allowed
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn backoff_base_ms(&self) -> u64 {
        self.backoff_base_ms
    }

    /// Delay before the attempt after `attempt` (1-indexed); `None` for fatal errors
    pub fn delay_for(&self, class: RetryClass, attempt: usize) -> Option<Duration> {
        let ms = match class {
            RetryClass::Fatal => return None,
            RetryClass::Exponential => calculate_backoff(self.backoff_base_ms, attempt),
            RetryClass::Flat => self.backoff_base_ms.min(MAX_BACKOFF_MS),
        };
        Some(Duration::from_millis(ms))
    }
}

/// Exponential backoff with overflow protection
///
/// `base * 2^(attempt-1)` for a 1-indexed attempt, capped at [`MAX_BACKOFF_MS`].
pub fn calculate_backoff(base_ms: u64, attempt: usize) -> u64 {
    let exponent = u32::try_from(attempt)
        .unwrap_or(u32::MAX)
        .saturating_sub(1);
    base_ms
        .saturating_mul(2_u64.saturating_pow(exponent))
        .min(MAX_BACKOFF_MS)
}

/// Why one attempt did not produce a value
#[derive(Debug, Error)]
pub enum AttemptError<E> {
    /// The provider call itself failed
    #[error("{0}")]
    Provider(LlmError),
    /// The provider answered but `accept` rejected the reply
    #[error("reply rejected: {0}")]
    Rejected(E),
}

/// Terminal failure of the retry loop
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Non-retryable provider error; no further attempts were made
    #[error("{0}")]
    Fatal(LlmError),
    /// Every attempt failed; `last` is the final attempt's failure
    #[error("all {attempts} attempts failed, last error: {last}")]
    Exhausted {
        attempts: usize,
        last: AttemptError<E>,
    },
}

/// Accepted value and how many provider calls it took
#[derive(Debug)]
pub struct Completed<T> {
    pub value: T,
    pub attempts: usize,
}

/// Call `gateway` until `accept` takes a reply or the policy gives up
pub async fn execute_with_retry<T, E, F>(
    gateway: &dyn ChatCompletion,
    request: &CompletionRequest,
    policy: &RetryPolicy,
    request_id: RequestId,
    metrics: &Metrics,
    mut accept: F,
) -> Result<Completed<T>, RetryError<E>>
where
    F: FnMut(&str) -> Result<T, E>,
    E: fmt::Display,
{
    let max_retries = policy.max_retries();
    let mut attempt = 1;

    loop {
        tracing::debug!(
            request_id = %request_id,
            attempt = attempt,
            max_retries = max_retries,
            "Attempting LLM call"
        );

        let (failure, class) = match gateway.complete(request).await {
            Ok(raw) => match accept(&raw) {
                Ok(value) => {
                    metrics.observe_attempt(AttemptResult::Success);
                    tracing::info!(
                        request_id = %request_id,
                        attempt = attempt,
                        response_length = raw.len(),
                        "LLM reply accepted"
                    );
                    return Ok(Completed {
                        value,
                        attempts: attempt,
                    });
                }
                Err(rejection) => {
                    metrics.observe_attempt(AttemptResult::Unparseable);
                    tracing::warn!(
                        request_id = %request_id,
                        attempt = attempt,
                        max_retries = max_retries,
                        error = %rejection,
                        "LLM reply could not be normalized"
                    );
                    (AttemptError::Rejected(rejection), RetryClass::Flat)
                }
            },
            Err(error) => {
                let class = error.retry_class();
                if class == RetryClass::Fatal {
                    metrics.observe_attempt(AttemptResult::Fatal);
                    tracing::warn!(
                        request_id = %request_id,
                        attempt = attempt,
                        error = %error,
                        "LLM call failed with non-retryable error"
                    );
                    return Err(RetryError::Fatal(error));
                }

                metrics.observe_attempt(AttemptResult::Transient);
                tracing::warn!(
                    request_id = %request_id,
                    attempt = attempt,
                    max_retries = max_retries,
                    error = %error,
                    "LLM call failed"
                );
                (AttemptError::Provider(error), class)
            }
        };

        if attempt >= max_retries {
            tracing::error!(
                request_id = %request_id,
                max_retries = max_retries,
                last_error = %failure,
                "All LLM attempts exhausted"
            );
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: failure,
            });
        }

        if let Some(delay) = policy.delay_for(class, attempt) {
            tracing::debug!(
                request_id = %request_id,
                attempt = attempt,
                backoff_ms = delay.as_millis() as u64,
                "Backing off before next LLM attempt"
            );
            tokio::time::sleep(delay).await;
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_rejects_zero_retries() {
        assert!(RetryPolicy::new(0, 1000).is_err());
        assert!(RetryPolicy::new(1, 1000).is_ok());
    }

    #[test]
    fn test_policy_from_default_config() {
        let policy = RetryPolicy::from_config(&LlmConfig::default()).unwrap();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.backoff_base_ms(), DEFAULT_RETRY_BACKOFF_MS);
    }

    #[test]
    fn test_exponential_backoff_doubles() {
        assert_eq!(calculate_backoff(1000, 1), 1000);
        assert_eq!(calculate_backoff(1000, 2), 2000);
        assert_eq!(calculate_backoff(1000, 3), 4000);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        assert_eq!(calculate_backoff(1000, 6), MAX_BACKOFF_MS);
        assert_eq!(calculate_backoff(u64::MAX, 64), MAX_BACKOFF_MS);
        assert_eq!(calculate_backoff(1000, usize::MAX), MAX_BACKOFF_MS);
    }

    #[test]
    fn test_delay_for_each_class() {
        let policy = RetryPolicy::new(3, 1000).unwrap();
        assert_eq!(policy.delay_for(RetryClass::Fatal, 1), None);
        assert_eq!(
            policy.delay_for(RetryClass::Exponential, 2),
            Some(Duration::from_millis(2000))
        );
        assert_eq!(
            policy.delay_for(RetryClass::Flat, 2),
            Some(Duration::from_millis(1000))
        );
    }

    #[test]
    fn test_exponential_delays_strictly_increase_below_cap() {
        let policy = RetryPolicy::new(5, 500).unwrap();
        let delays: Vec<Duration> = (1..5)
            .filter_map(|a| policy.delay_for(RetryClass::Exponential, a))
            .collect();
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_exhausted_display_includes_last_error() {
        let err: RetryError<String> = RetryError::Exhausted {
            attempts: 3,
            last: AttemptError::Provider(LlmError::Server {
                status: 500,
                message: "boom".to_string(),
            }),
        };
        let text = err.to_string();
        assert!(text.contains("3 attempts"));
        assert!(text.contains("HTTP 500"));
    }

    #[test]
    fn test_rejected_reply_display_and_error_trait() {
        let err: RetryError<String> = RetryError::Exhausted {
            attempts: 2,
            last: AttemptError::Rejected("missing field sentiment".to_string()),
        };
        let dyn_err: &dyn std::error::Error = &err;
        assert_eq!(
            dyn_err.to_string(),
            "all 2 attempts failed, last error: reply rejected: missing field sentiment"
        );

        let fatal: RetryError<String> = RetryError::Fatal(LlmError::MissingCredential);
        assert_eq!(fatal.to_string(), LlmError::MissingCredential.to_string());
    }
}
