//! OpenAI-compatible chat-completion client
//!
//! Groq is the default provider, but any server that implements
//! `POST {base_url}/chat/completions` works.

use super::{ChatCompletion, ChatMessage, CompletionRequest, LlmError};
use crate::config::{ApiKey, LlmConfig};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Characters of an error body kept in error messages
const ERROR_PREVIEW_CHARS: usize = 200;

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for a hosted chat-completion API
pub struct GroqClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<ApiKey>,
    timeout_seconds: u64,
}

impl std::fmt::Debug for GroqClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl GroqClient {
    /// Build a client; a missing key is only reported when a call is made
    pub fn new(
        base_url: &str,
        api_key: Option<ApiKey>,
        timeout_seconds: u64,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .connect_timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| LlmError::Unexpected(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            timeout_seconds,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::new(
            config.base_url(),
            config.api_key().cloned(),
            config.request_timeout_seconds(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout {
                timeout_seconds: self.timeout_seconds,
            }
        } else if e.is_connect() || e.is_request() {
            LlmError::Connection(e.to_string())
        } else {
            LlmError::Unexpected(e.to_string())
        }
    }
}

/// Parse `Retry-After` as whole seconds, rounding fractional values up
///
/// HTTP-date values are not supported and yield `None`.
pub(crate) fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(secs);
    }
    let secs = raw.parse::<f64>().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| secs.ceil() as u64)
}

/// Pull `error.message` out of an OpenAI-style error body, else preview the raw text
fn error_message(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
        });

    from_json.unwrap_or_else(|| body.chars().take(ERROR_PREVIEW_CHARS).collect())
}

#[async_trait]
impl ChatCompletion for GroqClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let Some(api_key) = &self.api_key else {
            return Err(LlmError::MissingCredential);
        };

        if request.user_content().is_none_or(|c| c.trim().is_empty()) {
            return Err(LlmError::InvalidRequest(
                "user message cannot be empty".to_string(),
            ));
        }

        let body = ChatCompletionBody {
            model: &request.sampling.model,
            messages: &request.messages,
            temperature: request.sampling.temperature,
            max_tokens: request.sampling.max_tokens,
            top_p: request.sampling.top_p,
            stream: false,
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %request.sampling.model,
            message_count = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_seconds(response.headers());
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(
                        status = status.as_u16(),
                        error = %e,
                        "Failed to read provider error body"
                    );
                    String::new()
                }
            };
            let message = error_message(&text);

            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
                    retry_after_seconds: retry_after,
                },
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Unauthorized {
                    status: status.as_u16(),
                    message,
                },
                s if s.is_server_error() => LlmError::Server {
                    status: s.as_u16(),
                    message,
                },
                s => LlmError::Rejected {
                    status: s.as_u16(),
                    message,
                },
            });
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout {
                    timeout_seconds: self.timeout_seconds,
                }
            } else {
                LlmError::Unexpected(format!("undecodable completion response: {}", e))
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Unexpected("completion response has no content".to_string()))?;

        if content.trim().is_empty() {
            return Err(LlmError::Unexpected(
                "completion response content is empty".to_string(),
            ));
        }

        tracing::debug!(
            response_length = content.len(),
            "Chat completion received"
        );

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_retry_after_integer_seconds() {
        assert_eq!(retry_after_seconds(&headers("12")), Some(12));
    }

    #[test]
    fn test_retry_after_fractional_seconds_round_up() {
        assert_eq!(retry_after_seconds(&headers("1.2")), Some(2));
    }

    #[test]
    fn test_retry_after_http_date_ignored() {
        assert_eq!(
            retry_after_seconds(&headers("Wed, 21 Oct 2015 07:28:00 GMT")),
            None
        );
    }

    #[test]
    fn test_retry_after_missing() {
        assert_eq!(retry_after_seconds(&HeaderMap::new()), None);
    }

    #[test]
    fn test_error_message_prefers_openai_error_field() {
        let body = r#"{"error": {"message": "Invalid API Key", "type": "invalid_request_error"}}"#;
        assert_eq!(error_message(body), "Invalid API Key");
    }

    #[test]
    fn test_error_message_truncates_plain_text() {
        let body = "x".repeat(1000);
        assert_eq!(error_message(&body).len(), ERROR_PREVIEW_CHARS);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = GroqClient::new("https://api.groq.com/openai/v1/", None, 5).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let client = GroqClient::new("http://localhost", Some(ApiKey::new("gsk_secret")), 5).unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("gsk_secret"));
    }
}
