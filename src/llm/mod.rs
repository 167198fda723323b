//! LLM gateway
//!
//! `ChatCompletion` is the seam between the analysis pipeline and the hosted
//! provider. `GroqClient` speaks the OpenAI-compatible `/chat/completions`
//! protocol; tests substitute scripted implementations.
//!
//! Provider failures are classified once, here, so the retry loop only has to
//! ask `LlmError::retry_class()`.

use async_trait::async_trait;
use serde::Serialize;

pub mod client;
pub mod retry;

pub use client::GroqClient;
pub use retry::{AttemptError, Completed, RetryError, RetryPolicy, execute_with_retry};

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    /// Who wrote the message
    pub role: Role,
    /// Message text
    pub content: String,
}

/// Author of a chat message, serialized lowercase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation
    System,
    /// The message being analysed
    User,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Model name and sampling parameters for a completion
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Provider model name (e.g. `llama-3.1-8b-instant`)
    pub model: String,
    /// Sampling temperature (0.0-2.0)
    pub temperature: f64,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Nucleus sampling threshold, in (0.0, 1.0]
    pub top_p: f64,
}

impl SamplingParams {
    /// Copy the model and sampling settings out of the LLM config
    pub fn from_config(config: &crate::config::LlmConfig) -> Self {
        Self {
            model: config.model().to_string(),
            temperature: config.temperature(),
            // Validated against u32::MAX at config load
            max_tokens: u32::try_from(config.max_tokens()).unwrap_or(u32::MAX),
            top_p: config.top_p(),
        }
    }
}

/// A fully-built completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System prompt followed by the user message
    pub messages: Vec<ChatMessage>,
    /// Model and sampling settings sent with the messages
    pub sampling: SamplingParams,
}

impl CompletionRequest {
    /// The last user message, if any
    pub fn user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Chat-completion provider
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Issue a single completion call and return the reply text
    ///
    /// Implementations never retry; that is `retry::execute_with_retry`'s job.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// How the retry loop treats an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Stop immediately, one attempt only
    Fatal,
    /// Retry after `base * 2^(attempt-1)`
    Exponential,
    /// Retry after `base`
    Flat,
}

/// Provider call failures
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// No API key configured
    #[error("LLM provider credential is not configured (set GROQ_API_KEY)")]
    MissingCredential,

    /// Request is unusable before it is sent (e.g. empty user message)
    #[error("invalid completion request: {0}")]
    InvalidRequest(String),

    /// HTTP 429
    #[error("LLM provider rate limit exceeded")]
    RateLimited { retry_after_seconds: Option<u64> },

    /// HTTP 401/403: credential rejected
    #[error("LLM provider rejected credential (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// Could not connect or the connection dropped
    #[error("connection to LLM provider failed: {0}")]
    Connection(String),

    /// Transport-level timeout
    #[error("LLM provider did not respond within {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    /// HTTP 5xx
    #[error("LLM provider server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Other non-success HTTP status
    #[error("LLM provider returned HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Anything else: undecodable body, no choices, empty content
    #[error("unexpected LLM provider failure: {0}")]
    Unexpected(String),
}

impl LlmError {
    /// Classify this error for the retry loop
    ///
    /// Credential, request and rate-limit problems are fatal; transport and
    /// 5xx failures back off exponentially; everything else backs off flat.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            LlmError::MissingCredential
            | LlmError::InvalidRequest(_)
            | LlmError::RateLimited { .. }
            | LlmError::Unauthorized { .. } => RetryClass::Fatal,
            LlmError::Connection(_) | LlmError::Timeout { .. } | LlmError::Server { .. } => {
                RetryClass::Exponential
            }
            LlmError::Rejected { .. } | LlmError::Unexpected(_) => RetryClass::Flat,
        }
    }

    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        self.retry_class() != RetryClass::Fatal
    }

    /// Connection, timeout or 5xx: the provider itself is unavailable
    pub fn is_unavailability(&self) -> bool {
        self.retry_class() == RetryClass::Exponential
    }
}
