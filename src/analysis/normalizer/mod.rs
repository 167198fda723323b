//! Turns a free-form LLM reply into a validated field map
//!
//! Strategies, first success wins:
//! 1. strip a markdown code fence and parse strictly
//! 2. extract the span from the first `{` to the last `}` of the raw reply and parse that
//!
//! A strictly parsed object that already has every required field is returned
//! unchanged.

use super::SchemaVersion;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Characters of the raw reply kept in a `NormalizationFailure`
pub const RAW_PREVIEW_CHARS: usize = 200;

/// Greedy: first `{` to last `}`
static JSON_OBJECT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").ok());

/// A reply that could not be turned into a valid field map
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason}")]
pub struct NormalizationFailure {
    pub reason: String,
    /// First 200 characters of the raw reply
    pub raw_preview: String,
}

impl NormalizationFailure {
    fn new(reason: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: reason.into(),
            raw_preview: raw.chars().take(RAW_PREVIEW_CHARS).collect(),
        }
    }
}

/// Result of one parsing strategy
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Valid object with every required field
    Parsed(Map<String, Value>),
    /// Not usable as-is; the next strategy should try
    NeedsRepair(String),
    /// Nothing left to try
    Failed(NormalizationFailure),
}

/// Validated fields plus whether a repair strategy was needed
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAnalysis {
    pub fields: Map<String, Value>,
    pub repaired: bool,
}

/// Remove a surrounding triple-backtick fence, with or without a language tag
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Language tag runs to the end of the fence line
    let body = match rest.find('\n') {
        Some(nl) if !rest[..nl].trim_start().starts_with('{') => &rest[nl + 1..],
        _ => rest.strip_prefix("json").unwrap_or(rest),
    };

    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Required fields missing or null in `fields`
pub fn missing_fields(fields: &Map<String, Value>, schema: SchemaVersion) -> Vec<&'static str> {
    schema
        .required_fields()
        .iter()
        .copied()
        .filter(|f| fields.get(*f).is_none_or(Value::is_null))
        .collect()
}

fn validate(value: Value, schema: SchemaVersion) -> Result<Map<String, Value>, String> {
    let Value::Object(fields) = value else {
        return Err("reply is not a JSON object".to_string());
    };

    let missing = missing_fields(&fields, schema);
    if missing.is_empty() {
        Ok(fields)
    } else {
        Err(format!("missing required fields: {}", missing.join(", ")))
    }
}

/// Strategy 1: fence-stripped strict parse
pub fn parse_strict(raw: &str, schema: SchemaVersion) -> ParseOutcome {
    let cleaned = strip_code_fence(raw);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => match validate(value, schema) {
            Ok(fields) => ParseOutcome::Parsed(fields),
            Err(reason) => ParseOutcome::NeedsRepair(reason),
        },
        Err(e) => ParseOutcome::NeedsRepair(format!("invalid JSON: {}", e)),
    }
}

/// Strategy 2: pull the outermost brace span out of the raw reply
pub fn parse_extracted(raw: &str, schema: SchemaVersion) -> ParseOutcome {
    let Some(candidate) = JSON_OBJECT
        .as_ref()
        .and_then(|re| re.find(raw))
        .map(|m| m.as_str())
    else {
        return ParseOutcome::Failed(NormalizationFailure::new(
            "no JSON object found in reply",
            raw,
        ));
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => match validate(value, schema) {
            Ok(fields) => ParseOutcome::Parsed(fields),
            Err(reason) => ParseOutcome::Failed(NormalizationFailure::new(reason, raw)),
        },
        Err(e) => ParseOutcome::Failed(NormalizationFailure::new(
            format!("extracted text is not valid JSON: {}", e),
            raw,
        )),
    }
}

/// Run every strategy in order
pub fn normalize(
    raw: &str,
    schema: SchemaVersion,
) -> Result<NormalizedAnalysis, NormalizationFailure> {
    let strict_reason = match parse_strict(raw, schema) {
        ParseOutcome::Parsed(fields) => {
            return Ok(NormalizedAnalysis {
                fields,
                repaired: false,
            });
        }
        ParseOutcome::NeedsRepair(reason) => reason,
        ParseOutcome::Failed(failure) => return Err(failure),
    };

    tracing::debug!(
        reason = %strict_reason,
        raw_length = raw.len(),
        "Strict parse failed, extracting JSON object from reply"
    );

    match parse_extracted(raw, schema) {
        ParseOutcome::Parsed(fields) => Ok(NormalizedAnalysis {
            fields,
            repaired: true,
        }),
        ParseOutcome::NeedsRepair(reason) => Err(NormalizationFailure::new(reason, raw)),
        ParseOutcome::Failed(failure) => Err(failure),
    }
}
