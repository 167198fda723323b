//! Field map + request -> `AnalysisResult`
//!
//! Wrong types become defaults, never errors. Older reply shapes
//! (`overall_sentiment`, `suggested_reframe`) are still understood.

use crate::models::{AnalysisRequest, AnalysisResult, EmotionalFlag, FlagType, Sentiment};
use chrono::Utc;
use serde_json::{Map, Value};

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Number in 0.0..=1.0, also accepting numeric strings
fn unit_interval(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then(|| n.clamp(0.0, 1.0))
}

/// Array of strings; a lone string becomes a one-element list
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn map_flag(value: &Value) -> Option<EmotionalFlag> {
    match value {
        Value::String(label) if !label.trim().is_empty() => Some(EmotionalFlag {
            flag_type: FlagType::parse(label),
            description: None,
            evidence: None,
            severity: None,
            participant: None,
        }),
        Value::Object(obj) => {
            let label = obj.get("type").and_then(Value::as_str)?;
            if label.trim().is_empty() {
                return None;
            }
            Some(EmotionalFlag {
                flag_type: FlagType::parse(label),
                description: string_field(obj, "description"),
                evidence: string_field(obj, "evidence"),
                severity: obj.get("severity").and_then(unit_interval),
                participant: string_field(obj, "participant"),
            })
        }
        _ => None,
    }
}

fn map_flags(value: Option<&Value>) -> Vec<EmotionalFlag> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    let flags: Vec<EmotionalFlag> = items.iter().filter_map(map_flag).collect();
    if flags.len() < items.len() {
        tracing::debug!(
            dropped = items.len() - flags.len(),
            "Dropped malformed flag entries from LLM reply"
        );
    }
    flags
}

/// Build the stored record for `request` from normalized (or fallback) fields
pub fn map_result(fields: &Map<String, Value>, request: &AnalysisRequest) -> AnalysisResult {
    let sentiment = fields
        .get("sentiment")
        .or_else(|| fields.get("overall_sentiment"))
        .and_then(Value::as_str)
        .map(Sentiment::from_label)
        .unwrap_or_default();

    let mut suggestions = string_list(fields.get("suggestions"));
    if suggestions.is_empty() {
        suggestions = string_list(fields.get("suggested_reframe"));
    }

    AnalysisResult {
        id: uuid::Uuid::new_v4().to_string(),
        text: request.text.clone(),
        context: request.context().map(str::to_string),
        relationship_id: request.relationship_id().map(str::to_string),
        flags: map_flags(fields.get("flags")),
        sentiment,
        interpretation: string_field(fields, "interpretation").unwrap_or_default(),
        suggestions,
        triggers: string_list(fields.get("triggers")),
        emotional_tone: string_field(fields, "emotional_tone"),
        communication_style: string_field(fields, "communication_style"),
        confidence_score: fields.get("confidence_score").and_then(unit_interval),
        emotional_maturity_level: string_field(fields, "emotional_maturity_level"),
        relationship_insights: string_field(fields, "relationship_insights"),
        fallback_reason: string_field(fields, "fallback_reason"),
        created_at: Utc::now(),
    }
}
