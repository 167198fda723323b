//! "Analysis unavailable" payload

use serde_json::{Map, Value, json};

pub const FALLBACK_INTERPRETATION: &str =
    "Analysis unavailable: the message could not be analyzed right now. Please try again later.";
pub const FALLBACK_TONE: &str = "unavailable";

/// Longest `fallback_reason` kept, in characters
pub const MAX_REASON_CHARS: usize = 200;

/// Neutral result fields satisfying every schema version's required set
pub fn fallback_fields(reason: &str) -> Map<String, Value> {
    let reason: String = reason.chars().take(MAX_REASON_CHARS).collect();

    let value = json!({
        "flags": [],
        "sentiment": "neutral",
        "interpretation": FALLBACK_INTERPRETATION,
        "suggestions": [],
        "triggers": [],
        "emotional_tone": FALLBACK_TONE,
        "communication_style": FALLBACK_TONE,
        "confidence_score": 0.0,
        "fallback_reason": reason,
    });

    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
