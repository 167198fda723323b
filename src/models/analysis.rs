//! Analysis request/result records and the emotional-flag taxonomy

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Maximum allowed message length in characters (100K chars)
pub const MAX_TEXT_LENGTH: usize = 100_000;

/// Incoming analysis request
///
/// Deserialization accepts any string; `validate()` is called by the pipeline
/// so an empty message maps to a 400 rather than a JSON rejection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisRequest {
    /// Message to analyse
    pub text: String,
    /// Optional background the model should take into account
    #[serde(default)]
    pub context: Option<String>,
    /// Relationship whose history this analysis is appended to
    #[serde(default)]
    pub relationship_id: Option<String>,
}

impl AnalysisRequest {
    /// Create a request with no context or relationship
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: None,
            relationship_id: None,
        }
    }

    /// Attach background context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Tag the request with a relationship id
    pub fn with_relationship(mut self, relationship_id: impl Into<String>) -> Self {
        self.relationship_id = Some(relationship_id.into());
        self
    }

    /// Context with blank values treated as absent
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Relationship id with blank values treated as absent
    pub fn relationship_id(&self) -> Option<&str> {
        self.relationship_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    /// Reject empty/whitespace-only or oversized text
    pub fn validate(&self) -> AppResult<()> {
        if self.text.trim().is_empty() {
            return Err(AppError::Validation(
                "text cannot be empty or contain only whitespace".to_string(),
            ));
        }

        // Count Unicode characters, not bytes
        let char_count = self.text.chars().count();
        if char_count > MAX_TEXT_LENGTH {
            return Err(AppError::Validation(format!(
                "text exceeds maximum length of {} characters (got {})",
                MAX_TEXT_LENGTH, char_count
            )));
        }

        Ok(())
    }
}

/// Overall sentiment of a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    /// Lenient conversion from model output; anything unrecognised is neutral
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }

    /// Lowercase label as stored and serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of unhealthy communication pattern
///
/// The taxonomy is open: labels the model invents are kept as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlagType {
    Gaslighting,
    GuiltTripping,
    BlameShifting,
    Invalidation,
    Stonewalling,
    PassiveAggression,
    ControllingBehavior,
    NonApology,
    Defensiveness,
    EmotionalManipulation,
    Other(String),
}

impl FlagType {
    /// Every label the prompt teaches the model
    pub const KNOWN: [FlagType; 10] = [
        FlagType::Gaslighting,
        FlagType::GuiltTripping,
        FlagType::BlameShifting,
        FlagType::Invalidation,
        FlagType::Stonewalling,
        FlagType::PassiveAggression,
        FlagType::ControllingBehavior,
        FlagType::NonApology,
        FlagType::Defensiveness,
        FlagType::EmotionalManipulation,
    ];

    /// Parse a label, folding case and `-`/space separators into `_`
    pub fn parse(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "gaslighting" => FlagType::Gaslighting,
            "guilt_tripping" => FlagType::GuiltTripping,
            "blame_shifting" => FlagType::BlameShifting,
            "invalidation" => FlagType::Invalidation,
            "stonewalling" => FlagType::Stonewalling,
            "passive_aggression" | "passive_aggressive" => FlagType::PassiveAggression,
            "controlling_behavior" | "controlling_behaviour" => FlagType::ControllingBehavior,
            "non_apology" => FlagType::NonApology,
            "defensiveness" => FlagType::Defensiveness,
            "emotional_manipulation" => FlagType::EmotionalManipulation,
            _ => FlagType::Other(label.trim().to_string()),
        }
    }

    /// Snake-case label
    pub fn as_str(&self) -> &str {
        match self {
            FlagType::Gaslighting => "gaslighting",
            FlagType::GuiltTripping => "guilt_tripping",
            FlagType::BlameShifting => "blame_shifting",
            FlagType::Invalidation => "invalidation",
            FlagType::Stonewalling => "stonewalling",
            FlagType::PassiveAggression => "passive_aggression",
            FlagType::ControllingBehavior => "controlling_behavior",
            FlagType::NonApology => "non_apology",
            FlagType::Defensiveness => "defensiveness",
            FlagType::EmotionalManipulation => "emotional_manipulation",
            FlagType::Other(label) => label,
        }
    }

    /// Whether this label belongs to the known taxonomy
    pub fn is_known(&self) -> bool {
        !matches!(self, FlagType::Other(_))
    }
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FlagType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FlagType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(FlagType::parse(&label))
    }
}

/// One detected pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalFlag {
    /// Flag category
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    /// What the pattern is, in the model's words
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Quoted text that triggered the flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    /// 0.0 (mild) to 1.0 (severe)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<f64>,
    /// Which side of a "their message / your response" transcript
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

/// Stored analysis record
///
/// Created once by the pipeline and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Unique id (UUID v4)
    pub id: String,
    /// Analysed message
    pub text: String,
    /// Context supplied with the request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Relationship the request was tagged with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_id: Option<String>,
    /// Detected red flags, in the order the model reported them
    #[serde(default)]
    pub flags: Vec<EmotionalFlag>,
    /// Overall sentiment
    pub sentiment: Sentiment,
    /// Plain-language reading of the message
    pub interpretation: String,
    /// Suggested ways to respond
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Words or phrases likely to provoke a reaction
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Dominant tone (enhanced schema)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_tone: Option<String>,
    /// Communication style (enhanced schema)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_style: Option<String>,
    /// Model confidence in [0.0, 1.0]; 0.0 for fallback results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    /// Maturity assessment, when the model provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_maturity_level: Option<String>,
    /// Relationship-level observations, when the model provides them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_insights: Option<String>,
    /// Present only on "analysis unavailable" results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    /// When the analysis finished
    #[serde(with = "super::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Whether this is an "analysis unavailable" result
    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }

    /// Flag labels in detection order
    pub fn flag_types(&self) -> Vec<String> {
        self.flags
            .iter()
            .map(|f| f.flag_type.as_str().to_string())
            .collect()
    }
}
