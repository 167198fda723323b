//! Tracked relationships and their analysis history

use super::analysis::{AnalysisResult, Sentiment};
use super::dashboard::health_score;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health score of a relationship with no history yet
pub const INITIAL_HEALTH_SCORE: u8 = 75;

/// Characters of the analysed text kept in a history entry
const EXCERPT_CHARS: usize = 30;

const MAX_NAME_LENGTH: usize = 200;

/// Body of `POST /api/relationships`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewRelationship {
    /// Display name, trimmed before storing
    pub name: String,
    /// Free-form kind, e.g. "partner" or "coworker"
    #[serde(rename = "type", default)]
    pub relationship_type: Option<String>,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewRelationship {
    /// Reject blank or overlong names
    pub fn validate(&self) -> AppResult<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation(
                "name cannot be empty or contain only whitespace".to_string(),
            ));
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(AppError::Validation(format!(
                "name exceeds maximum length of {} characters",
                MAX_NAME_LENGTH
            )));
        }
        Ok(())
    }
}

/// One analysis as remembered by a relationship
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagHistoryEntry {
    /// When the analysis was made
    pub date: DateTime<Utc>,
    /// First characters of the analysed text
    pub text_excerpt: String,
    /// Flag labels in detection order
    pub flags: Vec<String>,
    /// Sentiment of that analysis
    pub sentiment: Sentiment,
}

impl FlagHistoryEntry {
    /// Summarise a stored analysis for the history
    pub fn from_analysis(analysis: &AnalysisResult) -> Self {
        Self {
            date: analysis.created_at,
            text_excerpt: excerpt(&analysis.text),
            flags: analysis.flag_types(),
            sentiment: analysis.sentiment,
        }
    }
}

/// First 30 characters followed by "..."
fn excerpt(text: &str) -> String {
    let head: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", head)
}

/// A tracked relationship and its analysis history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// 0-100, recomputed from `flag_history` after each analysis
    pub health_score: u8,
    /// Date of the most recent analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contact: Option<DateTime<Utc>>,
    /// Sentiment of the most recent analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    /// Analyses in submission order
    #[serde(default)]
    pub flag_history: Vec<FlagHistoryEntry>,
    #[serde(with = "super::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Create a relationship with a fresh id and no history
    pub fn new(request: NewRelationship) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name.trim().to_string(),
            relationship_type: request.relationship_type,
            notes: request.notes,
            health_score: INITIAL_HEALTH_SCORE,
            last_contact: None,
            sentiment: None,
            flag_history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Append a history entry and refresh the derived fields
    pub fn record(&mut self, entry: FlagHistoryEntry) {
        self.last_contact = Some(entry.date);
        self.sentiment = Some(entry.sentiment);
        self.flag_history.push(entry);
        self.health_score = health_score(
            self.flag_history
                .iter()
                .map(|e| (e.flags.len(), e.sentiment)),
        );
    }
}
