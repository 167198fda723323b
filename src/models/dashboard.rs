//! Dashboard aggregation over recent analyses

use super::analysis::{AnalysisResult, Sentiment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of most recent analyses the dashboard looks at
pub const DASHBOARD_WINDOW: usize = 20;

/// Score reported when there is nothing to aggregate
pub const DEFAULT_HEALTH_SCORE: u8 = 100;

/// Compute a 0-100 health score from `(flag count, sentiment)` pairs
///
/// `max(0, 100 - 20 * avg_flags)`, minus 15 when strictly more than half of the
/// sentiments are negative, rounded. Empty input scores 100.
pub fn health_score<I>(entries: I) -> u8
where
    I: IntoIterator<Item = (usize, Sentiment)>,
{
    let mut count = 0usize;
    let mut total_flags = 0usize;
    let mut negatives = 0usize;

    for (flags, sentiment) in entries {
        count += 1;
        total_flags = total_flags.saturating_add(flags);
        if sentiment == Sentiment::Negative {
            negatives += 1;
        }
    }

    if count == 0 {
        return DEFAULT_HEALTH_SCORE;
    }

    let avg_flags = total_flags as f64 / count as f64;
    let mut score = (100.0 - avg_flags * 20.0).max(0.0);
    if negatives * 2 > count {
        score = (score - 15.0).max(0.0);
    }

    score.round().clamp(0.0, 100.0) as u8
}

/// How often one flag label occurred
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagCount {
    #[serde(rename = "type")]
    pub flag_type: String,
    pub count: usize,
}

/// Sentiment of one analysis, for the timeline chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub date: DateTime<Utc>,
    pub sentiment: Sentiment,
}

/// Aggregate statistics for `GET /api/dashboard`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    /// See [`health_score`]
    pub health_score: u8,
    /// Most frequent first
    pub flag_counts: Vec<FlagCount>,
    pub sentiment_timeline: Vec<TimelinePoint>,
    pub total_analyses: usize,
    /// Sum of flags across the window
    pub total_flags_detected: usize,
}

impl Default for DashboardData {
    fn default() -> Self {
        Self {
            health_score: DEFAULT_HEALTH_SCORE,
            flag_counts: Vec::new(),
            sentiment_timeline: Vec::new(),
            total_analyses: 0,
            total_flags_detected: 0,
        }
    }
}

impl DashboardData {
    /// Aggregate analyses given newest first
    ///
    /// The timeline keeps the input order. Flag counts are sorted by frequency
    /// (descending) then by label so ties are deterministic.
    pub fn from_analyses(analyses: &[AnalysisResult]) -> Self {
        if analyses.is_empty() {
            return Self::default();
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for analysis in analyses {
            for flag in &analysis.flags {
                *counts.entry(flag.flag_type.as_str()).or_default() += 1;
            }
        }

        let mut flag_counts: Vec<FlagCount> = counts
            .into_iter()
            .map(|(flag_type, count)| FlagCount {
                flag_type: flag_type.to_string(),
                count,
            })
            .collect();
        flag_counts.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.flag_type.cmp(&b.flag_type))
        });

        let total_flags_detected = analyses.iter().map(|a| a.flags.len()).sum();

        Self {
            health_score: health_score(analyses.iter().map(|a| (a.flags.len(), a.sentiment))),
            flag_counts,
            sentiment_timeline: analyses
                .iter()
                .map(|a| TimelinePoint {
                    date: a.created_at,
                    sentiment: a.sentiment,
                })
                .collect(),
            total_analyses: analyses.len(),
            total_flags_detected,
        }
    }
}
