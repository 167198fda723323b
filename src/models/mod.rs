//! Domain records
//!
//! Analysis requests/results, relationships with their flag history, and the
//! dashboard aggregate.

pub mod analysis;
pub mod dashboard;
pub mod relationship;
pub mod timestamp;

pub use analysis::{
    AnalysisRequest, AnalysisResult, EmotionalFlag, FlagType, MAX_TEXT_LENGTH, Sentiment,
};
pub use dashboard::{DashboardData, FlagCount, TimelinePoint, health_score};
pub use relationship::{FlagHistoryEntry, NewRelationship, Relationship};
