//! myaei - emotional-intelligence analysis service
//!
//! Sends a message to a hosted LLM, turns the free-form reply into a
//! structured analysis (flags, sentiment, interpretation, suggestions), and
//! keeps a history of analyses per relationship.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod storage;
pub mod telemetry;
