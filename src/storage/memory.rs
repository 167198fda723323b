//! In-process storage backend

use super::{AnalysisStore, StorageResult};
use crate::models::{AnalysisResult, FlagHistoryEntry, Relationship};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Analyses and relationships held behind `tokio::sync::RwLock`s
///
/// Analyses are kept in insertion order so "most recent" is a reverse scan.
#[derive(Default)]
pub struct MemoryStore {
    analyses: RwLock<Vec<AnalysisResult>>,
    relationships: RwLock<Vec<Relationship>>,
    relationship_index: RwLock<HashMap<String, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert_analysis(&self, analysis: &AnalysisResult) -> StorageResult<()> {
        self.analyses.write().await.push(analysis.clone());
        Ok(())
    }

    async fn find_analysis(&self, id: &str) -> StorageResult<Option<AnalysisResult>> {
        let analyses = self.analyses.read().await;
        Ok(analyses.iter().find(|a| a.id == id).cloned())
    }

    async fn recent_analyses(&self, limit: usize) -> StorageResult<Vec<AnalysisResult>> {
        let analyses = self.analyses.read().await;
        let mut recent: Vec<AnalysisResult> = analyses.iter().rev().take(limit).cloned().collect();
        // Insertion order already approximates time order; sort for clock skew
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(recent)
    }

    async fn insert_relationship(&self, relationship: &Relationship) -> StorageResult<()> {
        // Lock order: relationships, then index
        let mut relationships = self.relationships.write().await;
        let mut index = self.relationship_index.write().await;
        index.insert(relationship.id.clone(), relationships.len());
        relationships.push(relationship.clone());
        Ok(())
    }

    async fn find_relationship(&self, id: &str) -> StorageResult<Option<Relationship>> {
        let relationships = self.relationships.read().await;
        let index = self.relationship_index.read().await;
        Ok(index.get(id).and_then(|&i| relationships.get(i)).cloned())
    }

    async fn list_relationships(&self) -> StorageResult<Vec<Relationship>> {
        Ok(self.relationships.read().await.clone())
    }

    async fn record_relationship_analysis(
        &self,
        id: &str,
        entry: FlagHistoryEntry,
    ) -> StorageResult<Option<Relationship>> {
        let mut relationships = self.relationships.write().await;
        let index = self.relationship_index.read().await;

        let Some(relationship) = index.get(id).and_then(|&i| relationships.get_mut(i)) else {
            return Ok(None);
        };

        relationship.record(entry);
        Ok(Some(relationship.clone()))
    }
}
