//! Persistence for analyses and relationships
//!
//! Handlers only see the `AnalysisStore` trait. The in-memory backend is always
//! compiled; MongoDB is behind the `mongodb` cargo feature.

use crate::config::{StorageBackend, StorageConfig};
use crate::models::{AnalysisResult, FlagHistoryEntry, Relationship};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;

pub use memory::MemoryStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;

/// Errors from a storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage query failed: {0}")]
    Query(String),

    #[error("stored document could not be decoded: {0}")]
    Corrupt(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Document store for analysis results and relationships
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Backend name for logs
    fn backend_name(&self) -> &'static str;

    async fn insert_analysis(&self, analysis: &AnalysisResult) -> StorageResult<()>;

    async fn find_analysis(&self, id: &str) -> StorageResult<Option<AnalysisResult>>;

    /// Most recent analyses, newest first
    async fn recent_analyses(&self, limit: usize) -> StorageResult<Vec<AnalysisResult>>;

    async fn insert_relationship(&self, relationship: &Relationship) -> StorageResult<()>;

    async fn find_relationship(&self, id: &str) -> StorageResult<Option<Relationship>>;

    /// All relationships, oldest first
    async fn list_relationships(&self) -> StorageResult<Vec<Relationship>>;

    /// Append `entry` to a relationship's history and refresh its derived fields
    ///
    /// Returns `Ok(None)` when no relationship has that id.
    async fn record_relationship_analysis(
        &self,
        id: &str,
        entry: FlagHistoryEntry,
    ) -> StorageResult<Option<Relationship>>;
}

/// Open the backend selected in configuration
pub async fn connect(config: &StorageConfig) -> StorageResult<Arc<dyn AnalysisStore>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "mongodb")]
        StorageBackend::Mongodb => {
            let store = MongoStore::connect(&config.url, &config.database).await?;
            tracing::info!(database = %config.database, "Connected to MongoDB");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongodb"))]
        StorageBackend::Mongodb => Err(StorageError::Unavailable(
            "built without the `mongodb` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory_backend() {
        let store = connect(&StorageConfig::default()).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[cfg(not(feature = "mongodb"))]
    #[tokio::test]
    async fn test_connect_mongodb_without_feature_fails() {
        let config = StorageConfig {
            backend: StorageBackend::Mongodb,
            ..StorageConfig::default()
        };
        let result = connect(&config).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }
}
