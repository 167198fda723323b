//! MongoDB storage backend
//!
//! Collections: `analyses` and `relationships`, both keyed by the `id` field
//! (MongoDB's own `_id` is ignored on read).

use super::{AnalysisStore, StorageError, StorageResult};
use crate::models::{AnalysisResult, FlagHistoryEntry, Relationship};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::{Client, Collection};

const ANALYSES: &str = "analyses";
const RELATIONSHIPS: &str = "relationships";

pub struct MongoStore {
    analyses: Collection<AnalysisResult>,
    relationships: Collection<Relationship>,
}

impl MongoStore {
    /// Connect and ping the server so misconfiguration fails at startup
    pub async fn connect(url: &str, database: &str) -> StorageResult<Self> {
        let client = Client::with_uri_str(url)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        let db = client.database(database);

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        Ok(Self {
            analyses: db.collection(ANALYSES),
            relationships: db.collection(RELATIONSHIPS),
        })
    }
}

fn query_error(e: mongodb::error::Error) -> StorageError {
    match e.kind.as_ref() {
        mongodb::error::ErrorKind::BsonDeserialization(_) => StorageError::Corrupt(e.to_string()),
        _ => StorageError::Query(e.to_string()),
    }
}

#[async_trait]
impl AnalysisStore for MongoStore {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    async fn insert_analysis(&self, analysis: &AnalysisResult) -> StorageResult<()> {
        self.analyses
            .insert_one(analysis)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn find_analysis(&self, id: &str) -> StorageResult<Option<AnalysisResult>> {
        self.analyses
            .find_one(doc! { "id": id })
            .await
            .map_err(query_error)
    }

    async fn recent_analyses(&self, limit: usize) -> StorageResult<Vec<AnalysisResult>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let cursor = self
            .analyses
            .find(doc! {})
            .sort(doc! { "created_at": -1 })
            .limit(limit)
            .await
            .map_err(query_error)?;
        cursor.try_collect().await.map_err(query_error)
    }

    async fn insert_relationship(&self, relationship: &Relationship) -> StorageResult<()> {
        self.relationships
            .insert_one(relationship)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn find_relationship(&self, id: &str) -> StorageResult<Option<Relationship>> {
        self.relationships
            .find_one(doc! { "id": id })
            .await
            .map_err(query_error)
    }

    async fn list_relationships(&self) -> StorageResult<Vec<Relationship>> {
        let cursor = self
            .relationships
            .find(doc! {})
            .sort(doc! { "created_at": 1 })
            .await
            .map_err(query_error)?;
        cursor.try_collect().await.map_err(query_error)
    }

    async fn record_relationship_analysis(
        &self,
        id: &str,
        entry: FlagHistoryEntry,
    ) -> StorageResult<Option<Relationship>> {
        // Read-modify-write without a version check; concurrent analyses for
        // the same relationship can drop a history entry.
        let Some(mut relationship) = self.find_relationship(id).await? else {
            return Ok(None);
        };

        relationship.record(entry);

        self.relationships
            .replace_one(doc! { "id": id }, &relationship)
            .await
            .map_err(query_error)?;

        Ok(Some(relationship))
    }
}
