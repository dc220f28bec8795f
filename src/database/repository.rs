use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::manager::{health_check, DatabaseError};
use crate::database::models::{Collection, Document};
use crate::database::query_builder::QueryBuilder;
use crate::database::store::{prepare_insert, prepare_update, project, RecordStore};
use crate::filter::Filter;

/// Postgres-backed record store for one collection.
pub struct Repository {
    collection: &'static Collection,
    pool: PgPool,
}

impl Repository {
    pub fn new(collection: &'static Collection, pool: PgPool) -> Self {
        Self { collection, pool }
    }

    fn builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.collection)
    }

    fn visible(&self, doc: Document) -> Document {
        let mut doc = doc;
        self.collection.strip_hidden(&mut doc);
        doc
    }
}

#[async_trait]
impl RecordStore for Repository {
    fn collection(&self) -> &'static Collection {
        self.collection
    }

    async fn find(&self, query: &Filter) -> Result<Vec<Document>, DatabaseError> {
        let docs = self.builder().fetch_documents(&self.pool, query).await?;
        Ok(docs.into_iter().map(|doc| project(self.collection, query, doc)).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>, DatabaseError> {
        let mut query = self.collection.query()?;
        query.where_clause(serde_json::json!({ "id": id.to_string() }))?;
        let mut docs = self.builder().fetch_documents(&self.pool, &query).await?;
        Ok(docs.pop().map(|doc| self.visible(doc)))
    }

    async fn create(&self, doc: Document) -> Result<Document, DatabaseError> {
        let doc = prepare_insert(self.collection, doc, Utc::now());
        let created = self.builder().insert_document(&self.pool, &doc).await?;
        tracing::debug!("Created {} document {:?}", self.collection.name, created.get("id"));
        Ok(self.visible(created))
    }

    async fn update_by_id(&self, id: Uuid, changes: Document) -> Result<Option<Document>, DatabaseError> {
        let changes = prepare_update(self.collection, changes);
        let updated = self.builder().update_document(&self.pool, id, &changes).await?;
        Ok(updated.map(|doc| self.visible(doc)))
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<Option<Document>, DatabaseError> {
        let deleted = self.builder().delete_document(&self.pool, id).await?;
        if deleted.is_some() {
            tracing::debug!("Deleted {} document {}", self.collection.name, id);
        }
        Ok(deleted.map(|doc| self.visible(doc)))
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        health_check(&self.pool).await
    }
}
