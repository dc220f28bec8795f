use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{
    Collection, Credentials, Document, NewUser, ProfileUpdate, ResetToken, User, SYSTEM_FIELDS,
};
use crate::filter::Filter;

/// Capability interface every collection offers to the generic handlers.
/// Documents cross this boundary with hidden fields already removed.
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn collection(&self) -> &'static Collection;

    async fn find(&self, query: &Filter) -> Result<Vec<Document>, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>, DatabaseError>;

    async fn create(&self, doc: Document) -> Result<Document, DatabaseError>;

    async fn update_by_id(&self, id: Uuid, changes: Document) -> Result<Option<Document>, DatabaseError>;

    async fn delete_by_id(&self, id: Uuid) -> Result<Option<Document>, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    /// Fresh query handle for this collection.
    fn query(&self) -> Result<Filter, DatabaseError> {
        Ok(self.collection().query()?)
    }
}

/// Principal lookups and credential writes used by the auth chain.
/// Deactivated principals are invisible to every method.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    async fn find_credentials_by_id(&self, id: Uuid) -> Result<Option<Credentials>, DatabaseError>;

    async fn find_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>, DatabaseError>;

    /// Principal holding `token_hash` whose reset window is still open at `now`.
    async fn find_by_reset_token(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>, DatabaseError>;

    async fn insert(&self, user: NewUser) -> Result<User, DatabaseError>;

    /// Replaces the credential hash, stamps the change time and clears any
    /// pending reset token.
    async fn set_password(&self, id: Uuid, password_hash: &str, changed_at: DateTime<Utc>) -> Result<(), DatabaseError>;

    /// Stores or clears the pending reset token.
    async fn set_reset_token(&self, id: Uuid, reset: Option<ResetToken>) -> Result<(), DatabaseError>;

    async fn update_profile(&self, id: Uuid, changes: ProfileUpdate) -> Result<Option<User>, DatabaseError>;

    async fn deactivate(&self, id: Uuid) -> Result<(), DatabaseError>;
}

/// Timestamp representation used inside documents.
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Assigns the store-owned fields of a new document and drops unknown keys.
pub fn prepare_insert(collection: &Collection, mut doc: Document, now: DateTime<Utc>) -> Document {
    for field in SYSTEM_FIELDS {
        doc.remove(*field);
    }
    collection.retain_known(&mut doc);
    doc.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
    doc.insert("createdAt".to_string(), timestamp_value(now));
    doc.insert("version".to_string(), Value::from(0));
    doc
}

/// Shapes a stored document for callers: hidden fields go, then the
/// query's projection applies.
pub fn project(collection: &Collection, query: &Filter, mut doc: Document) -> Document {
    collection.strip_hidden(&mut doc);
    let select = query.select_columns();
    if !select.is_empty() {
        doc.retain(|key, _| select.iter().any(|c| c == key));
    }
    for column in query.exclude_columns() {
        doc.remove(column);
    }
    doc
}

/// Drops store-owned and unknown keys from an update.
pub fn prepare_update(collection: &Collection, mut changes: Document) -> Document {
    for field in SYSTEM_FIELDS {
        changes.remove(*field);
    }
    collection.retain_known(&mut changes);
    changes
}
