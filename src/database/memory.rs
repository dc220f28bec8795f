//! In-process stores with the same observable behavior as the Postgres ones:
//! scoping, hidden fields, unique keys and the condition language all apply.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{
    Collection, Credentials, Document, NewUser, ProfileUpdate, ResetToken, User, UserRecord, USERS,
};
use crate::database::store::{prepare_insert, prepare_update, project, PrincipalStore, RecordStore};
use crate::filter::types::{FilterOp, SortDirection};
use crate::filter::Filter;

pub type SharedDocuments = Arc<RwLock<Vec<Document>>>;

pub struct MemoryRecordStore {
    collection: &'static Collection,
    docs: SharedDocuments,
}

impl MemoryRecordStore {
    pub fn new(collection: &'static Collection) -> Self {
        Self::shared(collection, SharedDocuments::default())
    }

    pub fn shared(collection: &'static Collection, docs: SharedDocuments) -> Self {
        Self { collection, docs }
    }

    pub fn documents(&self) -> SharedDocuments {
        self.docs.clone()
    }

    fn in_scope(&self, doc: &Document) -> bool {
        self.collection
            .scope_conditions()
            .map(|scope| matches(doc, &scope))
            .unwrap_or(true)
    }

    fn visible(&self, mut doc: Document) -> Document {
        self.collection.strip_hidden(&mut doc);
        doc
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn collection(&self) -> &'static Collection {
        self.collection
    }

    async fn find(&self, query: &Filter) -> Result<Vec<Document>, DatabaseError> {
        let scoped = self.collection.scoped(query)?;
        let docs = self.docs.read().await;

        let mut found: Vec<&Document> = docs
            .iter()
            .filter(|doc| scoped.where_data().map(|w| matches(doc, w)).unwrap_or(true))
            .collect();

        let order = scoped.order_data();
        if !order.is_empty() {
            found.sort_by(|a, b| {
                order
                    .iter()
                    .map(|info| {
                        let ordering = sort_cmp(a.get(&info.column), b.get(&info.column));
                        match info.sort {
                            SortDirection::Asc => ordering,
                            SortDirection::Desc => ordering.reverse(),
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let skip = window(scoped.offset_value()).unwrap_or(0);
        let take = window(scoped.limit_value()).unwrap_or(usize::MAX);
        Ok(found
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|doc| project(self.collection, query, doc.clone()))
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>, DatabaseError> {
        let docs = self.docs.read().await;
        Ok(docs
            .iter()
            .find(|doc| has_id(doc, id) && self.in_scope(doc))
            .map(|doc| self.visible(doc.clone())))
    }

    async fn create(&self, doc: Document) -> Result<Document, DatabaseError> {
        let doc = prepare_insert(self.collection, doc, Utc::now());
        let mut docs = self.docs.write().await;
        check_unique(self.collection, &docs, &doc, None)?;
        docs.push(doc.clone());
        Ok(self.visible(doc))
    }

    async fn update_by_id(&self, id: Uuid, changes: Document) -> Result<Option<Document>, DatabaseError> {
        let changes = prepare_update(self.collection, changes);
        let mut docs = self.docs.write().await;
        let Some(index) = docs.iter().position(|doc| has_id(doc, id) && self.in_scope(doc)) else {
            return Ok(None);
        };

        let mut updated = docs[index].clone();
        for (key, value) in changes {
            updated.insert(key, value);
        }
        bump_version(&mut updated);
        check_unique(self.collection, &docs, &updated, Some(id))?;
        docs[index] = updated.clone();
        Ok(Some(self.visible(updated)))
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<Option<Document>, DatabaseError> {
        let mut docs = self.docs.write().await;
        let Some(index) = docs.iter().position(|doc| has_id(doc, id) && self.in_scope(doc)) else {
            return Ok(None);
        };
        Ok(Some(self.visible(docs.remove(index))))
    }
}

/// Principal store sharing the user documents of a [`MemoryRecordStore`].
pub struct MemoryPrincipalStore {
    docs: SharedDocuments,
}

impl MemoryPrincipalStore {
    pub fn new(docs: SharedDocuments) -> Self {
        Self { docs }
    }

    async fn find_record<F>(&self, predicate: F) -> Result<Option<UserRecord>, DatabaseError>
    where
        F: Fn(&UserRecord) -> bool + Send,
    {
        let docs = self.docs.read().await;
        for doc in docs.iter() {
            let record: UserRecord = serde_json::from_value(Value::Object(doc.clone()))?;
            if record.active && predicate(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Applies `change` to the stored document of an active user.
    async fn modify<F>(&self, id: Uuid, change: F) -> Result<Option<Document>, DatabaseError>
    where
        F: FnOnce(&mut Document) + Send,
    {
        let mut docs = self.docs.write().await;
        let Some(index) = docs
            .iter()
            .position(|doc| has_id(doc, id) && doc.get("active") != Some(&Value::Bool(false)))
        else {
            return Ok(None);
        };
        let mut updated = docs[index].clone();
        change(&mut updated);
        bump_version(&mut updated);
        check_unique(&USERS, &docs, &updated, Some(id))?;
        docs[index] = updated.clone();
        Ok(Some(updated))
    }
}

#[async_trait]
impl PrincipalStore for MemoryPrincipalStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.find_record(|r| r.id == id).await?.map(UserRecord::into_user))
    }

    async fn find_credentials_by_id(&self, id: Uuid) -> Result<Option<Credentials>, DatabaseError> {
        Ok(self.find_record(|r| r.id == id).await?.map(UserRecord::into_credentials))
    }

    async fn find_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>, DatabaseError> {
        let record = self.find_record(|r| r.email == email).await?;
        Ok(record.map(UserRecord::into_credentials))
    }

    async fn find_by_reset_token(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        let record = self
            .find_record(|r| {
                r.password_reset_token.as_deref() == Some(token_hash)
                    && r.password_reset_expires.map(|at| at > now).unwrap_or(false)
            })
            .await?;
        Ok(record.map(UserRecord::into_user))
    }

    async fn insert(&self, user: NewUser) -> Result<User, DatabaseError> {
        let record = user.into_record(Utc::now());
        let mut doc = match serde_json::to_value(&record)? {
            Value::Object(doc) => doc,
            _ => return Err(DatabaseError::QueryError("user record is not an object".to_string())),
        };
        doc.insert("version".to_string(), json!(0));

        let mut docs = self.docs.write().await;
        check_unique(&USERS, &docs, &doc, None)?;
        docs.push(doc);
        Ok(record.into_user())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str, changed_at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let changed_at = serde_json::to_value(changed_at)?;
        self.modify(id, |doc| {
            doc.insert("password".to_string(), json!(password_hash));
            doc.insert("passwordChangedAt".to_string(), changed_at);
            doc.insert("passwordResetToken".to_string(), Value::Null);
            doc.insert("passwordResetExpires".to_string(), Value::Null);
        })
        .await?;
        Ok(())
    }

    async fn set_reset_token(&self, id: Uuid, reset: Option<ResetToken>) -> Result<(), DatabaseError> {
        let (token_hash, expires_at) = match reset {
            Some(reset) => (json!(reset.token_hash), serde_json::to_value(reset.expires_at)?),
            None => (Value::Null, Value::Null),
        };
        self.modify(id, |doc| {
            doc.insert("passwordResetToken".to_string(), token_hash);
            doc.insert("passwordResetExpires".to_string(), expires_at);
        })
        .await?;
        Ok(())
    }

    async fn update_profile(&self, id: Uuid, changes: ProfileUpdate) -> Result<Option<User>, DatabaseError> {
        let updated = self
            .modify(id, |doc| {
                if let Some(name) = changes.name {
                    doc.insert("name".to_string(), json!(name));
                }
                if let Some(email) = changes.email {
                    doc.insert("email".to_string(), json!(email));
                }
                if let Some(photo) = changes.photo {
                    doc.insert("photo".to_string(), json!(photo));
                }
            })
            .await?;
        match updated {
            Some(doc) => {
                let record: UserRecord = serde_json::from_value(Value::Object(doc))?;
                Ok(Some(record.into_user()))
            }
            None => Ok(None),
        }
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.modify(id, |doc| {
            doc.insert("active".to_string(), json!(false));
        })
        .await?;
        tracing::info!("Deactivated user {}", id);
        Ok(())
    }
}

fn window(value: Option<u64>) -> Option<usize> {
    value.map(|v| usize::try_from(v).unwrap_or(usize::MAX))
}

fn has_id(doc: &Document, id: Uuid) -> bool {
    doc.get("id").and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok()) == Some(id)
}

fn bump_version(doc: &mut Document) {
    let next = doc.get("version").and_then(Value::as_i64).unwrap_or(0) + 1;
    doc.insert("version".to_string(), json!(next));
}

fn check_unique(
    collection: &Collection,
    docs: &[Document],
    candidate: &Document,
    ignore: Option<Uuid>,
) -> Result<(), DatabaseError> {
    for key in collection.unique {
        let values: Vec<&Value> = key.iter().filter_map(|field| candidate.get(*field)).collect();
        if values.len() != key.len() || values.iter().any(|v| v.is_null()) {
            continue;
        }
        let clash = docs.iter().any(|doc| {
            ignore.map(|id| !has_id(doc, id)).unwrap_or(true)
                && key.iter().zip(&values).all(|(field, value)| doc.get(*field) == Some(*value))
        });
        if clash {
            let shown: Vec<String> = values.iter().map(|v| text_form(v)).collect();
            return Err(DatabaseError::Duplicate(shown.join(", ")));
        }
    }
    Ok(())
}

/// Evaluates a condition document against a stored document.
pub fn matches(doc: &Document, conditions: &Value) -> bool {
    let Value::Object(obj) = conditions else { return conditions.is_null() };
    obj.iter().all(|(key, value)| match key.as_str() {
        "$and" => value.as_array().map(|all| all.iter().all(|c| matches(doc, c))).unwrap_or(false),
        "$or" => value.as_array().map(|any| any.iter().any(|c| matches(doc, c))).unwrap_or(false),
        "$not" => !matches(doc, value),
        field => field_matches(doc.get(field), value),
    })
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> bool {
    match condition {
        Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
            ops.iter().all(|(op, expected)| match FilterOp::parse(op) {
                Some(op) => apply(op, actual, expected),
                None => false,
            })
        }
        expected => apply(FilterOp::Eq, actual, expected),
    }
}

fn apply(op: FilterOp, actual: Option<&Value>, expected: &Value) -> bool {
    match op {
        FilterOp::Eq => values_equal(actual, expected),
        FilterOp::Ne => !values_equal(actual, expected),
        FilterOp::Gt => compare(actual, expected) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => compare(actual, expected) == Some(Ordering::Less),
        FilterOp::Lte => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::In | FilterOp::NIn => {
            let candidates = match expected {
                Value::Array(all) => all.as_slice(),
                single => std::slice::from_ref(single),
            };
            let found = candidates.iter().any(|c| values_equal(actual, c));
            if op == FilterOp::In { found } else { !found }
        }
    }
}

fn text_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn values_equal(actual: Option<&Value>, expected: &Value) -> bool {
    let actual = match actual {
        None | Some(Value::Null) => return expected.is_null(),
        Some(value) => value,
    };
    match (actual, expected) {
        (_, Value::Null) => false,
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (_, Value::String(s)) => text_form(actual) == *s,
        (Value::String(s), _) => *s == text_form(expected),
        _ => actual == expected,
    }
}

/// Ordering of a stored value relative to an operand; `None` when they are
/// not comparable, in which case range conditions do not match.
fn compare(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    match (actual?, expected) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (actual, Value::String(s)) => Some(text_form(actual).as_str().cmp(s.as_str())),
        (Value::String(s), expected) => Some(s.as_str().cmp(text_form(expected).as_str())),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Ascending sort order; missing and null values sort last.
fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .zip(y.as_f64())
                .and_then(|(x, y)| x.partial_cmp(&y))
                .unwrap_or(Ordering::Equal),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => text_form(a).cmp(&text_form(b)),
        },
    }
}
