//! Collection handlers shared by every resource. Each resource supplies its
//! store, input validation and post-read expansion through [`Resource`].

use async_trait::async_trait;
use axum::extract::{Path, RawQuery, State};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::{Document, FieldErrors};
use crate::database::RecordStore;
use crate::error::ApiError;
use crate::filter::{QueryFeatures, QueryParams};
use crate::middleware::{ApiJson, ApiResponse, ApiResult};
use crate::state::AppState;

/// Envelope key for documents returned by the generic handlers.
pub const DOC_KEY: &str = "doc";

pub const NOT_FOUND_MESSAGE: &str = "No document found with that ID";

#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Singular name used in log lines
    const NAME: &'static str;

    fn store(state: &AppState) -> &Arc<dyn RecordStore>;

    fn validate(input: &Document, partial: bool) -> Result<Document, FieldErrors>;

    /// Post-read step for a single document.
    async fn expand_one(_state: &AppState, doc: Document) -> Result<Document, ApiError> {
        Ok(doc)
    }

    /// Post-read step for a listing.
    async fn expand_many(_state: &AppState, docs: Vec<Document>) -> Result<Vec<Document>, ApiError> {
        Ok(docs)
    }

    /// Runs after a create, update or delete with the affected document.
    async fn after_write(_state: &AppState, _doc: &Document) -> Result<(), ApiError> {
        Ok(())
    }
}

pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::bad_request(format!("Invalid id: {}", raw)))
}

pub fn body_document(body: Value) -> Result<Document, ApiError> {
    match body {
        Value::Object(doc) => Ok(doc),
        _ => Err(ApiError::invalid_json("Request body must be a JSON object")),
    }
}

fn invalid_input(errors: FieldErrors) -> ApiError {
    let mut messages: Vec<&str> = errors.values().map(String::as_str).collect();
    messages.sort_unstable();
    ApiError::validation_error(format!("Invalid input data. {}", messages.join(". ")), Some(errors))
}

pub fn validate<R: Resource>(input: &Document, partial: bool) -> Result<Document, ApiError> {
    R::validate(input, partial).map_err(invalid_input)
}

/// Runs the query-string features over `store`, optionally narrowed by
/// fixed `conditions` first.
pub async fn find_with_features(
    state: &AppState,
    store: &dyn RecordStore,
    params: &QueryParams,
    conditions: Option<Value>,
) -> Result<Vec<Document>, ApiError> {
    let mut query = store.query()?;
    if let Some(conditions) = conditions {
        query.where_clause(conditions)?;
    }
    let query = QueryFeatures::new(query, params, &state.config.query)
        .filter()?
        .sort()?
        .limit_fields()?
        .paginate()?
        .into_query();
    Ok(store.find(&query).await?)
}

pub async fn list<R: Resource>(state: &AppState, params: &QueryParams, conditions: Option<Value>) -> ApiResult {
    let docs = find_with_features(state, R::store(state).as_ref(), params, conditions).await?;
    let docs = R::expand_many(state, docs).await?;
    Ok(ApiResponse::list(DOC_KEY, docs))
}

pub async fn create_document<R: Resource>(state: &AppState, input: Document) -> Result<Document, ApiError> {
    let doc = validate::<R>(&input, false)?;
    let created = R::store(state).create(doc).await?;
    tracing::info!("Created {} {:?}", R::NAME, created.get("id"));
    R::after_write(state, &created).await?;
    R::expand_one(state, created).await
}

pub async fn update_document<R: Resource>(state: &AppState, id: Uuid, input: Document) -> Result<Document, ApiError> {
    let changes = validate::<R>(&input, true)?;
    let updated = R::store(state)
        .update_by_id(id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND_MESSAGE))?;
    R::after_write(state, &updated).await?;
    R::expand_one(state, updated).await
}

pub async fn delete_document<R: Resource>(state: &AppState, id: Uuid) -> Result<(), ApiError> {
    let deleted = R::store(state)
        .delete_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND_MESSAGE))?;
    tracing::info!("Deleted {} {}", R::NAME, id);
    R::after_write(state, &deleted).await
}

pub async fn find_document<R: Resource>(state: &AppState, id: Uuid) -> Result<Document, ApiError> {
    let doc = R::store(state)
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND_MESSAGE))?;
    R::expand_one(state, doc).await
}

/// GET /api/v1/<resource>
pub async fn get_all<R: Resource>(State(state): State<AppState>, RawQuery(raw): RawQuery) -> ApiResult {
    let params = QueryParams::parse(raw.as_deref(), &state.config.query.whitelist);
    list::<R>(&state, &params, None).await
}

/// GET /api/v1/<resource>/:id
pub async fn get_one<R: Resource>(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let doc = find_document::<R>(&state, parse_id(&id)?).await?;
    Ok(ApiResponse::data(DOC_KEY, doc))
}

/// POST /api/v1/<resource>
pub async fn create_one<R: Resource>(State(state): State<AppState>, ApiJson(body): ApiJson<Value>) -> ApiResult {
    let doc = create_document::<R>(&state, body_document(body)?).await?;
    Ok(ApiResponse::created(DOC_KEY, doc))
}

/// PATCH /api/v1/<resource>/:id
pub async fn update_one<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let doc = update_document::<R>(&state, id, body_document(body)?).await?;
    Ok(ApiResponse::data(DOC_KEY, doc))
}

/// DELETE /api/v1/<resource>/:id
pub async fn delete_one<R: Resource>(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    delete_document::<R>(&state, parse_id(&id)?).await?;
    Ok(ApiResponse::no_content())
}

/// Loads documents by id from `store`, keyed by id, keeping only `fields`.
pub async fn lookup(
    store: &dyn RecordStore,
    ids: Vec<String>,
    fields: &[&str],
) -> Result<HashMap<String, Document>, ApiError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut query = store.query()?;
    query.where_clause(json!({ "id": { "$in": ids } }))?;
    if !fields.is_empty() {
        let mut select: Vec<String> = vec!["id".to_string()];
        select.extend(fields.iter().map(|f| f.to_string()));
        query.select(select)?;
    }
    Ok(store
        .find(&query)
        .await?
        .into_iter()
        .filter_map(|doc| {
            let id = doc.get("id").and_then(Value::as_str)?.to_string();
            Some((id, doc))
        })
        .collect())
}

/// Replaces the id in `doc[field]` with the matching document, or null.
pub fn embed(doc: &mut Document, field: &str, found: &HashMap<String, Document>) {
    let replacement = doc
        .get(field)
        .and_then(Value::as_str)
        .and_then(|id| found.get(id))
        .cloned()
        .map(Value::Object)
        .unwrap_or(Value::Null);
    doc.insert(field.to_string(), replacement);
}

pub fn referenced_ids<'a>(docs: impl IntoIterator<Item = &'a Document>, field: &str) -> Vec<String> {
    let mut ids: Vec<String> = docs
        .into_iter()
        .filter_map(|doc| doc.get(field).and_then(Value::as_str).map(str::to_string))
        .collect();
    ids.sort();
    ids.dedup();
    ids
}
