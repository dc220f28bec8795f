// handlers/reviews.rs - /api/v1/reviews and /api/v1/tours/:tourId/reviews

use async_trait::async_trait;
use axum::extract::{Path, RawQuery, State};
use serde_json::{json, Value};
use std::sync::Arc;

use super::factory::{self, body_document, embed, lookup, parse_id, referenced_ids, Resource};
use crate::database::models::review::validate_review;
use crate::database::models::{id_field, Document, FieldErrors};
use crate::database::RecordStore;
use crate::error::ApiError;
use crate::filter::QueryParams;
use crate::middleware::{ApiJson, ApiResponse, ApiResult, CurrentUser};
use crate::services::ratings::recompute_ratings;
use crate::state::AppState;

/// Author fields shown on a review.
const AUTHOR_FIELDS: &[&str] = &["name", "photo"];

pub struct Reviews;

#[async_trait]
impl Resource for Reviews {
    const NAME: &'static str = "review";

    fn store(state: &AppState) -> &Arc<dyn RecordStore> {
        &state.reviews
    }

    fn validate(input: &Document, partial: bool) -> Result<Document, FieldErrors> {
        validate_review(input, partial)
    }

    async fn expand_one(state: &AppState, doc: Document) -> Result<Document, ApiError> {
        let mut expanded = with_authors(state, vec![doc]).await?;
        expanded.pop().ok_or_else(|| ApiError::internal("review expansion lost its document"))
    }

    async fn expand_many(state: &AppState, docs: Vec<Document>) -> Result<Vec<Document>, ApiError> {
        with_authors(state, docs).await
    }

    async fn after_write(state: &AppState, doc: &Document) -> Result<(), ApiError> {
        if let Some(tour_id) = id_field(doc, "tour") {
            let summary = recompute_ratings(state.reviews.as_ref(), state.tours.as_ref(), tour_id).await?;
            tracing::debug!(
                "Tour {} now rated {} over {} reviews",
                tour_id,
                summary.average,
                summary.quantity
            );
        }
        Ok(())
    }
}

/// Replaces each review's `user` id with `{id, name, photo}`.
pub async fn with_authors(state: &AppState, mut docs: Vec<Document>) -> Result<Vec<Document>, ApiError> {
    let ids = referenced_ids(&docs, "user");
    let authors = lookup(state.user_records.as_ref(), ids, AUTHOR_FIELDS).await?;
    for doc in docs.iter_mut() {
        embed(doc, "user", &authors);
    }
    Ok(docs)
}

/// GET /api/v1/tours/:tourId/reviews
pub async fn get_tour_reviews(
    State(state): State<AppState>,
    Path(tour_id): Path<String>,
    RawQuery(raw): RawQuery,
) -> ApiResult {
    let tour_id = parse_id(&tour_id)?;
    let params = QueryParams::parse(raw.as_deref(), &state.config.query.whitelist);
    factory::list::<Reviews>(&state, &params, Some(json!({ "tour": tour_id.to_string() }))).await
}

/// POST /api/v1/reviews
pub async fn create_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult {
    let input = with_defaults(body_document(body)?, None, &user.id.to_string());
    let doc = factory::create_document::<Reviews>(&state, input).await?;
    Ok(ApiResponse::created(factory::DOC_KEY, doc))
}

/// POST /api/v1/tours/:tourId/reviews
pub async fn create_tour_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(tour_id): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult {
    let tour_id = parse_id(&tour_id)?;
    let input = with_defaults(body_document(body)?, Some(&tour_id.to_string()), &user.id.to_string());
    let doc = factory::create_document::<Reviews>(&state, input).await?;
    Ok(ApiResponse::created(factory::DOC_KEY, doc))
}

/// Fills `tour` from the path and `user` from the principal when the body
/// leaves them out.
fn with_defaults(mut input: Document, tour_id: Option<&str>, user_id: &str) -> Document {
    if let Some(tour_id) = tour_id {
        input.entry("tour").or_insert_with(|| Value::String(tour_id.to_string()));
    }
    input.entry("user").or_insert_with(|| Value::String(user_id.to_string()));
    input
}
