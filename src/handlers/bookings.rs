// handlers/bookings.rs - /api/v1/bookings handlers

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use serde_json::{json, Value};
use std::sync::Arc;

use super::base_url;
use super::factory::{embed, lookup, parse_id, referenced_ids, Resource, NOT_FOUND_MESSAGE};
use crate::database::models::booking::validate_booking;
use crate::database::models::tour::add_virtuals;
use crate::database::models::{number_field, Document, FieldErrors};
use crate::database::RecordStore;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::services::checkout::CheckoutRequest;
use crate::state::AppState;

pub struct Bookings;

#[async_trait]
impl Resource for Bookings {
    const NAME: &'static str = "booking";

    fn store(state: &AppState) -> &Arc<dyn RecordStore> {
        &state.bookings
    }

    fn validate(input: &Document, partial: bool) -> Result<Document, FieldErrors> {
        validate_booking(input, partial)
    }

    async fn expand_one(state: &AppState, doc: Document) -> Result<Document, ApiError> {
        let mut expanded = with_parties(state, vec![doc]).await?;
        expanded.pop().ok_or_else(|| ApiError::internal("booking expansion lost its document"))
    }

    async fn expand_many(state: &AppState, docs: Vec<Document>) -> Result<Vec<Document>, ApiError> {
        with_parties(state, docs).await
    }
}

/// Tour name and customer details in place of the stored ids.
async fn with_parties(state: &AppState, mut docs: Vec<Document>) -> Result<Vec<Document>, ApiError> {
    let tours = lookup(state.tours.as_ref(), referenced_ids(&docs, "tour"), &["name"]).await?;
    let users = lookup(state.user_records.as_ref(), referenced_ids(&docs, "user"), &["name", "email"]).await?;
    for doc in docs.iter_mut() {
        embed(doc, "tour", &tours);
        embed(doc, "user", &users);
    }
    Ok(docs)
}

/// GET /api/v1/bookings/checkout-session/:tourId
pub async fn get_checkout_session(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(tour_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    let tour_id = parse_id(&tour_id)?;
    let tour = state
        .tours
        .find_by_id(tour_id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND_MESSAGE))?;

    let price = number_field(&tour, "price").ok_or_else(|| ApiError::internal(format!("tour {} has no price", tour_id)))?;
    let text = |key: &str| tour.get(key).and_then(Value::as_str).map(str::to_string);
    let base = base_url(&state.config, &headers);

    let request = CheckoutRequest {
        tour_id,
        tour_name: text("name").unwrap_or_default(),
        description: text("summary"),
        image: text("imageCover"),
        amount_cents: CheckoutRequest::amount_from_price(price)?,
        customer_email: user.email.clone(),
        success_url: format!("{}/api/v1/bookings/my-tours", base),
        cancel_url: format!("{}/api/v1/tours/{}", base, tour_id),
    };
    let session = state.checkout.create_session(request).await?;
    tracing::info!("Checkout session {} opened by {} for tour {}", session.id, user.id, tour_id);

    Ok(ApiResponse::success().with("session", session))
}

/// GET /api/v1/bookings/my-tours
pub async fn get_my_tours(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult {
    let mut query = state.bookings.query()?;
    query.where_clause(json!({ "user": user.id.to_string() }))?;
    let bookings = state.bookings.find(&query).await?;

    let tour_ids = referenced_ids(&bookings, "tour");
    let tours = if tour_ids.is_empty() {
        Vec::new()
    } else {
        let mut query = state.tours.query()?;
        query.where_clause(json!({ "id": { "$in": tour_ids } }))?;
        let mut tours = state.tours.find(&query).await?;
        tours.iter_mut().for_each(add_virtuals);
        tours
    };
    Ok(ApiResponse::list("tours", tours))
}
