// handlers/tours.rs - /api/v1/tours handlers
//
// CRUD through the factory plus the alias, aggregate and geospatial routes.
// Aggregates run over every visible tour.

use async_trait::async_trait;
use axum::extract::{Path, RawQuery, State};
use serde_json::{json, Value};
use std::sync::Arc;

use super::factory::{self, lookup, Resource};
use super::reviews::with_authors;
use crate::database::models::tour::{add_virtuals, validate_tour};
use crate::database::models::{Document, FieldErrors};
use crate::database::RecordStore;
use crate::error::ApiError;
use crate::filter::QueryParams;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::tour_stats::{self, parse_lat_lng, DistanceUnit};
use crate::state::AppState;

const GUIDE_FIELDS: &[&str] = &["name", "email", "photo", "role"];

const LAT_LNG_MESSAGE: &str = "Please provide latitude and longitude in the format lat,lng.";
const UNIT_MESSAGE: &str = "Please provide unit as mi or km.";

pub struct Tours;

#[async_trait]
impl Resource for Tours {
    const NAME: &'static str = "tour";

    fn store(state: &AppState) -> &Arc<dyn RecordStore> {
        &state.tours
    }

    fn validate(input: &Document, partial: bool) -> Result<Document, FieldErrors> {
        validate_tour(input, partial)
    }

    /// A single tour carries its guides and its reviews.
    async fn expand_one(state: &AppState, mut doc: Document) -> Result<Document, ApiError> {
        add_virtuals(&mut doc);

        let guide_ids: Vec<String> = doc
            .get("guides")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        if !guide_ids.is_empty() {
            let found = lookup(state.user_records.as_ref(), guide_ids.clone(), GUIDE_FIELDS).await?;
            let guides: Vec<Value> = guide_ids
                .iter()
                .filter_map(|id| found.get(id).cloned().map(Value::Object))
                .collect();
            doc.insert("guides".to_string(), Value::Array(guides));
        }

        if let Some(id) = doc.get("id").and_then(Value::as_str).map(str::to_string) {
            let mut query = state.reviews.query()?;
            query.where_clause(json!({ "tour": id }))?;
            let reviews = with_authors(state, state.reviews.find(&query).await?).await?;
            doc.insert("reviews".to_string(), json!(reviews));
        }
        Ok(doc)
    }

    async fn expand_many(_state: &AppState, mut docs: Vec<Document>) -> Result<Vec<Document>, ApiError> {
        docs.iter_mut().for_each(add_virtuals);
        Ok(docs)
    }
}

async fn visible_tours(state: &AppState) -> Result<Vec<Document>, ApiError> {
    let query = state.tours.query()?;
    Ok(state.tours.find(&query).await?)
}

/// GET /api/v1/tours/top-5-cheap
pub async fn top_five_cheap(State(state): State<AppState>, RawQuery(raw): RawQuery) -> ApiResult {
    let mut params = QueryParams::parse(raw.as_deref(), &state.config.query.whitelist);
    params.set("limit", "5");
    params.set("sort", "-ratingsAverage,price");
    params.set("fields", "name,price,ratingsAverage,summary,difficulty");
    factory::list::<Tours>(&state, &params, None).await
}

/// GET /api/v1/tours/tour-stats
pub async fn get_tour_stats(State(state): State<AppState>) -> ApiResult {
    let tours = visible_tours(&state).await?;
    Ok(ApiResponse::data("stats", tour_stats::tour_stats(&tours)))
}

/// GET /api/v1/tours/get-monthly-plan/:year
pub async fn get_monthly_plan(State(state): State<AppState>, Path(year): Path<String>) -> ApiResult {
    let year: i32 = year
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid year: {}", year)))?;
    let tours = visible_tours(&state).await?;
    Ok(ApiResponse::data("plan", tour_stats::monthly_plan(&tours, year)))
}

fn parse_point_and_unit(latlng: &str, unit: &str) -> Result<((f64, f64), DistanceUnit), ApiError> {
    let center = parse_lat_lng(latlng).ok_or_else(|| ApiError::bad_request(LAT_LNG_MESSAGE))?;
    let unit = DistanceUnit::parse(unit).ok_or_else(|| ApiError::bad_request(UNIT_MESSAGE))?;
    Ok((center, unit))
}

/// GET /api/v1/tours/tours-within/:distance/center/:latlng/unit/:unit
pub async fn get_tours_within(
    State(state): State<AppState>,
    Path((distance, latlng, unit)): Path<(String, String, String)>,
) -> ApiResult {
    let (center, unit) = parse_point_and_unit(&latlng, &unit)?;
    let distance: f64 = distance
        .trim()
        .parse()
        .ok()
        .filter(|d: &f64| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid distance: {}", distance)))?;

    let mut tours = tour_stats::tours_within(visible_tours(&state).await?, center, distance, unit);
    tours.iter_mut().for_each(add_virtuals);
    Ok(ApiResponse::list("data", tours))
}

/// GET /api/v1/tours/distances/:latlng/unit/:unit
pub async fn get_distances(
    State(state): State<AppState>,
    Path((latlng, unit)): Path<(String, String)>,
) -> ApiResult {
    let (origin, unit) = parse_point_and_unit(&latlng, &unit)?;
    let tours = visible_tours(&state).await?;
    Ok(ApiResponse::data("data", tour_stats::distances(&tours, origin, unit)))
}
