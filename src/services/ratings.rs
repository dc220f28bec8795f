use serde_json::json;
use uuid::Uuid;

use crate::database::models::tour::{round_rating, DEFAULT_RATINGS_AVERAGE};
use crate::database::models::{number_field, Document};
use crate::database::{DatabaseError, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub quantity: usize,
    pub average: f64,
}

/// Count of reviews and mean of their ratings; the defaults when there are none.
pub fn summarize(reviews: &[Document]) -> RatingSummary {
    let ratings: Vec<f64> = reviews.iter().filter_map(|r| number_field(r, "rating")).collect();
    if reviews.is_empty() || ratings.is_empty() {
        return RatingSummary { quantity: reviews.len(), average: DEFAULT_RATINGS_AVERAGE };
    }
    let average = ratings.iter().sum::<f64>() / ratings.len() as f64;
    RatingSummary { quantity: reviews.len(), average: round_rating(average) }
}

/// Recomputes a tour's rating fields from its reviews. Runs after every
/// review write.
pub async fn recompute_ratings(
    reviews: &dyn RecordStore,
    tours: &dyn RecordStore,
    tour_id: Uuid,
) -> Result<RatingSummary, DatabaseError> {
    let mut query = reviews.query()?;
    query.where_clause(json!({ "tour": tour_id.to_string() }))?;
    let summary = summarize(&reviews.find(&query).await?);

    let mut changes = Document::new();
    changes.insert("ratingsQuantity".to_string(), json!(summary.quantity));
    changes.insert("ratingsAverage".to_string(), json!(summary.average));
    if tours.update_by_id(tour_id, changes).await?.is_none() {
        tracing::debug!("Tour {} not visible while updating ratings", tour_id);
    }
    Ok(summary)
}
