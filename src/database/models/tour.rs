use serde_json::{json, Value};

use super::{Document, FieldErrors, FieldsValidator};

pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "difficult"];
pub const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;
pub const NAME_MIN_LENGTH: usize = 10;
pub const NAME_MAX_LENGTH: usize = 40;

/// Validates a tour body. On create, required fields and defaults are
/// enforced; on update only the supplied fields are checked.
pub fn validate_tour(input: &Document, partial: bool) -> Result<Document, FieldErrors> {
    let mut v = if partial { FieldsValidator::update(input) } else { FieldsValidator::create(input) };

    if let Some(name) = v.string("name", Some("A tour must have a name")) {
        let len = name.chars().count();
        if len < NAME_MIN_LENGTH {
            v.error("name", "A tour name must have more or equal then 10 characters");
        } else if len > NAME_MAX_LENGTH {
            v.error("name", "A tour name must have less or equal then 40 characters");
        } else {
            v.set("slug", Value::String(slugify(&name)));
        }
    }

    if let Some(duration) = v.number("duration", Some("A tour must have a duration")) {
        if duration <= 0.0 {
            v.error("duration", "Duration must be positive");
        }
    }

    if let Some(size) = v.number("maxGroupSize", Some("A tour must have a group size")) {
        if size < 1.0 {
            v.error("maxGroupSize", "Group size must be at least 1");
        }
    }

    if let Some(difficulty) = v.string("difficulty", Some("A tour must have a difficulty")) {
        if !DIFFICULTIES.contains(&difficulty.as_str()) {
            v.error("difficulty", "Difficulty is either: easy, medium, difficult");
        }
    }

    if let Some(rating) = v.number("ratingsAverage", None) {
        if !(1.0..=5.0).contains(&rating) {
            v.error("ratingsAverage", "Rating must be between 1.0 and 5.0");
        } else {
            v.set("ratingsAverage", json!(round_rating(rating)));
        }
    }
    v.default("ratingsAverage", json!(DEFAULT_RATINGS_AVERAGE));

    if let Some(quantity) = v.number("ratingsQuantity", None) {
        if quantity < 0.0 {
            v.error("ratingsQuantity", "Ratings quantity cannot be negative");
        }
    }
    v.default("ratingsQuantity", json!(0));

    let price = v.number("price", Some("A tour must have a price"));
    if let Some(p) = price {
        if p <= 0.0 {
            v.error("price", "Price must be positive");
        }
    }

    if let Some(discount) = v.number("priceDiscount", None) {
        // On partial updates the stored price is not known here; the check
        // only runs when both values arrive together.
        if let Some(p) = price {
            if discount >= p {
                v.error(
                    "priceDiscount",
                    &format!("Discount price ({}) should be below regular price", discount),
                );
            }
        }
        if discount < 0.0 {
            v.error("priceDiscount", "Discount cannot be negative");
        }
    }

    v.string("summary", Some("A tour must have a summary"));
    v.string("description", None);
    v.string("imageCover", Some("A tour must have a cover image"));

    if let Some(images) = v.array("images") {
        if !images.iter().all(Value::is_string) {
            v.error("images", "Images must be file names");
        }
    }
    v.default("images", json!([]));

    if let Some(dates) = v.array("startDates") {
        let all_dates = dates.iter().all(|d| {
            d.as_str()
                .map(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok() || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
                .unwrap_or(false)
        });
        if !all_dates {
            v.error("startDates", "Start dates must be ISO-8601 dates");
        }
    }
    v.default("startDates", json!([]));

    v.boolean("secretTour");
    v.default("secretTour", json!(false));

    if let Some(location) = v.object("startLocation") {
        if let Err(message) = check_point(location) {
            v.error("startLocation", message);
        }
    }

    if let Some(locations) = v.array("locations") {
        let valid = locations
            .iter()
            .all(|loc| loc.as_object().map(|o| check_point(o).is_ok()).unwrap_or(false));
        if !valid {
            v.error("locations", "Locations must be GeoJSON points");
        }
    }
    v.default("locations", json!([]));

    v.ids("guides");
    v.default("guides", json!([]));

    v.finish()
}

fn check_point(point: &Document) -> Result<(), &'static str> {
    if let Some(kind) = point.get("type") {
        if kind != "Point" {
            return Err("Location type must be Point");
        }
    }
    match point_coordinates(point) {
        Some((lng, lat)) if (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat) => Ok(()),
        _ => Err("Location needs coordinates [longitude, latitude]"),
    }
}

/// `[lng, lat]` from a GeoJSON point document.
pub fn point_coordinates(point: &Document) -> Option<(f64, f64)> {
    let coords = point.get("coordinates")?.as_array()?;
    match coords.as_slice() {
        [lng, lat] => Some((lng.as_f64()?, lat.as_f64()?)),
        _ => None,
    }
}

pub fn round_rating(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Adds fields computed from stored ones.
pub fn add_virtuals(doc: &mut Document) {
    if let Some(duration) = doc.get("duration").and_then(Value::as_f64) {
        doc.insert("durationWeeks".to_string(), json!(duration / 7.0));
    }
}
