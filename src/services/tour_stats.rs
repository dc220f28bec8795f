//! Aggregations and geospatial lookups over tour documents. Everything here
//! is pure; handlers load the visible tours and pass them in.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::database::models::tour::point_coordinates;
use crate::database::models::{number_field, Document};

pub const STATS_MIN_RATING: f64 = 4.5;

const EARTH_RADIUS_MI: f64 = 3963.2;
const EARTH_RADIUS_KM: f64 = 6378.1;
const EARTH_RADIUS_M: f64 = 6_378_100.0;
const METERS_TO_MI: f64 = 0.000621371;
const METERS_TO_KM: f64 = 0.001;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    pub difficulty: String,
    pub num_tours: usize,
    pub num_ratings: f64,
    pub avg_rating: f64,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

/// Highly rated tours grouped by upper-cased difficulty, cheapest group first.
pub fn tour_stats(tours: &[Document]) -> Vec<DifficultyStats> {
    let mut groups: BTreeMap<String, Vec<&Document>> = BTreeMap::new();
    for tour in tours {
        if number_field(tour, "ratingsAverage").map(|r| r >= STATS_MIN_RATING).unwrap_or(false) {
            let difficulty = tour.get("difficulty").and_then(Value::as_str).unwrap_or_default().to_uppercase();
            groups.entry(difficulty).or_default().push(tour);
        }
    }

    let mut stats: Vec<DifficultyStats> = groups
        .into_iter()
        .map(|(difficulty, members)| {
            let prices: Vec<f64> = members.iter().filter_map(|t| number_field(t, "price")).collect();
            let ratings: Vec<f64> = members.iter().filter_map(|t| number_field(t, "ratingsAverage")).collect();
            DifficultyStats {
                difficulty,
                num_tours: members.len(),
                num_ratings: members.iter().filter_map(|t| number_field(t, "ratingsQuantity")).sum(),
                avg_rating: mean(&ratings),
                avg_price: mean(&prices),
                min_price: prices.iter().copied().fold(f64::INFINITY, f64::min),
                max_price: prices.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            }
        })
        .collect();
    stats.sort_by(|a, b| a.avg_price.total_cmp(&b.avg_price));
    stats
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthPlan {
    pub month: u32,
    pub num_tour_starts: usize,
    pub tours: Vec<String>,
}

/// Tour starts within `year` grouped by month, busiest month first.
pub fn monthly_plan(tours: &[Document], year: i32) -> Vec<MonthPlan> {
    let mut months: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for tour in tours {
        let name = tour.get("name").and_then(Value::as_str).unwrap_or_default();
        let dates = tour.get("startDates").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
        for date in dates.iter().filter_map(Value::as_str).filter_map(parse_date) {
            if date.year() == year {
                months.entry(date.month()).or_default().push(name.to_string());
            }
        }
    }

    let mut plan: Vec<MonthPlan> = months
        .into_iter()
        .map(|(month, tours)| MonthPlan { month, num_tour_starts: tours.len(), tours })
        .collect();
    plan.sort_by(|a, b| b.num_tour_starts.cmp(&a.num_tour_starts).then(a.month.cmp(&b.month)));
    plan
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    Miles,
    Kilometers,
}

impl DistanceUnit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "mi" => Some(DistanceUnit::Miles),
            "km" => Some(DistanceUnit::Kilometers),
            _ => None,
        }
    }

    fn earth_radius(&self) -> f64 {
        match self {
            DistanceUnit::Miles => EARTH_RADIUS_MI,
            DistanceUnit::Kilometers => EARTH_RADIUS_KM,
        }
    }

    fn from_meters(&self) -> f64 {
        match self {
            DistanceUnit::Miles => METERS_TO_MI,
            DistanceUnit::Kilometers => METERS_TO_KM,
        }
    }
}

/// A `lat,lng` path segment.
pub fn parse_lat_lng(raw: &str) -> Option<(f64, f64)> {
    let (lat, lng) = raw.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)).then_some((lat, lng))
}

/// Central angle in radians between two `(lat, lng)` points.
fn central_angle(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lng1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lng2) = (b.0.to_radians(), b.1.to_radians());
    let h = ((lat2 - lat1) / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * ((lng2 - lng1) / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}

fn start_point(tour: &Document) -> Option<(f64, f64)> {
    let location = tour.get("startLocation")?.as_object()?;
    point_coordinates(location).map(|(lng, lat)| (lat, lng))
}

/// Tours whose start location lies within `distance` units of `center`.
pub fn tours_within(tours: Vec<Document>, center: (f64, f64), distance: f64, unit: DistanceUnit) -> Vec<Document> {
    let radius = distance / unit.earth_radius();
    tours
        .into_iter()
        .filter(|tour| start_point(tour).map(|p| central_angle(center, p) <= radius).unwrap_or(false))
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TourDistance {
    pub id: Value,
    pub name: Value,
    pub distance: f64,
}

/// Distance from `origin` to every tour with a start location, nearest first.
pub fn distances(tours: &[Document], origin: (f64, f64), unit: DistanceUnit) -> Vec<TourDistance> {
    let mut out: Vec<TourDistance> = tours
        .iter()
        .filter_map(|tour| {
            let point = start_point(tour)?;
            Some(TourDistance {
                id: tour.get("id").cloned().unwrap_or(Value::Null),
                name: tour.get("name").cloned().unwrap_or(Value::Null),
                distance: central_angle(origin, point) * EARTH_RADIUS_M * unit.from_meters(),
            })
        })
        .collect();
    out.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    out
}
