// handlers/mod.rs - HTTP handlers grouped by API area
//
// Every collection endpoint goes through `factory`; the area modules add the
// routes that do not fit the generic shape.

pub mod auth;
pub mod bookings;
pub mod factory;
pub mod reviews;
pub mod tours;
pub mod users;

use axum::http::{header::HOST, HeaderMap};

use crate::config::AppConfig;

/// Base URL for links sent out of band: the configured public URL, else the
/// scheme-less request host served over plain HTTP.
pub fn base_url(config: &AppConfig, headers: &HeaderMap) -> String {
    if let Some(url) = &config.server.public_url {
        return url.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));
    format!("http://{}", host)
}
