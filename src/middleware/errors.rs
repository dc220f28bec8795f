use axum::{
    body::Body,
    extract::{Request, State},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::ErrorDetails;

/// In development, replaces error bodies with their detailed rendering.
pub async fn expose_error_details(State(config): State<Arc<AppConfig>>, req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let details = response.extensions_mut().remove::<ErrorDetails>();
    match details {
        Some(ErrorDetails(body)) if config.is_development() => {
            let (mut parts, _) = response.into_parts();
            parts.headers.remove(CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(body.to_string()))
        }
        _ => response,
    }
}
