// routes.rs - router assembly
//
// Each area builds its route groups separately; groups that share a path
// but differ in access rules are merged into one router.

use axum::{
    extract::{OriginalUri, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json},
    routing::{delete, get, patch, post},
    Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::database::models::Role;
use crate::error::ApiError;
use crate::handlers::{auth, bookings, factory, reviews, tours, users};
use crate::handlers::bookings::Bookings;
use crate::handlers::reviews::Reviews;
use crate::handlers::tours::Tours;
use crate::handlers::users::Users;
use crate::middleware::auth::{ADMIN, CUSTOMERS, REVIEW_EDITORS, STAFF};
use crate::middleware::{expose_error_details, is_logged_in, protect, restrict_to};
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let body_limit = state.config.server.max_request_size_bytes;
    let config = state.config.clone();

    Router::new()
        .route("/health", get(health))
        .merge(tour_routes(&state))
        .merge(user_routes(&state))
        .merge(review_routes(&state))
        .merge(booking_routes(&state))
        .fallback(not_found)
        .with_state(state)
        // Global middleware
        .layer(middleware::from_fn_with_state(config, expose_error_details))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Requires a live session.
fn authenticated(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(state.clone(), protect))
}

/// Requires a live session whose role is in `roles`.
fn restricted(router: Router<AppState>, state: &AppState, roles: &'static [Role]) -> Router<AppState> {
    let router = router.route_layer(middleware::from_fn(move |req: Request, next: Next| {
        restrict_to(roles, req, next)
    }));
    authenticated(router, state)
}

fn tour_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/api/v1/tours", get(factory::get_all::<Tours>))
        .route("/api/v1/tours/top-5-cheap", get(tours::top_five_cheap))
        .route("/api/v1/tours/tour-stats", get(tours::get_tour_stats))
        .route(
            "/api/v1/tours/tours-within/:distance/center/:latlng/unit/:unit",
            get(tours::get_tours_within),
        )
        .route("/api/v1/tours/distances/:latlng/unit/:unit", get(tours::get_distances))
        .route("/api/v1/tours/:id", get(factory::get_one::<Tours>));

    let planning = Router::new().route("/api/v1/tours/get-monthly-plan/:year", get(tours::get_monthly_plan));

    let staff = Router::new()
        .route("/api/v1/tours", post(factory::create_one::<Tours>))
        .route(
            "/api/v1/tours/:id",
            patch(factory::update_one::<Tours>).delete(factory::delete_one::<Tours>),
        );

    // Reviews nested under a tour
    let tour_reviews = Router::new().route("/api/v1/tours/:id/reviews", get(reviews::get_tour_reviews));
    let tour_reviews_create = Router::new().route("/api/v1/tours/:id/reviews", post(reviews::create_tour_review));

    public
        .merge(restricted(planning, state, STAFF))
        .merge(restricted(staff, state, STAFF))
        .merge(authenticated(tour_reviews, state))
        .merge(restricted(tour_reviews_create, state, CUSTOMERS))
}

fn user_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/api/v1/users/signup", post(auth::signup))
        .route("/api/v1/users/login", post(auth::login))
        .route("/api/v1/users/logout", get(auth::logout))
        .route("/api/v1/users/forgotPassword", post(auth::forgot_password))
        .route("/api/v1/users/resetPassword/:token", patch(auth::reset_password));

    let session = Router::new()
        .route("/api/v1/users/session", get(auth::session))
        .route_layer(middleware::from_fn_with_state(state.clone(), is_logged_in));

    let own_account = Router::new()
        .route("/api/v1/users/updatePassword", patch(auth::update_password))
        .route("/api/v1/users/me", get(users::get_me))
        .route("/api/v1/users/updateMe", patch(users::update_me))
        .route("/api/v1/users/deleteMe", delete(users::delete_me));

    let admin = Router::new()
        .route("/api/v1/users", get(factory::get_all::<Users>).post(users::create_user))
        .route(
            "/api/v1/users/:id",
            get(factory::get_one::<Users>)
                .patch(factory::update_one::<Users>)
                .delete(factory::delete_one::<Users>),
        );

    public
        .merge(session)
        .merge(authenticated(own_account, state))
        .merge(restricted(admin, state, ADMIN))
}

fn review_routes(state: &AppState) -> Router<AppState> {
    let readers = Router::new()
        .route("/api/v1/reviews", get(factory::get_all::<Reviews>))
        .route("/api/v1/reviews/:id", get(factory::get_one::<Reviews>));

    let authors = Router::new().route("/api/v1/reviews", post(reviews::create_review));

    let editors = Router::new().route(
        "/api/v1/reviews/:id",
        patch(factory::update_one::<Reviews>).delete(factory::delete_one::<Reviews>),
    );

    authenticated(readers, state)
        .merge(restricted(authors, state, CUSTOMERS))
        .merge(restricted(editors, state, REVIEW_EDITORS))
}

fn booking_routes(state: &AppState) -> Router<AppState> {
    let customers = Router::new()
        .route("/api/v1/bookings/checkout-session/:id", get(bookings::get_checkout_session))
        .route("/api/v1/bookings/my-tours", get(bookings::get_my_tours));

    let staff = Router::new()
        .route(
            "/api/v1/bookings",
            get(factory::get_all::<Bookings>).post(factory::create_one::<Bookings>),
        )
        .route(
            "/api/v1/bookings/:id",
            get(factory::get_one::<Bookings>)
                .patch(factory::update_one::<Bookings>)
                .delete(factory::delete_one::<Bookings>),
        );

    authenticated(customers, state).merge(restricted(staff, state, STAFF))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.tours.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "data": { "database": "ok", "timestamp": now }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "error",
                    "message": "database unavailable",
                    "data": { "database": "unavailable", "timestamp": now }
                })),
            )
        }
    }
}

async fn not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::not_found(format!("Can't find {} on this server!", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::body::{to_bytes, Body};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn call(uri: &str) -> (StatusCode, Value) {
        let app = app(AppState::in_memory(AppConfig::development()));
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_store() {
        let (status, body) = call("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["database"], "ok");
    }

    #[tokio::test]
    async fn fallback_names_the_path() {
        let (status, body) = call("/api/v2/tours").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Can't find /api/v2/tours on this server!");
    }

    #[tokio::test]
    async fn role_gates_run_after_authentication() {
        let (status, _) = call("/api/v1/tours/get-monthly-plan/2021").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
