// handlers/users.rs - /api/v1/users profile and admin endpoints

use async_trait::async_trait;
use axum::extract::State;
use serde_json::Value;
use std::sync::Arc;

use super::factory::{body_document, Resource};
use crate::database::models::user::{validate_admin_update, validate_profile_update};
use crate::database::models::{Document, FieldErrors};
use crate::database::RecordStore;
use crate::error::ApiError;
use crate::middleware::{ApiJson, ApiResponse, ApiResult, CurrentUser};
use crate::state::AppState;

const PASSWORD_FIELDS: [&str; 2] = ["password", "passwordConfirm"];

/// Admin view of the user collection.
pub struct Users;

#[async_trait]
impl Resource for Users {
    const NAME: &'static str = "user";

    fn store(state: &AppState) -> &Arc<dyn RecordStore> {
        &state.user_records
    }

    fn validate(input: &Document, _partial: bool) -> Result<Document, FieldErrors> {
        validate_admin_update(input)
    }
}

/// GET /api/v1/users/me
pub async fn get_me(CurrentUser(user): CurrentUser) -> ApiResponse {
    ApiResponse::data("user", user)
}

/// PATCH /api/v1/users/updateMe
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult {
    let input = body_document(body)?;
    if PASSWORD_FIELDS.iter().any(|field| input.contains_key(*field)) {
        return Err(ApiError::bad_request(
            "This route is not for password updates. Please use /updatePassword.",
        ));
    }

    let changes = validate_profile_update(&input)
        .map_err(|errors| ApiError::validation_error("Invalid input data", Some(errors)))?;
    if changes.is_empty() {
        return Ok(ApiResponse::data("user", user));
    }

    let updated = state
        .users
        .update_profile(user.id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User no longer exists"))?;
    Ok(ApiResponse::data("user", updated))
}

/// DELETE /api/v1/users/deleteMe
pub async fn delete_me(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult {
    state.users.deactivate(user.id).await?;
    tracing::info!("User {} deactivated their account", user.id);
    Ok(ApiResponse::no_content())
}

/// POST /api/v1/users
pub async fn create_user() -> ApiResult {
    Err(ApiError::internal_server_error(
        "This route is not defined! Please use /signup instead",
    ))
}
