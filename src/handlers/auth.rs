// handlers/auth.rs - /api/v1/users credential endpoints
//
// signup, login, logout, forgotPassword, resetPassword, updatePassword and
// the optional-auth session probe.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::Value;

use super::base_url;
use super::factory::body_document;
use crate::auth::cookie::{logout_cookie, session_cookie};
use crate::error::ApiError;
use crate::middleware::{ApiJson, ApiResponse, CurrentUser, MaybeUser};
use crate::services::{AuthService, IssuedSession};
use crate::state::AppState;

type SessionResult = Result<(CookieJar, ApiResponse), ApiError>;

/// Token in the body and in the `jwt` cookie, user under `data.user`.
fn send_session(state: &AppState, jar: CookieJar, session: IssuedSession, status: StatusCode) -> (CookieJar, ApiResponse) {
    let security = &state.config.security;
    let cookie = session_cookie(
        session.token.clone(),
        security.jwt_cookie_expires_in_days,
        !state.config.is_development(),
    );
    let body = ApiResponse::data("user", session.user)
        .with("token", session.token)
        .with_status(status);
    (jar.add(cookie), body)
}

fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str)
}

/// POST /api/v1/users/signup
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    ApiJson(body): ApiJson<Value>,
) -> SessionResult {
    let input = body_document(body)?;
    let profile_url = format!("{}/me", base_url(&state.config, &headers));
    let session = AuthService::new(&state).signup(&input, &profile_url).await?;
    Ok(send_session(&state, jar, session, StatusCode::CREATED))
}

/// POST /api/v1/users/login
pub async fn login(State(state): State<AppState>, jar: CookieJar, ApiJson(body): ApiJson<Value>) -> SessionResult {
    let session = AuthService::new(&state)
        .login(str_field(&body, "email"), str_field(&body, "password"))
        .await?;
    tracing::info!("User {} logged in", session.user.id);
    Ok(send_session(&state, jar, session, StatusCode::OK))
}

/// GET /api/v1/users/logout
///
/// Tokens are not revoked server-side; the cookie is overwritten with a
/// placeholder that expires shortly.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, ApiResponse) {
    let jar = jar.add(logout_cookie(!state.config.is_development()));
    (jar, ApiResponse::success())
}

/// POST /api/v1/users/forgotPassword
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<Value>,
) -> Result<ApiResponse, ApiError> {
    AuthService::new(&state)
        .forgot_password(str_field(&body, "email"), &base_url(&state.config, &headers))
        .await?;
    Ok(ApiResponse::success().with("message", "Token sent to email!"))
}

/// PATCH /api/v1/users/resetPassword/:token
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    jar: CookieJar,
    ApiJson(body): ApiJson<Value>,
) -> SessionResult {
    let input = body_document(body)?;
    let session = AuthService::new(&state).reset_password(&token, &input).await?;
    Ok(send_session(&state, jar, session, StatusCode::OK))
}

/// PATCH /api/v1/users/updatePassword
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    ApiJson(body): ApiJson<Value>,
) -> SessionResult {
    let input = body_document(body)?;
    let session = AuthService::new(&state).update_password(&user, &input).await?;
    Ok(send_session(&state, jar, session, StatusCode::OK))
}

/// GET /api/v1/users/session
pub async fn session(MaybeUser(user): MaybeUser) -> ApiResponse {
    ApiResponse::data("user", user)
}
