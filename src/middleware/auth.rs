use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::cookie::{LOGGED_OUT, SESSION_COOKIE};
use crate::auth::AuthError;
use crate::database::models::{Role, User};
use crate::error::ApiError;
use crate::services::AuthService;
use crate::state::AppState;

pub const ADMIN: &[Role] = &[Role::Admin];
pub const STAFF: &[Role] = &[Role::Admin, Role::LeadGuide];
pub const CUSTOMERS: &[Role] = &[Role::User];
pub const REVIEW_EDITORS: &[Role] = &[Role::User, Role::Admin];

/// Principal resolved by [`protect`]
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

/// Principal resolved by [`is_logged_in`], if any
#[derive(Clone, Debug)]
pub struct MaybeUser(pub Option<User>);

/// Session token from `Authorization: Bearer`, else from the `jwt` cookie.
/// The logout placeholder does not count as a token.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    from_header.or_else(|| {
        CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty() && v != LOGGED_OUT)
    })
}

/// Rejects the request unless it carries a live session token for an
/// existing principal; attaches the principal on success.
pub async fn protect(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let token = extract_token(req.headers()).ok_or(AuthError::Unauthenticated)?;
    let user = AuthService::new(&state).authenticate(&token).await?;

    tracing::debug!("Authenticated {} as {}", user.id, user.role.as_str());
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Same checks as [`protect`], but any failure continues anonymously.
pub async fn is_logged_in(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let mut resolved = None;
    if let Some(token) = extract_token(req.headers()) {
        match AuthService::new(&state).authenticate(&token).await {
            Ok(user) => resolved = Some(user),
            Err(e) => tracing::debug!("Continuing anonymously: {}", e),
        }
    }
    req.extensions_mut().insert(MaybeUser(resolved));
    next.run(req).await
}

pub fn authorize(user: &User, roles: &[Role]) -> Result<(), AuthError> {
    if roles.contains(&user.role) {
        Ok(())
    } else {
        tracing::debug!("Role {} refused for {}", user.role.as_str(), user.id);
        Err(AuthError::Forbidden)
    }
}

/// Role gate; must run after [`protect`].
///
/// ```ignore
/// router.route_layer(middleware::from_fn(|req: Request, next: Next| restrict_to(STAFF, req, next)))
/// ```
pub async fn restrict_to(roles: &'static [Role], req: Request, next: Next) -> Result<Response, ApiError> {
    let user = req
        .extensions()
        .get::<CurrentUser>()
        .ok_or(AuthError::Unauthenticated)?;
    authorize(&user.0, roles)?;
    Ok(next.run(req).await)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AuthError::Unauthenticated.into())
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<MaybeUser>().cloned().unwrap_or(MaybeUser(None)))
    }
}
