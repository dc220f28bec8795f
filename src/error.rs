// HTTP API Error Types
use axum::extract::rejection::JsonRejection;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::AuthError;
use crate::database::DatabaseError;
use crate::filter::error::FilterError;
use crate::services::checkout::CheckoutError;

/// Message shown for non-operational failures outside development.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went very wrong!";

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 413 Payload Too Large
    PayloadTooLarge(String),

    // 500 raised deliberately; the message is safe to show
    InternalServerError(String),

    // 502 Bad Gateway (external service issues)
    BadGateway(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),

    // 500 from a defect or driver failure; the detail never leaves development
    Internal(String),
}

/// Development-only rendering of an error, attached to the response so the
/// error-detail layer can swap it in.
#[derive(Debug, Clone)]
pub struct ErrorDetails(pub Value);

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::PayloadTooLarge(_) => 413,
            ApiError::InternalServerError(_) => 500,
            ApiError::BadGateway(_) => 502,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::Internal(_) => 500,
        }
    }

    /// `fail` for client errors, `error` for server errors
    pub fn status(&self) -> &'static str {
        if self.status_code() < 500 {
            "fail"
        } else {
            "error"
        }
    }

    /// Operational errors are expected failures whose message can be shown to clients
    pub fn is_operational(&self) -> bool {
        !matches!(self, ApiError::Internal(_))
    }

    /// Get error message (for `Internal` this is the internal detail)
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::PayloadTooLarge(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::BadGateway(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
            ApiError::Internal(msg) => msg,
        }
    }

    /// Get client-safe error message
    pub fn public_message(&self) -> &str {
        if self.is_operational() {
            self.message()
        } else {
            GENERIC_FAILURE_MESSAGE
        }
    }

    /// Convert to JSON response body. `expose_details` adds the kind and
    /// internal detail and is only used in development.
    pub fn to_json(&self, expose_details: bool) -> Value {
        let mut response = if expose_details {
            json!({
                "status": self.status(),
                "message": self.message(),
                "kind": self.error_code(),
                "error": {
                    "statusCode": self.status_code(),
                    "isOperational": self.is_operational(),
                    "detail": self.message(),
                }
            })
        } else {
            json!({
                "status": self.status(),
                "message": self.public_message(),
            })
        };

        if let ApiError::ValidationError { field_errors: Some(field_errors), .. } = self {
            response["fieldErrors"] = json!(field_errors);
        }

        response
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        ApiError::Internal(detail.into())
    }
}

// Convert other error types to ApiError
impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::JsonError(e) => ApiError::invalid_json(e.to_string()),
            other => ApiError::validation_error(other.to_string(), None),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::Duplicate(value) => ApiError::bad_request(format!(
                "Duplicate field value: {}. Please use another value!",
                value
            )),
            DatabaseError::InvalidQuery(filter_err) => filter_err.into(),
            DatabaseError::ConfigMissing(key) => {
                tracing::error!("Database configuration missing: {}", key);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::QueryError(msg) => {
                // Don't expose internal SQL errors to clients
                tracing::error!("Database query error: {}", msg);
                ApiError::internal(format!("Database query error: {}", msg))
            }
            DatabaseError::Serialization(e) => {
                tracing::error!("Document serialization error: {}", e);
                ApiError::internal(format!("Document serialization error: {}", e))
            }
            DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal(format!("SQLx error: {}", sqlx_err))
            }
            DatabaseError::Migration(e) => {
                tracing::error!("Migration error: {}", e);
                ApiError::service_unavailable("Service is being updated, please try again later")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => {
                ApiError::unauthorized("You are not logged in! Please log in to get access.")
            }
            AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::PrincipalNotFound
            | AuthError::CredentialChangedSinceIssuance => {
                tracing::debug!("Session rejected: {}", err);
                ApiError::unauthorized("Your session is no longer valid. Please log in again.")
            }
            AuthError::IncorrectCredential => ApiError::unauthorized("Incorrect email or password"),
            AuthError::IncorrectCurrentPassword => {
                ApiError::unauthorized("Your current password is wrong.")
            }
            AuthError::Forbidden => {
                ApiError::forbidden("You do not have permission to perform this action")
            }
            AuthError::MissingCredentials => {
                ApiError::bad_request("Please provide email and password!")
            }
            AuthError::UnknownEmail => {
                ApiError::not_found("There is no user with that email address.")
            }
            AuthError::InvalidOrExpiredToken => ApiError::not_found("Token is invalid or has expired"),
            AuthError::Validation(field_errors) => {
                ApiError::validation_error("Invalid input data", Some(field_errors))
            }
            AuthError::MailDelivery(detail) => {
                tracing::error!("Password reset mail failed: {}", detail);
                ApiError::internal_server_error(
                    "There was an error sending the email. Try again later!",
                )
            }
            AuthError::Store(db_err) => db_err.into(),
            AuthError::Signing(detail) | AuthError::Hashing(detail) => {
                tracing::error!("Credential primitive failure: {}", detail);
                ApiError::internal(detail)
            }
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::InvalidAmount(amount) => {
                ApiError::bad_request(format!("Invalid checkout amount: {}", amount))
            }
            CheckoutError::Provider(detail) => {
                tracing::error!("Checkout provider error: {}", detail);
                ApiError::bad_gateway("Payment provider is unavailable, please try again later")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge("Request body is too large".to_string())
        } else {
            ApiError::invalid_json(rejection.body_text())
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if !self.is_operational() {
            tracing::error!("Unhandled failure: {}", self.message());
        }
        let mut response = (status, Json(self.to_json(false))).into_response();
        response
            .extensions_mut()
            .insert(ErrorDetails(self.to_json(true)));
        response
    }
}
