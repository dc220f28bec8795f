use thiserror::Error;

use crate::database::models::FieldErrors;
use crate::database::DatabaseError;

/// Failures of the authentication and authorization chain. Each variant maps
/// to one client-facing error; see the `ApiError` conversion.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credential presented")]
    Unauthenticated,

    #[error("token failed verification")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("token subject no longer exists")]
    PrincipalNotFound,

    #[error("credential changed after the token was issued")]
    CredentialChangedSinceIssuance,

    #[error("incorrect email or password")]
    IncorrectCredential,

    #[error("current password does not match")]
    IncorrectCurrentPassword,

    #[error("role not permitted")]
    Forbidden,

    #[error("email and password are required")]
    MissingCredentials,

    #[error("no principal with that email")]
    UnknownEmail,

    #[error("reset token invalid or expired")]
    InvalidOrExpiredToken,

    #[error("invalid input")]
    Validation(FieldErrors),

    #[error("mail delivery failed: {0}")]
    MailDelivery(String),

    #[error(transparent)]
    Store(#[from] DatabaseError),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),
}
