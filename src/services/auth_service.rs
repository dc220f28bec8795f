use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::auth::password::{digest_reset_token, generate_reset_token, hash_password, verify_password};
use crate::auth::{AuthError, TokenIssuer};
use crate::config::AppConfig;
use crate::database::models::user::{check_new_password, normalize_email, validate_signup};
use crate::database::models::{Document, FieldErrors, NewUser, ResetToken, Role, User};
use crate::database::PrincipalStore;
use crate::services::mailer::{password_reset_message, welcome_message, Mailer};
use crate::state::AppState;

/// A principal together with a freshly signed session token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub user: User,
}

/// Credential workflows: signup, login, token checks and the password
/// reset lifecycle.
pub struct AuthService {
    users: Arc<dyn PrincipalStore>,
    tokens: Arc<TokenIssuer>,
    mailer: Arc<dyn Mailer>,
    config: Arc<AppConfig>,
}

impl AuthService {
    pub fn new(state: &AppState) -> Self {
        Self {
            users: state.users.clone(),
            tokens: state.tokens.clone(),
            mailer: state.mailer.clone(),
            config: state.config.clone(),
        }
    }

    /// Verifies a session token and resolves its principal. The principal
    /// must still exist and must not have changed credentials since the
    /// token was issued.
    pub async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let claims = self.tokens.verify(token)?;
        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::PrincipalNotFound)?;
        if user.changed_password_after(claims.iat) {
            return Err(AuthError::CredentialChangedSinceIssuance);
        }
        Ok(user)
    }

    pub async fn signup(&self, input: &Document, profile_url: &str) -> Result<IssuedSession, AuthError> {
        let signup = validate_signup(input).map_err(AuthError::Validation)?;
        let password_hash = hash_password(&signup.password, self.config.security.bcrypt_cost).await?;

        let user = self
            .users
            .insert(NewUser {
                name: signup.name,
                email: signup.email,
                photo: None,
                role: Role::User,
                password_hash,
            })
            .await?;
        tracing::info!("New user {} signed up", user.id);

        let welcome = welcome_message(&user.name, &user.email, profile_url);
        if let Err(e) = self.mailer.send(welcome).await {
            tracing::warn!("Welcome mail to {} failed: {}", user.id, e);
        }

        self.issue(user)
    }

    pub async fn login(&self, email: Option<&str>, password: Option<&str>) -> Result<IssuedSession, AuthError> {
        let (email, password) = match (email.map(str::trim), password) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => (email, password),
            _ => return Err(AuthError::MissingCredentials),
        };

        let Some(credentials) = self.users.find_credentials_by_email(&normalize_email(email)).await? else {
            tracing::warn!("Login rejected: unknown email");
            return Err(AuthError::IncorrectCredential);
        };
        if !verify_password(password, &credentials.password_hash).await? {
            tracing::warn!("Login rejected: wrong password for {}", credentials.user.id);
            return Err(AuthError::IncorrectCredential);
        }

        self.issue(credentials.user)
    }

    /// Stores the digest of a new reset token and mails the plain token
    /// inside `<base_url>/api/v1/users/resetPassword/<token>`.
    pub async fn forgot_password(&self, email: Option<&str>, base_url: &str) -> Result<(), AuthError> {
        let email = normalize_email(email.unwrap_or_default());
        let Some(credentials) = self.users.find_credentials_by_email(&email).await? else {
            return Err(AuthError::UnknownEmail);
        };
        let user = credentials.user;

        let ttl = self.config.security.password_reset_ttl_minutes;
        let generated = generate_reset_token();
        self.users
            .set_reset_token(
                user.id,
                Some(ResetToken {
                    token_hash: generated.digest,
                    expires_at: Utc::now() + Duration::minutes(ttl),
                }),
            )
            .await?;

        let reset_url = format!(
            "{}/api/v1/users/resetPassword/{}",
            base_url.trim_end_matches('/'),
            generated.plain
        );
        let message = password_reset_message(&user.name, &user.email, &reset_url, ttl);
        if let Err(e) = self.mailer.send(message).await {
            self.users.set_reset_token(user.id, None).await?;
            return Err(AuthError::MailDelivery(e.to_string()));
        }

        tracing::debug!("Reset token issued for {}", user.id);
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, input: &Document) -> Result<IssuedSession, AuthError> {
        let user = self
            .users
            .find_by_reset_token(&digest_reset_token(token), Utc::now())
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let mut errors = FieldErrors::new();
        let password = str_field(input, "password");
        check_new_password(&mut errors, password, str_field(input, "passwordConfirm"), "password", "passwordConfirm");
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        self.replace_password(&user, password.unwrap_or_default()).await?;
        tracing::info!("Password reset for {}", user.id);
        self.reload_and_issue(user).await
    }

    /// Changes the credential of an authenticated principal after checking
    /// the current one. The new value is read from `newPassword` /
    /// `newPasswordConfirm`, falling back to `password` / `passwordConfirm`.
    pub async fn update_password(&self, user: &User, input: &Document) -> Result<IssuedSession, AuthError> {
        let credentials = self
            .users
            .find_credentials_by_id(user.id)
            .await?
            .ok_or(AuthError::PrincipalNotFound)?;

        let current = str_field(input, "currentPassword").unwrap_or_default();
        if current.is_empty() || !verify_password(current, &credentials.password_hash).await? {
            return Err(AuthError::IncorrectCurrentPassword);
        }

        let (field, confirm_field) = if input.contains_key("newPassword") {
            ("newPassword", "newPasswordConfirm")
        } else {
            ("password", "passwordConfirm")
        };
        let mut errors = FieldErrors::new();
        let password = str_field(input, field);
        check_new_password(&mut errors, password, str_field(input, confirm_field), field, confirm_field);
        if !errors.is_empty() {
            return Err(AuthError::Validation(errors));
        }

        self.replace_password(&credentials.user, password.unwrap_or_default()).await?;
        tracing::info!("Password updated for {}", user.id);
        self.reload_and_issue(credentials.user).await
    }

    /// Stamps the change one second in the past so a token signed right
    /// after it is still accepted.
    async fn replace_password(&self, user: &User, password: &str) -> Result<(), AuthError> {
        let hash = hash_password(password, self.config.security.bcrypt_cost).await?;
        let changed_at = Utc::now() - Duration::seconds(1);
        self.users.set_password(user.id, &hash, changed_at).await?;
        Ok(())
    }

    async fn reload_and_issue(&self, user: User) -> Result<IssuedSession, AuthError> {
        let current = self.users.find_by_id(user.id).await?.unwrap_or(user);
        self.issue(current)
    }

    fn issue(&self, user: User) -> Result<IssuedSession, AuthError> {
        let token = self.tokens.sign(user.id)?;
        Ok(IssuedSession { token, user })
    }
}

fn str_field<'a>(input: &'a Document, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}
