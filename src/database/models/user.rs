use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{Document, FieldErrors, FieldsValidator};

pub const DEFAULT_PHOTO: &str = "default.jpg";
pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "guide" => Some(Role::Guide),
            "lead-guide" => Some(Role::LeadGuide),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

/// An authenticated principal as handlers see it. Secrets never live here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// True when the credential changed after a token issued at `issued_at`
    /// (seconds since the epoch) was signed.
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => issued_at < changed_at.timestamp(),
            None => false,
        }
    }
}

/// Full stored row, secrets included. Only stores construct this.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: String,
    pub password: String,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn into_credentials(self) -> Credentials {
        let password_hash = self.password.clone();
        Credentials { user: self.into_user(), password_hash }
    }

    pub fn into_user(self) -> User {
        let role = Role::parse(&self.role).unwrap_or_else(|| {
            tracing::warn!("User {} has unknown role {:?}, treating as user", self.id, self.role);
            Role::User
        });
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            photo: self.photo,
            role,
            password_changed_at: self.password_changed_at,
            created_at: self.created_at,
        }
    }
}

/// A principal together with its bcrypt hash, for credential checks.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
    pub role: Role,
    pub password_hash: String,
}

impl NewUser {
    pub fn into_record(self, now: DateTime<Utc>) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            name: self.name,
            email: self.email,
            photo: self.photo.unwrap_or_else(|| DEFAULT_PHOTO.to_string()),
            role: self.role.as_str().to_string(),
            password: self.password_hash,
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.photo.is_none()
    }
}

/// Hashed reset token and the instant it stops being accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetToken {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Signup body after validation; the password is still in clear text.
#[derive(Debug, Clone)]
pub struct SignupInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else { return false };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Password plus confirmation, as used by signup, reset and update.
pub fn check_new_password(
    errors: &mut FieldErrors,
    password: Option<&str>,
    confirm: Option<&str>,
    field: &str,
    confirm_field: &str,
) {
    match password {
        None | Some("") => {
            errors.insert(field.to_string(), "Please provide a password".to_string());
        }
        Some(p) if p.chars().count() < MIN_PASSWORD_LENGTH => {
            errors.insert(
                field.to_string(),
                format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
            );
        }
        Some(p) => {
            if confirm != Some(p) {
                errors.insert(confirm_field.to_string(), "Passwords are not the same!".to_string());
            }
        }
    }
}

pub fn validate_signup(input: &Document) -> Result<SignupInput, FieldErrors> {
    let mut errors = FieldErrors::new();
    let str_field = |key: &str| input.get(key).and_then(|v| v.as_str());

    let name = str_field("name").map(str::trim).unwrap_or_default();
    if name.is_empty() {
        errors.insert("name".to_string(), "Please tell us your name!".to_string());
    }

    let email = normalize_email(str_field("email").unwrap_or_default());
    if email.is_empty() {
        errors.insert("email".to_string(), "Please provide your email".to_string());
    } else if !is_valid_email(&email) {
        errors.insert("email".to_string(), "Please provide a valid email".to_string());
    }

    check_new_password(
        &mut errors,
        str_field("password"),
        str_field("passwordConfirm"),
        "password",
        "passwordConfirm",
    );

    if errors.is_empty() {
        Ok(SignupInput {
            name: name.to_string(),
            email,
            password: str_field("password").unwrap_or_default().to_string(),
        })
    } else {
        Err(errors)
    }
}

/// Self-service profile changes: only name, email and photo.
pub fn validate_profile_update(input: &Document) -> Result<ProfileUpdate, FieldErrors> {
    let mut v = FieldsValidator::update(input);
    let name = v.string("name", None);
    let email = v.string("email", None).map(|e| normalize_email(&e));
    let photo = v.string("photo", None);
    if let Some(email) = &email {
        if !is_valid_email(email) {
            v.error("email", "Please provide a valid email");
        }
    }
    v.finish()?;
    Ok(ProfileUpdate { name, email, photo })
}

/// Administrative changes to a user document; credentials are not editable here.
pub fn validate_admin_update(input: &Document) -> Result<Document, FieldErrors> {
    let mut v = FieldsValidator::update(input);
    v.string("name", None);
    v.string("photo", None);
    if let Some(email) = v.string("email", None) {
        let email = normalize_email(&email);
        if is_valid_email(&email) {
            v.set("email", serde_json::Value::String(email));
        } else {
            v.error("email", "Please provide a valid email");
        }
    }
    if let Some(role) = v.string("role", None) {
        if Role::parse(&role).is_none() {
            v.error("role", "Role must be one of: user, guide, lead-guide, admin");
        }
    }
    for forbidden in ["password", "passwordConfirm", "passwordChangedAt", "passwordResetToken", "passwordResetExpires", "active"] {
        if input.contains_key(forbidden) {
            v.error(forbidden, "This field cannot be changed here");
        }
    }
    v.finish()
}
