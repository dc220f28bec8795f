use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{Credentials, NewUser, ProfileUpdate, ResetToken, User, UserRecord};
use crate::database::store::PrincipalStore;

const USER_COLUMNS: &str = "\"id\", \"name\", \"email\", \"photo\", \"role\", \"password\", \
    \"passwordChangedAt\", \"passwordResetToken\", \"passwordResetExpires\", \"active\", \"createdAt\"";

/// Principal store over the `users` table.
pub struct PgPrincipalStore {
    pool: PgPool,
}

impl PgPrincipalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_record(&self, condition: &str, value: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM \"users\" WHERE {} = $1 AND \"active\" IS DISTINCT FROM false",
            USER_COLUMNS, condition
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.find_credentials_by_id(id).await?.map(|c| c.user))
    }

    async fn find_credentials_by_id(&self, id: Uuid) -> Result<Option<Credentials>, DatabaseError> {
        let record = self.fetch_record("\"id\"::text", &id.to_string()).await?;
        Ok(record.map(UserRecord::into_credentials))
    }

    async fn find_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>, DatabaseError> {
        let record = self.fetch_record("\"email\"", email).await?;
        Ok(record.map(UserRecord::into_credentials))
    }

    async fn find_by_reset_token(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<User>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM \"users\" WHERE \"passwordResetToken\" = $1 AND \"passwordResetExpires\" > $2 \
             AND \"active\" IS DISTINCT FROM false",
            USER_COLUMNS
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record.map(UserRecord::into_user))
    }

    async fn insert(&self, user: NewUser) -> Result<User, DatabaseError> {
        let record = user.into_record(Utc::now());
        let sql = format!(
            "INSERT INTO \"users\" ({}, \"version\") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0) RETURNING {}",
            USER_COLUMNS, USER_COLUMNS
        );
        let inserted = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(record.id)
            .bind(&record.name)
            .bind(&record.email)
            .bind(&record.photo)
            .bind(&record.role)
            .bind(&record.password)
            .bind(record.password_changed_at)
            .bind(&record.password_reset_token)
            .bind(record.password_reset_expires)
            .bind(record.active)
            .bind(record.created_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(inserted.into_user())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str, changed_at: DateTime<Utc>) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE \"users\" SET \"password\" = $2, \"passwordChangedAt\" = $3, \"passwordResetToken\" = NULL, \
             \"passwordResetExpires\" = NULL, \"version\" = \"version\" + 1 WHERE \"id\" = $1",
        )
        .bind(id)
        .bind(password_hash)
        .bind(changed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_reset_token(&self, id: Uuid, reset: Option<ResetToken>) -> Result<(), DatabaseError> {
        let (token_hash, expires_at) = match reset {
            Some(reset) => (Some(reset.token_hash), Some(reset.expires_at)),
            None => (None, None),
        };
        sqlx::query(
            "UPDATE \"users\" SET \"passwordResetToken\" = $2, \"passwordResetExpires\" = $3 WHERE \"id\" = $1",
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_profile(&self, id: Uuid, changes: ProfileUpdate) -> Result<Option<User>, DatabaseError> {
        let sql = format!(
            "UPDATE \"users\" SET \"name\" = COALESCE($2, \"name\"), \"email\" = COALESCE($3, \"email\"), \
             \"photo\" = COALESCE($4, \"photo\"), \"version\" = \"version\" + 1 \
             WHERE \"id\" = $1 AND \"active\" IS DISTINCT FROM false RETURNING {}",
            USER_COLUMNS
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(changes.name)
            .bind(changes.email)
            .bind(changes.photo)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record.map(UserRecord::into_user))
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE \"users\" SET \"active\" = false, \"version\" = \"version\" + 1 WHERE \"id\" = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Deactivated user {}", id);
        Ok(())
    }
}
