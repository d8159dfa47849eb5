use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::repo_types::{NewUser, ProfileChanges, User},
    error::AuthError,
};

const USER_COLUMNS: &str = "id, name, email, phone, avatar, user_type, password_hash, \
     is_email_verified, is_approved, is_active, address, longitude, latitude, \
     created_at, updated_at, last_login_at";

impl User {
    /// Find a user by (already lowercased) email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Insert a new credential record. Two racing registrations can both
    /// pass the handler's existence pre-check; the unique index on email
    /// decides the loser here, surfaced as `DuplicateEmail`.
    pub async fn create(db: &PgPool, new_user: NewUser) -> Result<User, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users
                (name, email, phone, avatar, user_type, password_hash,
                 is_approved, address, longitude, latitude)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.phone)
        .bind(&new_user.avatar)
        .bind(new_user.user_type)
        .bind(&new_user.password_hash)
        .bind(new_user.is_approved)
        .bind(&new_user.address)
        .bind(new_user.longitude)
        .bind(new_user.latitude)
        .fetch_one(db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AuthError::DuplicateEmail
            }
            _ => AuthError::Database(e),
        })?;
        Ok(user)
    }

    /// Apply allow-listed profile changes. `COALESCE` keeps every field
    /// the caller did not supply, which is what makes location updates a
    /// merge instead of a replacement. `phone` and `avatar` are nullable
    /// on the record, so they carry an explicit "was supplied" flag and
    /// can be cleared with an inner `None`. Returns `None` if the record
    /// is gone.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                phone = CASE WHEN $3 THEN $4 ELSE phone END,
                avatar = CASE WHEN $5 THEN $6 ELSE avatar END,
                address = COALESCE($7, address),
                longitude = COALESCE($8, longitude),
                latitude = COALESCE($9, latitude),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(changes.phone.is_some())
        .bind(changes.phone.clone().flatten())
        .bind(changes.avatar.is_some())
        .bind(changes.avatar.clone().flatten())
        .bind(&changes.address)
        .bind(changes.longitude)
        .bind(changes.latitude)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn touch_last_login(db: &PgPool, id: Uuid) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }
}
