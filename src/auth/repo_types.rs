use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{auth::password::HashedPassword, error::AuthError};

/// Account classification, fixed at creation. Drives the approval gate
/// and role checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_type", rename_all = "lowercase")]
pub enum UserType {
    Volunteer,
    Elder,
    Admin,
}

/// Credential record as stored in the `users` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub user_type: UserType,
    #[serde(skip_serializing)]
    pub password_hash: HashedPassword,
    pub is_email_verified: bool,
    pub is_approved: bool,
    pub is_active: bool,
    pub address: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub last_login_at: Option<OffsetDateTime>,
}

impl User {
    /// Approval gate: unapproved volunteers are rejected, elders and
    /// admins pass unconditionally.
    pub fn require_approved(&self) -> Result<(), AuthError> {
        if self.user_type == UserType::Volunteer && !self.is_approved {
            return Err(AuthError::Forbidden("Account approval required".into()));
        }
        Ok(())
    }

    pub fn require_type(&self, allowed: &[UserType]) -> Result<(), AuthError> {
        if !allowed.contains(&self.user_type) {
            return Err(AuthError::Forbidden("Insufficient permissions".into()));
        }
        Ok(())
    }
}

/// Fields persisted for a freshly registered account. The password is
/// already hashed by the time this exists.
#[derive(Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub user_type: UserType,
    pub password_hash: HashedPassword,
    pub is_approved: bool,
    pub address: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

/// Allow-listed profile mutations. `None` leaves the stored value
/// untouched; location fields merge individually rather than replacing
/// the whole sub-object. The optional-on-the-record fields (`phone`,
/// `avatar`) are doubly optional: `Some(None)` clears the stored value,
/// which plain coalescing could never express.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub phone: Option<Option<String>>,
    pub avatar: Option<Option<String>>,
    pub address: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

#[cfg(test)]
pub(crate) fn fake_user(user_type: UserType, is_approved: bool, is_active: bool) -> User {
    User {
        id: Uuid::new_v4(),
        name: "Test User".into(),
        email: "test@example.com".into(),
        phone: None,
        avatar: None,
        user_type,
        password_hash: HashedPassword::from_stored("$argon2id$fake"),
        is_email_verified: false,
        is_approved,
        is_active,
        address: "1 Test Street".into(),
        longitude: None,
        latitude: None,
        created_at: OffsetDateTime::now_utc(),
        updated_at: OffsetDateTime::now_utc(),
        last_login_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unapproved_volunteer_is_rejected_by_approval_gate() {
        let user = fake_user(UserType::Volunteer, false, true);
        assert!(matches!(
            user.require_approved(),
            Err(AuthError::Forbidden(_))
        ));
    }

    #[test]
    fn approved_volunteer_passes_approval_gate() {
        let user = fake_user(UserType::Volunteer, true, true);
        assert!(user.require_approved().is_ok());
    }

    #[test]
    fn elder_passes_approval_gate_even_when_unapproved() {
        let user = fake_user(UserType::Elder, false, true);
        assert!(user.require_approved().is_ok());
    }

    #[test]
    fn admin_passes_approval_gate_even_when_unapproved() {
        let user = fake_user(UserType::Admin, false, true);
        assert!(user.require_approved().is_ok());
    }

    #[test]
    fn require_type_rejects_disallowed_role() {
        let user = fake_user(UserType::Elder, true, true);
        assert!(user.require_type(&[UserType::Elder, UserType::Admin]).is_ok());
        assert!(matches!(
            user.require_type(&[UserType::Volunteer]),
            Err(AuthError::Forbidden(_))
        ));
    }

    #[test]
    fn serialized_user_never_contains_password_hash() {
        let user = fake_user(UserType::Elder, true, true);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2"));
    }
}
