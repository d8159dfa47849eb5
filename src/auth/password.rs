use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::error;

/// A password as received from the client. Wrapping it keeps the hasher
/// from ever being handed an already-hashed value, and keeps the raw
/// secret out of debug output.
pub struct PlaintextPassword(String);

impl PlaintextPassword {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for PlaintextPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PlaintextPassword(..)")
    }
}

/// An argon2 PHC string as stored in the credential record. Decodes
/// straight from the `password_hash` column.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::Type)]
#[sqlx(transparent)]
pub struct HashedPassword(String);

impl HashedPassword {
    /// Salts and hashes a plaintext password. This is the only way to
    /// produce a new hash, so a record's password field can never be
    /// hashed twice.
    pub fn from_plaintext(plain: &PlaintextPassword) -> anyhow::Result<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(plain.0.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(Self(hash))
    }

    /// Returns false on mismatch; errors only if the stored hash itself
    /// is malformed.
    pub fn verify(&self, candidate: &PlaintextPassword) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(&self.0).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(Argon2::default()
            .verify_password(candidate.0.as_bytes(), &parsed)
            .is_ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
impl HashedPassword {
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = PlaintextPassword::new("Secur3P@ssw0rd!");
        let hash = HashedPassword::from_plaintext(&password).expect("hashing should succeed");
        assert!(hash.verify(&password).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = PlaintextPassword::new("correct-horse-battery-staple");
        let hash = HashedPassword::from_plaintext(&password).expect("hashing should succeed");
        assert!(!hash
            .verify(&PlaintextPassword::new("wrong-password"))
            .expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let hash = HashedPassword::from_stored("not-a-valid-hash");
        let err = hash.verify(&PlaintextPassword::new("anything")).unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn plaintext_debug_does_not_leak_secret() {
        let password = PlaintextPassword::new("hunter2-hunter2");
        assert_eq!(format!("{:?}", password), "PlaintextPassword(..)");
    }

    #[test]
    fn hashing_twice_yields_different_salts() {
        let password = PlaintextPassword::new("same-input");
        let a = HashedPassword::from_plaintext(&password).unwrap();
        let b = HashedPassword::from_plaintext(&password).unwrap();
        assert_ne!(a, b);
    }
}
