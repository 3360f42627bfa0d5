//! Practitioner accounts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A practitioner account. Credentials are kept as a salted SHA-256 digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Practitioner {
    /// Practitioner code, unique
    pub code: String,
    /// Display name
    pub name: String,
    /// Medical specialty
    pub specialty: String,
    /// Hex SHA-256 of salt + password
    pub password_hash: String,
    /// Per-account random salt
    pub salt: String,
    /// Inactive accounts cannot sign in
    pub active: bool,
    /// Creation timestamp
    pub created_at: String,
}

impl Practitioner {
    /// Create an active practitioner, hashing the given password.
    pub fn new(code: String, name: String, specialty: String, password: &str) -> Self {
        let salt = uuid::Uuid::new_v4().simple().to_string();
        Self {
            code,
            name,
            specialty,
            password_hash: hash_password(&salt, password),
            salt,
            active: true,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Replace the stored credential.
    pub fn set_password(&mut self, password: &str) {
        self.salt = uuid::Uuid::new_v4().simple().to_string();
        self.password_hash = hash_password(&self.salt, password);
    }

    /// Check a candidate password against the stored digest.
    pub fn password_matches(&self, password: &str) -> bool {
        hash_password(&self.salt, password) == self.password_hash
    }
}

/// Hex SHA-256 of `salt || password`.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of an opaque token or secret.
pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}
