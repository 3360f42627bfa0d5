//! Access control: practitioner accounts and administrative capabilities.
//!
//! Administrative actions take an [`AdminCapability`] issued by
//! [`AccessControl::grant_admin`]. The store checks it on every call instead
//! of trusting a caller-supplied flag.

use std::fmt;

use tracing::{info, warn};

use crate::db::{AdminGrant, Database};
use crate::models::{sha256_hex, Practitioner};
use crate::store::validation::require;
use crate::store::{StoreError, StoreResult};

/// Opaque administrative capability token.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCapability {
    token: String,
    expires_at: i64,
}

impl AdminCapability {
    /// Rebuild a capability from a token handed back by the UI layer.
    pub fn from_token(token: String) -> Self {
        Self {
            token,
            expires_at: 0,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Expiry in unix seconds, as issued (0 when rebuilt from a bare token).
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

impl fmt::Debug for AdminCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCapability")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Administrator credential and grant lifetime.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub admin_username: String,
    /// Hex SHA-256 of the administrator password; empty disables admin access
    pub admin_password_sha256: String,
    pub grant_ttl_minutes: u32,
}

/// Check that `capability` names a live grant.
pub fn verify_admin(db: &Database, capability: &AdminCapability) -> StoreResult<()> {
    let denied = || StoreError::Authorization("administrative capability required".into());

    let grant = db
        .get_admin_grant(&sha256_hex(capability.token()))?
        .ok_or_else(denied)?;
    if grant.is_expired(now_unix()) {
        return Err(denied());
    }
    Ok(())
}

/// Access control over a database connection.
pub struct AccessControl<'a> {
    db: &'a Database,
    policy: &'a AccessPolicy,
}

impl<'a> AccessControl<'a> {
    /// Create a new access controller.
    pub fn new(db: &'a Database, policy: &'a AccessPolicy) -> Self {
        Self { db, policy }
    }

    // =========================================================================
    // Administrative capabilities
    // =========================================================================

    /// Exchange the administrator credential for a capability.
    pub fn grant_admin(&self, username: &str, password: &str) -> StoreResult<AdminCapability> {
        let configured = self.policy.admin_password_sha256.trim();
        if configured.is_empty() {
            warn!("Admin grant refused: no administrator credential configured");
            return Err(StoreError::Authorization(
                "administrator access is not configured".into(),
            ));
        }

        if username.trim() != self.policy.admin_username
            || !sha256_hex(password).eq_ignore_ascii_case(configured)
        {
            warn!(username = %username.trim(), "Admin grant refused: bad credentials");
            return Err(StoreError::Authorization("invalid administrator credentials".into()));
        }

        let now = now_unix();
        self.db.purge_expired_admin_grants(now)?;

        let token = uuid::Uuid::new_v4().simple().to_string();
        let grant = AdminGrant {
            token_hash: sha256_hex(&token),
            username: self.policy.admin_username.clone(),
            issued_at: now,
            expires_at: now + i64::from(self.policy.grant_ttl_minutes) * 60,
        };
        self.db.insert_admin_grant(&grant)?;

        info!(username = %grant.username, expires_at = grant.expires_at, "Admin capability granted");
        Ok(AdminCapability {
            token,
            expires_at: grant.expires_at,
        })
    }

    /// Check a capability.
    pub fn verify_admin(&self, capability: &AdminCapability) -> StoreResult<()> {
        verify_admin(self.db, capability)
    }

    /// Revoke a capability. Returns false if it was not live.
    pub fn revoke_admin(&self, capability: &AdminCapability) -> StoreResult<bool> {
        let revoked = self.db.delete_admin_grant(&sha256_hex(capability.token()))?;
        if revoked {
            info!("Admin capability revoked");
        }
        Ok(revoked)
    }

    /// Revoke every outstanding capability.
    pub fn revoke_all(&self) -> StoreResult<usize> {
        Ok(self.db.purge_admin_grants()?)
    }

    // =========================================================================
    // Practitioner registry
    // =========================================================================

    /// Register a practitioner account.
    pub fn register_practitioner(
        &self,
        capability: &AdminCapability,
        code: &str,
        name: &str,
        specialty: &str,
        password: &str,
    ) -> StoreResult<Practitioner> {
        self.verify_admin(capability)?;

        let code = require("code", code)?;
        let name = require("name", name)?;
        let password = require("password", password)?;

        if self.db.get_practitioner(&code)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "a practitioner with code {} already exists",
                code
            )));
        }

        let practitioner = Practitioner::new(code, name, specialty.trim().to_string(), &password);
        self.db.insert_practitioner(&practitioner)?;

        info!(code = %practitioner.code, "Practitioner registered");
        Ok(practitioner)
    }

    /// Remove a practitioner account. Their records are kept.
    pub fn remove_practitioner(&self, capability: &AdminCapability, code: &str) -> StoreResult<()> {
        self.verify_admin(capability)?;

        if !self.db.delete_practitioner(code.trim())? {
            return Err(StoreError::NotFound(format!("practitioner {}", code.trim())));
        }

        info!(code = %code.trim(), "Practitioner removed");
        Ok(())
    }

    /// Replace a practitioner's password.
    pub fn reset_password(
        &self,
        capability: &AdminCapability,
        code: &str,
        new_password: &str,
    ) -> StoreResult<()> {
        self.verify_admin(capability)?;

        let new_password = require("password", new_password)?;
        let mut practitioner = self.get_practitioner(code)?;
        practitioner.set_password(&new_password);
        self.db.update_practitioner(&practitioner)?;

        info!(code = %practitioner.code, "Practitioner password reset");
        Ok(())
    }

    /// Enable or disable sign-in for a practitioner.
    pub fn set_practitioner_active(
        &self,
        capability: &AdminCapability,
        code: &str,
        active: bool,
    ) -> StoreResult<Practitioner> {
        self.verify_admin(capability)?;

        let mut practitioner = self.get_practitioner(code)?;
        practitioner.active = active;
        self.db.update_practitioner(&practitioner)?;

        info!(code = %practitioner.code, active, "Practitioner status changed");
        Ok(practitioner)
    }

    /// Get a practitioner by code.
    pub fn get_practitioner(&self, code: &str) -> StoreResult<Practitioner> {
        let code = code.trim();
        self.db
            .get_practitioner(code)?
            .ok_or_else(|| StoreError::NotFound(format!("practitioner {}", code)))
    }

    /// All practitioners ordered by code.
    pub fn list_practitioners(&self) -> StoreResult<Vec<Practitioner>> {
        Ok(self.db.list_practitioners()?)
    }

    /// Check practitioner credentials.
    ///
    /// Unknown codes, inactive accounts and wrong passwords all produce the
    /// same error.
    pub fn verify_practitioner(&self, code: &str, password: &str) -> StoreResult<Practitioner> {
        let denied = || StoreError::Authorization("invalid practitioner credentials".into());

        let practitioner = self.db.get_practitioner(code.trim())?.ok_or_else(denied)?;
        if !practitioner.active || !practitioner.password_matches(password) {
            warn!(code = %code.trim(), "Practitioner sign-in refused");
            return Err(denied());
        }
        Ok(practitioner)
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
