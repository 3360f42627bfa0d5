//! Administrative capability grant storage.
//!
//! Only the SHA-256 of an issued token is stored; the token itself lives with
//! the caller.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};

/// A stored administrative grant.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminGrant {
    pub token_hash: String,
    pub username: String,
    /// Unix seconds
    pub issued_at: i64,
    /// Unix seconds
    pub expires_at: i64,
}

impl AdminGrant {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

impl Database {
    /// Store a new grant.
    pub fn insert_admin_grant(&self, grant: &AdminGrant) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO admin_grants (token_hash, username, issued_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![grant.token_hash, grant.username, grant.issued_at, grant.expires_at],
        )?;
        Ok(())
    }

    /// Look up a grant by token hash.
    pub fn get_admin_grant(&self, token_hash: &str) -> DbResult<Option<AdminGrant>> {
        self.conn
            .query_row(
                "SELECT token_hash, username, issued_at, expires_at FROM admin_grants WHERE token_hash = ?",
                [token_hash],
                |row| {
                    Ok(AdminGrant {
                        token_hash: row.get(0)?,
                        username: row.get(1)?,
                        issued_at: row.get(2)?,
                        expires_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Revoke a single grant.
    pub fn delete_admin_grant(&self, token_hash: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM admin_grants WHERE token_hash = ?", [token_hash])?;
        Ok(rows_affected > 0)
    }

    /// Drop grants that expired at or before `now`.
    pub fn purge_expired_admin_grants(&self, now: i64) -> DbResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM admin_grants WHERE expires_at <= ?", [now])?)
    }

    /// Revoke every grant.
    pub fn purge_admin_grants(&self) -> DbResult<usize> {
        Ok(self.conn.execute("DELETE FROM admin_grants", [])?)
    }
}
