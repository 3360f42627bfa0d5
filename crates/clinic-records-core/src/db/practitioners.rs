//! Practitioner database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::Practitioner;

const PRACTITIONER_COLUMNS: &str =
    "code, name, specialty, password_hash, salt, active, created_at";

impl Database {
    /// Insert a new practitioner.
    pub fn insert_practitioner(&self, practitioner: &Practitioner) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO practitioners (
                code, name, specialty, password_hash, salt, active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                practitioner.code,
                practitioner.name,
                practitioner.specialty,
                practitioner.password_hash,
                practitioner.salt,
                practitioner.active,
                practitioner.created_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing practitioner.
    pub fn update_practitioner(&self, practitioner: &Practitioner) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE practitioners SET
                name = ?2,
                specialty = ?3,
                password_hash = ?4,
                salt = ?5,
                active = ?6
            WHERE code = ?1
            "#,
            params![
                practitioner.code,
                practitioner.name,
                practitioner.specialty,
                practitioner.password_hash,
                practitioner.salt,
                practitioner.active,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a practitioner by code.
    pub fn get_practitioner(&self, code: &str) -> DbResult<Option<Practitioner>> {
        let sql = format!(
            "SELECT {} FROM practitioners WHERE code = ?",
            PRACTITIONER_COLUMNS
        );
        self.conn
            .query_row(&sql, [code], practitioner_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// List all practitioners ordered by code.
    pub fn list_practitioners(&self) -> DbResult<Vec<Practitioner>> {
        let sql = format!(
            "SELECT {} FROM practitioners ORDER BY code",
            PRACTITIONER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], practitioner_from_row)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a practitioner. Their records are kept.
    pub fn delete_practitioner(&self, code: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM practitioners WHERE code = ?", [code])?;
        Ok(rows_affected > 0)
    }

    /// Delete every practitioner (snapshot restore).
    pub fn delete_all_practitioners(&self) -> DbResult<usize> {
        Ok(self.conn.execute("DELETE FROM practitioners", [])?)
    }
}

fn practitioner_from_row(row: &Row<'_>) -> rusqlite::Result<Practitioner> {
    Ok(Practitioner {
        code: row.get(0)?,
        name: row.get(1)?,
        specialty: row.get(2)?,
        password_hash: row.get(3)?,
        salt: row.get(4)?,
        active: row.get(5)?,
        created_at: row.get(6)?,
    })
}
