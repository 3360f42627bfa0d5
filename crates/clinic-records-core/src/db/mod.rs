//! Database layer for clinic records.

mod schema;
mod grants;
mod practitioners;
mod records;

pub use schema::*;
pub use grants::*;
#[allow(unused_imports)]
pub use practitioners::*;
#[allow(unused_imports)]
pub use records::*;

use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    ///
    /// File databases run in WAL mode with `synchronous = FULL`, so a write
    /// is on disk before the call that made it returns.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema and refuse databases written by a newer version.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        let version = self.schema_version()?;
        if version > SCHEMA_VERSION {
            return Err(DbError::Constraint(format!(
                "Database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }
        Ok(())
    }

    /// Schema version recorded in `schema_meta`.
    pub fn schema_version(&self) -> DbResult<u32> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(v) => v
                .parse()
                .map_err(|_| DbError::Constraint(format!("Invalid schema version: {}", v))),
            None => Err(DbError::NotFound("schema_version".into())),
        }
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction, committing only if it succeeds.
    pub fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Database) -> Result<T, E>,
        E: From<DbError>,
    {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| E::from(DbError::from(e)))?;
        let value = f(self)?;
        tx.commit().map_err(|e| E::from(DbError::from(e)))?;
        Ok(value)
    }

    /// Close the connection, reporting any error SQLite raises on close.
    pub fn close(self) -> DbResult<()> {
        self.conn.close().map_err(|(_, e)| DbError::Sqlite(e))
    }
}
