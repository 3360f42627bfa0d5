//! Record database operations.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{ClinicalNotes, Record, RecordStatus, DATE_FORMAT, TIME_FORMAT};

const RECORD_COLUMNS: &str = "id, request_id, request_digest, owner_code, subject_name, \
     scheduled_date, scheduled_time, reason, status, clinical_notes, created_at, updated_at";

/// Newest appointment first; ties resolve the same way on every call.
const RECORD_ORDER: &str =
    "ORDER BY scheduled_date DESC, scheduled_time DESC, created_at DESC, id DESC";

impl Database {
    /// Insert a new record.
    pub fn insert_record(&self, record: &Record) -> DbResult<()> {
        let notes_json = notes_to_json(&record.clinical_notes)?;

        self.conn.execute(
            r#"
            INSERT INTO records (
                id, request_id, request_digest, owner_code, subject_name, scheduled_date,
                scheduled_time, reason, status, clinical_notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                record.id,
                record.request_id,
                record.request_digest,
                record.owner_code,
                record.subject_name,
                record.scheduled_date.format(DATE_FORMAT).to_string(),
                record.scheduled_time.format(TIME_FORMAT).to_string(),
                record.reason,
                record.status.as_str(),
                notes_json,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update the mutable fields of a record (schedule, status, notes).
    ///
    /// Owner, subject, reason and creation data are never rewritten.
    pub fn update_record(&self, record: &Record) -> DbResult<bool> {
        let notes_json = notes_to_json(&record.clinical_notes)?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE records SET
                scheduled_date = ?2,
                scheduled_time = ?3,
                status = ?4,
                clinical_notes = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
            params![
                record.id,
                record.scheduled_date.format(DATE_FORMAT).to_string(),
                record.scheduled_time.format(TIME_FORMAT).to_string(),
                record.status.as_str(),
                notes_json,
                record.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a record by ID.
    pub fn get_record(&self, id: &str) -> DbResult<Option<Record>> {
        let sql = format!("SELECT {} FROM records WHERE id = ?", RECORD_COLUMNS);
        self.conn
            .query_row(&sql, [id], RecordRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a record by its client-supplied request ID.
    pub fn get_record_by_request_id(&self, request_id: &str) -> DbResult<Option<Record>> {
        let sql = format!("SELECT {} FROM records WHERE request_id = ?", RECORD_COLUMNS);
        self.conn
            .query_row(&sql, [request_id], RecordRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List records, optionally restricted to one owner, newest appointment first.
    pub fn list_records(&self, owner_code: Option<&str>) -> DbResult<Vec<Record>> {
        let rows = match owner_code {
            Some(owner) => {
                let sql = format!(
                    "SELECT {} FROM records WHERE owner_code = ? {}",
                    RECORD_COLUMNS, RECORD_ORDER
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map([owner], RecordRow::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!("SELECT {} FROM records {}", RECORD_COLUMNS, RECORD_ORDER);
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map([], RecordRow::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        rows.into_iter().map(Record::try_from).collect()
    }

    /// Count all records.
    pub fn count_records(&self) -> DbResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete a record.
    pub fn delete_record(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM records WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Delete every record (snapshot restore).
    pub fn delete_all_records(&self) -> DbResult<usize> {
        Ok(self.conn.execute("DELETE FROM records", [])?)
    }
}

/// Intermediate row struct for database mapping.
struct RecordRow {
    id: String,
    request_id: Option<String>,
    request_digest: Option<String>,
    owner_code: String,
    subject_name: String,
    scheduled_date: String,
    scheduled_time: String,
    reason: String,
    status: String,
    clinical_notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RecordRow {
            id: row.get(0)?,
            request_id: row.get(1)?,
            request_digest: row.get(2)?,
            owner_code: row.get(3)?,
            subject_name: row.get(4)?,
            scheduled_date: row.get(5)?,
            scheduled_time: row.get(6)?,
            reason: row.get(7)?,
            status: row.get(8)?,
            clinical_notes: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl TryFrom<RecordRow> for Record {
    type Error = DbError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let scheduled_date = NaiveDate::parse_from_str(&row.scheduled_date, DATE_FORMAT)
            .map_err(|_| DbError::Constraint(format!("Invalid stored date: {}", row.scheduled_date)))?;
        let scheduled_time = NaiveTime::parse_from_str(&row.scheduled_time, TIME_FORMAT)
            .map_err(|_| DbError::Constraint(format!("Invalid stored time: {}", row.scheduled_time)))?;
        let status = RecordStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown record status: {}", row.status)))?;
        let clinical_notes: Option<ClinicalNotes> = row
            .clinical_notes
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Record {
            id: row.id,
            request_id: row.request_id,
            request_digest: row.request_digest,
            owner_code: row.owner_code,
            subject_name: row.subject_name,
            scheduled_date,
            scheduled_time,
            reason: row.reason,
            status,
            clinical_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn notes_to_json(notes: &Option<ClinicalNotes>) -> DbResult<Option<String>> {
    notes
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(Into::into)
}
