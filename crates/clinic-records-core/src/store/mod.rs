//! Clinical record store.
//!
//! Owns the record lifecycle:
//!
//! ```text
//!   create ──► scheduled ──reschedule──► rescheduled ──┐
//!                  │                         ▲   │      │ reschedule
//!                  │                         └───┘◄─────┘
//!                  └──────finalize──────► completed ◄──finalize
//!                                         (terminal)
//! ```
//!
//! Deletion is hard and requires an administrative capability.

pub mod validation;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::access::{self, AdminCapability};
use crate::db::{Database, DbError};
use crate::models::{FinalizeRequest, Record, RecordStatus};

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn validation(field: &str, reason: &str) -> Self {
        StoreError::Validation {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    /// The error category, for presentation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Validation { .. } => ErrorKind::Validation,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Authorization(_) => ErrorKind::Authorization,
            StoreError::Database(_) => ErrorKind::Internal,
        }
    }
}

/// Error categories with one fixed user-facing message each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Authorization,
    Internal,
}

impl ErrorKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Some information is missing or invalid. Please review the form.",
            ErrorKind::NotFound => "The requested entry no longer exists. Please refresh the list.",
            ErrorKind::Conflict => "This action is not allowed in the entry's current state.",
            ErrorKind::Authorization => "You are not authorized to perform this action.",
            ErrorKind::Internal => "An unexpected storage error occurred.",
        }
    }
}

/// Record store over a database connection.
pub struct RecordStore<'a> {
    db: &'a Database,
}

impl<'a> RecordStore<'a> {
    /// Create a new record store.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a scheduled record.
    pub fn create(
        &self,
        owner_code: &str,
        subject_name: &str,
        scheduled_date: &str,
        scheduled_time: &str,
        reason: &str,
    ) -> StoreResult<Record> {
        let input = validation::new_record(
            owner_code,
            subject_name,
            scheduled_date,
            scheduled_time,
            reason,
        )?;
        let record = Record::new(input);
        self.db.insert_record(&record)?;

        info!(record_id = %record.id, owner = %record.owner_code, "Record created");
        Ok(record)
    }

    /// Create a record at most once per client request ID.
    ///
    /// Replaying a request returns the original record. Reusing the ID with
    /// different input is a conflict.
    pub fn create_idempotent(
        &self,
        request_id: &str,
        owner_code: &str,
        subject_name: &str,
        scheduled_date: &str,
        scheduled_time: &str,
        reason: &str,
    ) -> StoreResult<Record> {
        let request_id = validation::require("request_id", request_id)?;
        let input = validation::new_record(
            owner_code,
            subject_name,
            scheduled_date,
            scheduled_time,
            reason,
        )?;

        if let Some(existing) = self.db.get_record_by_request_id(&request_id)? {
            if existing.created_from(&input) {
                debug!(record_id = %existing.id, request_id = %request_id, "Replayed create");
                return Ok(existing);
            }
            return Err(StoreError::Conflict(format!(
                "request {} was already used for different input",
                request_id
            )));
        }

        let digest = input.digest();
        let mut record = Record::new(input);
        record.request_id = Some(request_id);
        record.request_digest = Some(digest);
        self.db.insert_record(&record)?;

        info!(record_id = %record.id, owner = %record.owner_code, "Record created");
        Ok(record)
    }

    /// Get a record by ID.
    pub fn get(&self, id: &str) -> StoreResult<Record> {
        self.db
            .get_record(id)?
            .ok_or_else(|| StoreError::NotFound(format!("record {}", id)))
    }

    /// Case-insensitive substring search on the patient name.
    ///
    /// The query is trimmed first, so `"a "` matches `"Ana"`. An empty
    /// query matches every record. Results are ordered newest
    /// appointment first and are identical across calls on the same state.
    pub fn search(&self, query: &str, owner_code: Option<&str>) -> StoreResult<Vec<Record>> {
        let owner = owner_code
            .map(|code| validation::require("owner_code", code))
            .transpose()?;
        let needle = query.trim().to_lowercase();

        let results: Vec<Record> = self
            .db
            .list_records(owner.as_deref())?
            .into_iter()
            .filter(|record| record.subject_matches(&needle))
            .collect();

        debug!(query = %needle, owner = ?owner, matches = results.len(), "Record search");
        Ok(results)
    }

    /// All records of one practitioner, newest appointment first.
    pub fn list_for_owner(&self, owner_code: &str) -> StoreResult<Vec<Record>> {
        self.search("", Some(owner_code))
    }

    /// Distinct patient names, sorted case-insensitively.
    pub fn patients(&self, owner_code: Option<&str>) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self
            .search("", owner_code)?
            .into_iter()
            .map(|record| record.subject_name)
            .collect();
        names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
        names.dedup();
        Ok(names)
    }

    /// Number of stored records.
    pub fn count(&self) -> StoreResult<usize> {
        Ok(self.db.count_records()?)
    }

    /// Move a record to a new date and time.
    ///
    /// Repeating the same reschedule leaves the record untouched.
    pub fn reschedule(&self, id: &str, new_date: &str, new_time: &str) -> StoreResult<Record> {
        let mut record = self.get(id)?;
        if record.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "record {} is completed and can no longer be rescheduled",
                id
            )));
        }

        let date = validation::parse_date("scheduled_date", new_date)?;
        let time = validation::parse_time("scheduled_time", new_time)?;

        if record.status == RecordStatus::Rescheduled
            && record.scheduled_date == date
            && record.scheduled_time == time
        {
            return Ok(record);
        }

        record.scheduled_date = date;
        record.scheduled_time = time;
        record.status = RecordStatus::Rescheduled;
        record.touch();
        self.persist(&record)?;

        info!(record_id = %record.id, date = %date, time = %time, "Record rescheduled");
        Ok(record)
    }

    /// Attach clinical notes and mark the record completed.
    pub fn finalize(&self, id: &str, request: &FinalizeRequest) -> StoreResult<Record> {
        let mut record = self.get(id)?;
        if record.status.is_terminal() {
            return Err(StoreError::Conflict(format!(
                "record {} is already completed",
                id
            )));
        }

        let notes = validation::clinical_notes(request, record.scheduled_date)?;
        record.clinical_notes = Some(notes);
        record.status = RecordStatus::Completed;
        record.touch();
        self.persist(&record)?;

        info!(record_id = %record.id, "Record finalized");
        Ok(record)
    }

    /// Permanently delete a record. Requires an administrative capability.
    pub fn delete(&self, id: &str, capability: &AdminCapability) -> StoreResult<()> {
        if let Err(e) = access::verify_admin(self.db, capability) {
            warn!(record_id = %id, "Delete rejected: missing administrative capability");
            return Err(e);
        }

        if !self.db.delete_record(id)? {
            return Err(StoreError::NotFound(format!("record {}", id)));
        }

        info!(record_id = %id, "Record deleted");
        Ok(())
    }

    fn persist(&self, record: &Record) -> StoreResult<()> {
        if !self.db.update_record(record)? {
            return Err(StoreError::NotFound(format!("record {}", record.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessControl, AccessPolicy};
    use crate::models::sha256_hex;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn policy() -> AccessPolicy {
        AccessPolicy {
            admin_username: "admin".into(),
            admin_password_sha256: sha256_hex("admin-pw"),
            grant_ttl_minutes: 30,
        }
    }

    fn flu() -> FinalizeRequest {
        FinalizeRequest {
            diagnosis: "flu".into(),
            prescription: "rest".into(),
            treatment_days: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_sets_scheduled() {
        let db = setup_db();
        let store = RecordStore::new(&db);

        let record = store
            .create(" DOC1 ", "Maria Lopez ", "2024-06-01", "09:00", "checkup")
            .unwrap();
        assert_eq!(record.status, RecordStatus::Scheduled);
        assert_eq!(record.owner_code, "DOC1");
        assert_eq!(record.subject_name, "Maria Lopez");
        assert!(record.clinical_notes.is_none());
        assert_eq!(store.get(&record.id).unwrap(), record);
    }

    #[test]
    fn test_create_invalid_writes_nothing() {
        let db = setup_db();
        let store = RecordStore::new(&db);

        let err = store
            .create("DOC1", "Maria", "2024-13-01", "09:00", "checkup")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_search_owner_filter() {
        let db = setup_db();
        let store = RecordStore::new(&db);

        store.create("DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup").unwrap();
        store.create("DOC2", "Mario Diaz", "2024-06-02", "09:00", "checkup").unwrap();

        assert_eq!(store.search("mar", None).unwrap().len(), 2);
        let mine = store.search("mar", Some("DOC1")).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].subject_name, "Maria Lopez");
        assert!(store.search("zzz", None).unwrap().is_empty());
        assert_eq!(store.search("", Some(" ")).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_reschedule_completed_conflicts() {
        let db = setup_db();
        let store = RecordStore::new(&db);

        let record = store.create("DOC1", "Maria", "2024-06-01", "09:00", "checkup").unwrap();
        store.finalize(&record.id, &flu()).unwrap();

        let err = store.reschedule(&record.id, "2024-06-03", "10:00").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_reschedule_to_same_slot_still_marks_rescheduled() {
        let db = setup_db();
        let store = RecordStore::new(&db);

        let record = store.create("DOC1", "Maria", "2024-06-01", "09:00", "checkup").unwrap();
        let moved = store.reschedule(&record.id, "2024-06-01", "09:00").unwrap();
        assert_eq!(moved.status, RecordStatus::Rescheduled);
    }

    #[test]
    fn test_reschedule_missing() {
        let db = setup_db();
        let store = RecordStore::new(&db);
        let err = store.reschedule("missing", "2024-06-01", "09:00").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_create_idempotent() {
        let db = setup_db();
        let store = RecordStore::new(&db);

        let first = store
            .create_idempotent("req-1", "DOC1", "Maria", "2024-06-01", "09:00", "checkup")
            .unwrap();
        let replay = store
            .create_idempotent("req-1", "DOC1", "Maria", "2024-06-01", "09:00", "checkup")
            .unwrap();
        assert_eq!(first, replay);
        assert_eq!(store.count().unwrap(), 1);

        let err = store
            .create_idempotent("req-1", "DOC1", "Maria", "2024-06-02", "09:00", "checkup")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_delete_requires_capability() {
        let db = setup_db();
        let store = RecordStore::new(&db);
        let record = store.create("DOC1", "Maria", "2024-06-01", "09:00", "checkup").unwrap();

        let forged = AdminCapability::from_token("not-a-real-token".into());
        let err = store.delete(&record.id, &forged).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(store.count().unwrap(), 1);

        let policy = policy();
        let cap = AccessControl::new(&db, &policy).grant_admin("admin", "admin-pw").unwrap();
        store.delete(&record.id, &cap).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_patients_are_distinct_and_sorted() {
        let db = setup_db();
        let store = RecordStore::new(&db);

        store.create("DOC1", "luis", "2024-06-01", "09:00", "a").unwrap();
        store.create("DOC1", "Ana", "2024-06-02", "09:00", "b").unwrap();
        store.create("DOC2", "Ana", "2024-06-03", "09:00", "c").unwrap();

        assert_eq!(store.patients(None).unwrap(), vec!["Ana", "luis"]);
        assert_eq!(store.patients(Some("DOC2")).unwrap(), vec!["Ana"]);
    }

    #[test]
    fn test_error_kind_messages_are_distinct() {
        let kinds = [
            ErrorKind::Validation,
            ErrorKind::NotFound,
            ErrorKind::Conflict,
            ErrorKind::Authorization,
            ErrorKind::Internal,
        ];
        let messages: std::collections::HashSet<_> =
            kinds.iter().map(|k| k.user_message()).collect();
        assert_eq!(messages.len(), kinds.len());
    }
}
