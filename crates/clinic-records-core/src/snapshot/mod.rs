//! Versioned snapshots of the practitioner and record collections.

mod legacy;

pub use legacy::*;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::access::{verify_admin, AdminCapability};
use crate::db::{Database, SCHEMA_VERSION};
use crate::models::{Practitioner, Record, RecordStatus};
use crate::store::{validation, StoreError, StoreResult};

/// Full export of both collections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Format version; equals the database schema version
    pub schema_version: u32,
    /// Export timestamp
    pub exported_at: String,
    pub practitioners: Vec<Practitioner>,
    pub records: Vec<Record>,
}

impl Snapshot {
    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a snapshot, refusing versions newer than this build understands.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)
            .map_err(|e| StoreError::validation("snapshot", &format!("is malformed: {}", e)))?;

        if snapshot.schema_version == 0 || snapshot.schema_version > SCHEMA_VERSION {
            return Err(StoreError::validation(
                "schema_version",
                &format!(
                    "{} is not supported (expected 1..={})",
                    snapshot.schema_version, SCHEMA_VERSION
                ),
            ));
        }
        Ok(snapshot)
    }

    /// Check record and account invariants before anything is written.
    fn validate(&self) -> StoreResult<()> {
        let mut codes = HashSet::new();
        for (i, p) in self.practitioners.iter().enumerate() {
            if p.code.trim().is_empty() || p.name.trim().is_empty() {
                return Err(StoreError::validation(
                    &format!("practitioners[{}]", i),
                    "code and name are required",
                ));
            }
            if !codes.insert(p.code.as_str()) {
                return Err(StoreError::validation(
                    &format!("practitioners[{}].code", i),
                    "is duplicated",
                ));
            }
        }

        let mut ids = HashSet::new();
        let mut request_ids = HashSet::new();
        for (i, r) in self.records.iter().enumerate() {
            let field = format!("records[{}]", i);
            if r.id.trim().is_empty() || !ids.insert(r.id.as_str()) {
                return Err(StoreError::validation(&format!("{}.id", field), "must be unique and non-empty"));
            }
            if let Some(req) = r.request_id.as_deref() {
                if !request_ids.insert(req) {
                    return Err(StoreError::validation(&format!("{}.request_id", field), "is duplicated"));
                }
            }
            if r.owner_code.trim().is_empty()
                || r.subject_name.trim().is_empty()
                || r.reason.trim().is_empty()
            {
                return Err(StoreError::validation(
                    &field,
                    "owner_code, subject_name and reason are required",
                ));
            }
            match (r.status, r.clinical_notes.as_ref()) {
                (RecordStatus::Completed, Some(notes)) => {
                    validation::verify_notes(notes, r.scheduled_date).map_err(|e| match e {
                        StoreError::Validation { field: inner, reason } => StoreError::Validation {
                            field: format!("{}.clinical_notes.{}", field, inner),
                            reason,
                        },
                        other => other,
                    })?;
                }
                (RecordStatus::Completed, None) => {
                    return Err(StoreError::validation(&field, "completed records need clinical notes"));
                }
                (_, Some(_)) => {
                    return Err(StoreError::validation(&field, "only completed records carry clinical notes"));
                }
                (_, None) => {}
            }
        }
        Ok(())
    }
}

/// Counts reported after a restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub practitioners: usize,
    pub records: usize,
}

/// Snapshot export/restore over a database connection.
pub struct SnapshotManager<'a> {
    db: &'a Database,
}

impl<'a> SnapshotManager<'a> {
    /// Create a new snapshot manager.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Capture both collections. Requires an administrative capability,
    /// since the snapshot carries practitioner credential digests.
    pub fn export(&self, capability: &AdminCapability) -> StoreResult<Snapshot> {
        verify_admin(self.db, capability)?;

        Ok(Snapshot {
            schema_version: SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            practitioners: self.db.list_practitioners()?,
            records: self.db.list_records(None)?,
        })
    }

    /// Replace both collections with the snapshot contents, atomically.
    pub fn restore(&self, capability: &AdminCapability, snapshot: &Snapshot) -> StoreResult<RestoreReport> {
        verify_admin(self.db, capability)?;
        snapshot.validate()?;

        self.db.with_transaction(|db| -> StoreResult<()> {
            db.delete_all_records()?;
            db.delete_all_practitioners()?;
            for practitioner in &snapshot.practitioners {
                db.insert_practitioner(practitioner)?;
            }
            for record in &snapshot.records {
                db.insert_record(record)?;
            }
            Ok(())
        })?;

        let report = RestoreReport {
            practitioners: snapshot.practitioners.len(),
            records: snapshot.records.len(),
        };
        info!(
            practitioners = report.practitioners,
            records = report.records,
            "Snapshot restored"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessControl, AccessPolicy};
    use crate::models::{sha256_hex, FinalizeRequest};
    use crate::store::{ErrorKind, RecordStore};

    fn policy() -> AccessPolicy {
        AccessPolicy {
            admin_username: "admin".into(),
            admin_password_sha256: sha256_hex("admin-pw"),
            grant_ttl_minutes: 30,
        }
    }

    fn seeded_db() -> (Database, AdminCapability) {
        let db = Database::open_in_memory().unwrap();
        let policy = policy();
        let cap = AccessControl::new(&db, &policy).grant_admin("admin", "admin-pw").unwrap();
        AccessControl::new(&db, &policy)
            .register_practitioner(&cap, "DOC1", "Ana Ruiz", "Cardiology", "pw")
            .unwrap();

        let store = RecordStore::new(&db);
        let record = store.create("DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup").unwrap();
        store
            .finalize(
                &record.id,
                &FinalizeRequest {
                    diagnosis: "flu".into(),
                    prescription: "rest".into(),
                    treatment_days: 5,
                    ..Default::default()
                },
            )
            .unwrap();
        store.create("DOC1", "Luis Diaz", "2024-06-02", "10:00", "follow-up").unwrap();
        (db, cap)
    }

    #[test]
    fn test_export_restore_preserves_state() {
        let (db, cap) = seeded_db();
        let manager = SnapshotManager::new(&db);
        let snapshot = manager.export(&cap).unwrap();
        assert_eq!(snapshot.schema_version, SCHEMA_VERSION);
        assert_eq!(snapshot.records.len(), 2);

        let json = snapshot.to_json().unwrap();
        let parsed = Snapshot::from_json(&json).unwrap();
        assert_eq!(parsed, snapshot);

        // Mutate, then restore
        RecordStore::new(&db).create("DOC1", "Extra", "2024-07-01", "09:00", "x").unwrap();
        let report = manager.restore(&cap, &parsed).unwrap();
        assert_eq!(report, RestoreReport { practitioners: 1, records: 2 });
        assert_eq!(manager.export(&cap).unwrap().records, snapshot.records);
    }

    #[test]
    fn test_newer_version_rejected() {
        let json = r#"{"schema_version": 99, "exported_at": "", "practitioners": [], "records": []}"#;
        let err = Snapshot::from_json(json).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_unversioned_blob_rejected() {
        let err = Snapshot::from_json(r#"[{"id": "1"}]"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_invalid_snapshot_leaves_store_untouched() {
        let (db, cap) = seeded_db();
        let manager = SnapshotManager::new(&db);
        let mut snapshot = manager.export(&cap).unwrap();
        let before = snapshot.records.clone();

        snapshot.records[1].clinical_notes = None;
        snapshot.records[1].status = RecordStatus::Completed;
        snapshot.records[0].status = RecordStatus::Completed;
        snapshot.records[0].clinical_notes = None;

        assert!(manager.restore(&cap, &snapshot).is_err());
        assert_eq!(manager.export(&cap).unwrap().records, before);
    }

    #[test]
    fn test_restore_requires_capability() {
        let (db, cap) = seeded_db();
        let manager = SnapshotManager::new(&db);
        let snapshot = manager.export(&cap).unwrap();

        let forged = AdminCapability::from_token("forged".into());
        let err = manager.restore(&forged, &snapshot).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn test_export_requires_capability() {
        let (db, cap) = seeded_db();
        let policy = policy();
        AccessControl::new(&db, &policy).revoke_admin(&cap).unwrap();

        let err = SnapshotManager::new(&db).export(&cap).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn test_restore_rejects_records_finalize_would_refuse() {
        let (db, cap) = seeded_db();
        let manager = SnapshotManager::new(&db);
        let good = manager.export(&cap).unwrap();
        let completed = good
            .records
            .iter()
            .position(|r| r.status == RecordStatus::Completed)
            .unwrap();
        let scheduled = 1 - completed;

        let mut blank_reason = good.clone();
        blank_reason.records[scheduled].reason = "  ".into();

        let mut zero_days = good.clone();
        if let Some(notes) = zero_days.records[completed].clinical_notes.as_mut() {
            notes.treatment_days = 0;
        }

        let mut blank_diagnosis = good.clone();
        if let Some(notes) = blank_diagnosis.records[completed].clinical_notes.as_mut() {
            notes.diagnosis = String::new();
        }

        let mut stray_notes = good.clone();
        stray_notes.records[scheduled].clinical_notes =
            good.records[completed].clinical_notes.clone();

        for bad in [blank_reason, zero_days, blank_diagnosis, stray_notes] {
            let err = manager.restore(&cap, &bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(manager.export(&cap).unwrap().records, good.records);
    }
}
