//! Clinic Records Core Library
//!
//! Local-first store for clinic appointments and their clinical outcome.
//!
//! # Architecture
//!
//! ```text
//!        UI (forms, navigation, sign-in screens)
//!                       │  owner code / admin capability
//!                       ▼
//!             ┌───────────────────┐
//!             │ ClinicRecordsCore │  one per session, open → shutdown
//!             │  Mutex<Database>  │  single-writer serialization point
//!             └─────────┬─────────┘
//!        ┌──────────────┼──────────────┬──────────────┐
//!        ▼              ▼              ▼              ▼
//!   RecordStore   AccessControl   SnapshotManager  HistoryExporter
//!        │              │         LegacyImporter        │
//!        └──────────────┴──────────────┴────────────────┘
//!                       ▼
//!                 SQLite (records, practitioners, admin_grants)
//! ```
//!
//! # Core Principle
//!
//! **Authorization is checked inside the store.** Deleting records and
//! managing accounts require an [`AdminCapability`]; nothing is inferred from
//! caller-side flags.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer
//! - [`models`]: Domain types (Record, ClinicalNotes, Practitioner, etc.)
//! - [`store`]: Record lifecycle operations and error taxonomy
//! - [`access`]: Practitioner registry and administrative capabilities
//! - [`snapshot`]: Versioned snapshots and legacy local-storage import
//! - [`export`]: Patient history export
//! - [`config`]: Configuration loading and tracing setup

pub mod access;
pub mod config;
pub mod db;
pub mod export;
pub mod models;
pub mod snapshot;
pub mod store;

// Re-export commonly used types
pub use access::{AccessControl, AccessPolicy, AdminCapability};
pub use config::CoreConfig;
pub use db::Database;
pub use export::{HistoryExporter, PatientHistory};
pub use models::{
    ClinicalNotes, FinalizeRequest, Medication, NewRecord, Practitioner, Record, RecordStatus,
};
pub use snapshot::{LegacyImporter, Snapshot, SnapshotManager};
pub use store::{ErrorKind, RecordStore, StoreError};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::info;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicRecordsError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),
}

impl ClinicRecordsError {
    /// Fixed user-facing message for this error's category.
    pub fn user_message(&self) -> &'static str {
        let kind = match self {
            ClinicRecordsError::Validation(_) => ErrorKind::Validation,
            ClinicRecordsError::NotFound(_) => ErrorKind::NotFound,
            ClinicRecordsError::Conflict(_) => ErrorKind::Conflict,
            ClinicRecordsError::Unauthorized(_) => ErrorKind::Authorization,
            _ => ErrorKind::Internal,
        };
        kind.user_message()
    }
}

impl From<StoreError> for ClinicRecordsError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation { .. } => ClinicRecordsError::Validation(e.to_string()),
            StoreError::NotFound(what) => ClinicRecordsError::NotFound(what),
            StoreError::Conflict(why) => ClinicRecordsError::Conflict(why),
            StoreError::Authorization(why) => ClinicRecordsError::Unauthorized(why),
            StoreError::Database(db) => ClinicRecordsError::DatabaseError(db.to_string()),
        }
    }
}

impl From<db::DbError> for ClinicRecordsError {
    fn from(e: db::DbError) -> Self {
        ClinicRecordsError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for ClinicRecordsError {
    fn from(e: serde_json::Error) -> Self {
        ClinicRecordsError::SerializationError(e.to_string())
    }
}

impl From<anyhow::Error> for ClinicRecordsError {
    fn from(e: anyhow::Error) -> Self {
        ClinicRecordsError::ConfigurationError(format!("{:#}", e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicRecordsError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicRecordsError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open a session using an optional TOML config file plus `CLINIC_*` env vars.
#[uniffi::export]
pub fn open_core(config_path: Option<String>) -> Result<Arc<ClinicRecordsCore>, ClinicRecordsError> {
    let config = CoreConfig::load(config_path.as_deref().map(Path::new))?;
    ClinicRecordsCore::open(&config)
}

/// Open a session from explicit settings.
#[uniffi::export]
pub fn open_core_with_config(config: FfiCoreConfig) -> Result<Arc<ClinicRecordsCore>, ClinicRecordsError> {
    ClinicRecordsCore::open(&config.into())
}

/// Create an in-memory session with default settings (for testing).
#[uniffi::export]
pub fn open_core_in_memory() -> Result<Arc<ClinicRecordsCore>, ClinicRecordsError> {
    ClinicRecordsCore::open(&CoreConfig::default())
}

/// Install the tracing subscriber. Returns false if one was already installed.
#[uniffi::export]
pub fn init_logging(log_filter: String) -> bool {
    config::init_tracing(&log_filter)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe session object for FFI.
///
/// Every call holds the database lock for its full duration, so writes are
/// serialized and durable before the call returns.
#[derive(uniffi::Object)]
pub struct ClinicRecordsCore {
    db: Arc<Mutex<Option<Database>>>,
    policy: AccessPolicy,
}

impl ClinicRecordsCore {
    /// Open the configured database and start a session.
    pub fn open(config: &CoreConfig) -> Result<Arc<Self>, ClinicRecordsError> {
        let db = match config.database_path.as_deref() {
            Some(path) => Database::open(path)?,
            None => Database::open_in_memory()?,
        };
        // Grants never outlive the session that issued them
        db.purge_admin_grants()?;

        info!(
            database = config.database_path.as_deref().unwrap_or(":memory:"),
            schema_version = db.schema_version()?,
            "Clinic records session opened"
        );
        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(Some(db))),
            policy: config.access_policy(),
        }))
    }

    fn with_db<T, F>(&self, f: F) -> Result<T, ClinicRecordsError>
    where
        F: FnOnce(&Database) -> Result<T, ClinicRecordsError>,
    {
        let guard = self.db.lock()?;
        let db = guard
            .as_ref()
            .ok_or_else(|| ClinicRecordsError::SessionClosed("session has been shut down".into()))?;
        f(db)
    }
}

#[uniffi::export]
impl ClinicRecordsCore {
    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Create a scheduled record.
    pub fn create_record(
        &self,
        owner_code: String,
        subject_name: String,
        scheduled_date: String,
        scheduled_time: String,
        reason: String,
    ) -> Result<FfiRecord, ClinicRecordsError> {
        self.with_db(|db| {
            let record = RecordStore::new(db).create(
                &owner_code,
                &subject_name,
                &scheduled_date,
                &scheduled_time,
                &reason,
            )?;
            Ok(record.into())
        })
    }

    /// Create a record at most once per client request ID (safe to retry).
    pub fn create_record_once(
        &self,
        request_id: String,
        owner_code: String,
        subject_name: String,
        scheduled_date: String,
        scheduled_time: String,
        reason: String,
    ) -> Result<FfiRecord, ClinicRecordsError> {
        self.with_db(|db| {
            let record = RecordStore::new(db).create_idempotent(
                &request_id,
                &owner_code,
                &subject_name,
                &scheduled_date,
                &scheduled_time,
                &reason,
            )?;
            Ok(record.into())
        })
    }

    /// Get a record by ID.
    pub fn get_record(&self, id: String) -> Result<FfiRecord, ClinicRecordsError> {
        self.with_db(|db| Ok(RecordStore::new(db).get(&id)?.into()))
    }

    /// Search records by patient name, optionally for one practitioner.
    pub fn search_records(
        &self,
        query: String,
        owner_code: Option<String>,
    ) -> Result<Vec<FfiRecord>, ClinicRecordsError> {
        self.with_db(|db| {
            let records = RecordStore::new(db).search(&query, owner_code.as_deref())?;
            Ok(records.into_iter().map(|r| r.into()).collect())
        })
    }

    /// Distinct patient names.
    pub fn list_patients(&self, owner_code: Option<String>) -> Result<Vec<String>, ClinicRecordsError> {
        self.with_db(|db| Ok(RecordStore::new(db).patients(owner_code.as_deref())?))
    }

    /// Move a record to a new date and time.
    pub fn reschedule_record(
        &self,
        id: String,
        new_date: String,
        new_time: String,
    ) -> Result<FfiRecord, ClinicRecordsError> {
        self.with_db(|db| Ok(RecordStore::new(db).reschedule(&id, &new_date, &new_time)?.into()))
    }

    /// Attach diagnosis and prescription, completing the record.
    pub fn finalize_record(
        &self,
        id: String,
        request: FfiFinalizeRequest,
    ) -> Result<FfiRecord, ClinicRecordsError> {
        self.with_db(|db| {
            let request: FinalizeRequest = request.into();
            Ok(RecordStore::new(db).finalize(&id, &request)?.into())
        })
    }

    /// Permanently delete a record.
    pub fn delete_record(
        &self,
        id: String,
        capability: FfiAdminCapability,
    ) -> Result<(), ClinicRecordsError> {
        self.with_db(|db| Ok(RecordStore::new(db).delete(&id, &capability.into())?))
    }

    // =========================================================================
    // Access Operations
    // =========================================================================

    /// Exchange administrator credentials for a capability.
    pub fn grant_admin(
        &self,
        username: String,
        password: String,
    ) -> Result<FfiAdminCapability, ClinicRecordsError> {
        self.with_db(|db| {
            let cap = AccessControl::new(db, &self.policy).grant_admin(&username, &password)?;
            Ok(cap.into())
        })
    }

    /// Revoke a capability.
    pub fn revoke_admin(&self, capability: FfiAdminCapability) -> Result<bool, ClinicRecordsError> {
        self.with_db(|db| Ok(AccessControl::new(db, &self.policy).revoke_admin(&capability.into())?))
    }

    /// Register a practitioner account.
    pub fn register_practitioner(
        &self,
        capability: FfiAdminCapability,
        code: String,
        name: String,
        specialty: String,
        password: String,
    ) -> Result<FfiPractitioner, ClinicRecordsError> {
        self.with_db(|db| {
            let practitioner = AccessControl::new(db, &self.policy).register_practitioner(
                &capability.into(),
                &code,
                &name,
                &specialty,
                &password,
            )?;
            Ok(practitioner.into())
        })
    }

    /// Remove a practitioner account.
    pub fn remove_practitioner(
        &self,
        capability: FfiAdminCapability,
        code: String,
    ) -> Result<(), ClinicRecordsError> {
        self.with_db(|db| {
            Ok(AccessControl::new(db, &self.policy).remove_practitioner(&capability.into(), &code)?)
        })
    }

    /// Replace a practitioner's password.
    pub fn reset_practitioner_password(
        &self,
        capability: FfiAdminCapability,
        code: String,
        new_password: String,
    ) -> Result<(), ClinicRecordsError> {
        self.with_db(|db| {
            Ok(AccessControl::new(db, &self.policy).reset_password(
                &capability.into(),
                &code,
                &new_password,
            )?)
        })
    }

    /// Enable or disable a practitioner account.
    pub fn set_practitioner_active(
        &self,
        capability: FfiAdminCapability,
        code: String,
        active: bool,
    ) -> Result<FfiPractitioner, ClinicRecordsError> {
        self.with_db(|db| {
            let practitioner = AccessControl::new(db, &self.policy).set_practitioner_active(
                &capability.into(),
                &code,
                active,
            )?;
            Ok(practitioner.into())
        })
    }

    /// List practitioner accounts.
    pub fn list_practitioners(&self) -> Result<Vec<FfiPractitioner>, ClinicRecordsError> {
        self.with_db(|db| {
            let practitioners = AccessControl::new(db, &self.policy).list_practitioners()?;
            Ok(practitioners.into_iter().map(|p| p.into()).collect())
        })
    }

    /// Check practitioner credentials.
    pub fn verify_practitioner(
        &self,
        code: String,
        password: String,
    ) -> Result<FfiPractitioner, ClinicRecordsError> {
        self.with_db(|db| {
            let practitioner =
                AccessControl::new(db, &self.policy).verify_practitioner(&code, &password)?;
            Ok(practitioner.into())
        })
    }

    // =========================================================================
    // Snapshot & Export Operations
    // =========================================================================

    /// Export both collections as a versioned JSON snapshot.
    ///
    /// The snapshot includes credential digests, so it is admin only.
    pub fn export_snapshot_json(
        &self,
        capability: FfiAdminCapability,
    ) -> Result<String, ClinicRecordsError> {
        self.with_db(|db| {
            let snapshot = SnapshotManager::new(db).export(&capability.into())?;
            Ok(snapshot.to_json()?)
        })
    }

    /// Replace both collections with a snapshot.
    pub fn restore_snapshot_json(
        &self,
        capability: FfiAdminCapability,
        json: String,
    ) -> Result<FfiRestoreReport, ClinicRecordsError> {
        self.with_db(|db| {
            let snapshot = Snapshot::from_json(&json)?;
            let report = SnapshotManager::new(db).restore(&capability.into(), &snapshot)?;
            Ok(FfiRestoreReport {
                practitioners: report.practitioners as u32,
                records: report.records as u32,
            })
        })
    }

    /// Merge unversioned local-storage blobs into the store.
    pub fn import_legacy_storage(
        &self,
        capability: FfiAdminCapability,
        practitioners_json: Option<String>,
        appointments_json: Option<String>,
    ) -> Result<FfiLegacyImportReport, ClinicRecordsError> {
        self.with_db(|db| {
            let report = LegacyImporter::new(db).import(
                &capability.into(),
                practitioners_json.as_deref(),
                appointments_json.as_deref(),
            )?;
            Ok(FfiLegacyImportReport {
                practitioners_imported: report.practitioners_imported as u32,
                practitioners_skipped: report.practitioners_skipped as u32,
                records_imported: report.records_imported as u32,
                records_skipped: report.records_skipped as u32,
            })
        })
    }

    /// Export a patient's history as JSON.
    pub fn export_history_json(
        &self,
        subject_name: String,
        owner_code: Option<String>,
    ) -> Result<String, ClinicRecordsError> {
        self.with_db(|db| {
            let history =
                HistoryExporter::new(db).export_patient(&subject_name, owner_code.as_deref())?;
            Ok(history.to_json()?)
        })
    }

    /// Export a patient's history as CSV.
    pub fn export_history_csv(
        &self,
        subject_name: String,
        owner_code: Option<String>,
    ) -> Result<String, ClinicRecordsError> {
        self.with_db(|db| {
            let history =
                HistoryExporter::new(db).export_patient(&subject_name, owner_code.as_deref())?;
            Ok(history.to_csv())
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Revoke all capabilities and close the database.
    ///
    /// Every later call fails with `SessionClosed`.
    pub fn shutdown(&self) -> Result<(), ClinicRecordsError> {
        let mut guard = self.db.lock()?;
        let db = guard
            .take()
            .ok_or_else(|| ClinicRecordsError::SessionClosed("session has been shut down".into()))?;

        let revoked = db.purge_admin_grants()?;
        db.close()?;
        info!(revoked, "Clinic records session closed");
        Ok(())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe configuration.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCoreConfig {
    pub database_path: Option<String>,
    pub admin_username: String,
    pub admin_password_sha256: String,
    pub admin_grant_ttl_minutes: u32,
    pub log_filter: String,
}

impl From<FfiCoreConfig> for CoreConfig {
    fn from(config: FfiCoreConfig) -> Self {
        CoreConfig {
            database_path: config.database_path,
            admin_username: config.admin_username,
            admin_password_sha256: config.admin_password_sha256,
            admin_grant_ttl_minutes: config.admin_grant_ttl_minutes,
            log_filter: config.log_filter,
        }
    }
}

/// FFI-safe record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRecord {
    pub id: String,
    pub request_id: Option<String>,
    pub owner_code: String,
    pub subject_name: String,
    pub scheduled_date: String,
    pub scheduled_time: String,
    pub reason: String,
    pub status: String,
    pub clinical_notes: Option<FfiClinicalNotes>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Record> for FfiRecord {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            request_id: record.request_id,
            owner_code: record.owner_code,
            subject_name: record.subject_name,
            scheduled_date: record.scheduled_date.format(models::DATE_FORMAT).to_string(),
            scheduled_time: record.scheduled_time.format(models::TIME_FORMAT).to_string(),
            reason: record.reason,
            status: record.status.as_str().to_string(),
            clinical_notes: record.clinical_notes.map(|n| n.into()),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// FFI-safe clinical notes.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiClinicalNotes {
    pub diagnosis: String,
    pub prescription: String,
    pub treatment_days: u32,
    pub next_date: Option<String>,
    pub medications: Vec<FfiMedication>,
    pub instructions: Option<String>,
}

impl From<ClinicalNotes> for FfiClinicalNotes {
    fn from(notes: ClinicalNotes) -> Self {
        Self {
            diagnosis: notes.diagnosis,
            prescription: notes.prescription,
            treatment_days: notes.treatment_days,
            next_date: notes
                .next_date
                .map(|d| d.format(models::DATE_FORMAT).to_string()),
            medications: notes.medications.into_iter().map(|m| m.into()).collect(),
            instructions: notes.instructions,
        }
    }
}

/// FFI-safe medication.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedication {
    pub name: String,
    pub dose: String,
    pub frequency: String,
    pub instructions: Option<String>,
}

impl From<Medication> for FfiMedication {
    fn from(med: Medication) -> Self {
        Self {
            name: med.name,
            dose: med.dose,
            frequency: med.frequency,
            instructions: med.instructions,
        }
    }
}

impl From<FfiMedication> for Medication {
    fn from(med: FfiMedication) -> Self {
        Medication {
            name: med.name,
            dose: med.dose,
            frequency: med.frequency,
            instructions: med.instructions,
        }
    }
}

/// FFI-safe finalize input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFinalizeRequest {
    pub diagnosis: String,
    pub prescription: String,
    pub treatment_days: u32,
    pub next_date: Option<String>,
    pub medications: Vec<FfiMedication>,
    pub instructions: Option<String>,
}

impl From<FfiFinalizeRequest> for FinalizeRequest {
    fn from(req: FfiFinalizeRequest) -> Self {
        FinalizeRequest {
            diagnosis: req.diagnosis,
            prescription: req.prescription,
            treatment_days: req.treatment_days,
            next_date: req.next_date,
            medications: req.medications.into_iter().map(|m| m.into()).collect(),
            instructions: req.instructions,
        }
    }
}

/// FFI-safe practitioner. Credential material is never exposed.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPractitioner {
    pub code: String,
    pub name: String,
    pub specialty: String,
    pub active: bool,
    pub created_at: String,
}

impl From<Practitioner> for FfiPractitioner {
    fn from(p: Practitioner) -> Self {
        Self {
            code: p.code,
            name: p.name,
            specialty: p.specialty,
            active: p.active,
            created_at: p.created_at,
        }
    }
}

/// FFI-safe administrative capability.
#[derive(Clone, uniffi::Record)]
pub struct FfiAdminCapability {
    pub token: String,
    /// Unix seconds
    pub expires_at: i64,
}

impl std::fmt::Debug for FfiAdminCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfiAdminCapability")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl From<AdminCapability> for FfiAdminCapability {
    fn from(cap: AdminCapability) -> Self {
        Self {
            expires_at: cap.expires_at(),
            token: cap.token().to_string(),
        }
    }
}

impl From<FfiAdminCapability> for AdminCapability {
    fn from(cap: FfiAdminCapability) -> Self {
        AdminCapability::from_token(cap.token)
    }
}

/// FFI-safe restore report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRestoreReport {
    pub practitioners: u32,
    pub records: u32,
}

/// FFI-safe legacy import report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLegacyImportReport {
    pub practitioners_imported: u32,
    pub practitioners_skipped: u32,
    pub records_imported: u32,
    pub records_skipped: u32,
}
