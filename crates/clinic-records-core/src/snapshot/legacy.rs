//! Import of unversioned browser local-storage blobs.
//!
//! Two keys were written by the old front end: `medicos` (practitioner
//! accounts, plaintext passwords) and `citas` (appointments). Rows that fail
//! validation are skipped and counted, never partially written.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::access::{verify_admin, AdminCapability};
use crate::db::Database;
use crate::models::{ClinicalNotes, Practitioner, Record, RecordStatus};
use crate::store::validation;
use crate::store::{StoreError, StoreResult};

/// Placeholder text for notes that the legacy format never captured.
pub const IMPORTED_PLACEHOLDER: &str = "(imported)";

#[derive(Debug, Deserialize)]
struct LegacyPractitioner {
    #[serde(rename = "codigo")]
    code: String,
    #[serde(rename = "nombre")]
    name: String,
    #[serde(rename = "especialidad", default)]
    specialty: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LegacyAppointment {
    #[serde(default)]
    id: String,
    #[serde(rename = "codigo_medico")]
    owner_code: String,
    #[serde(rename = "paciente")]
    subject_name: String,
    #[serde(rename = "fecha")]
    date: String,
    #[serde(rename = "hora")]
    time: String,
    #[serde(rename = "motivo")]
    reason: String,
    #[serde(rename = "estado", default)]
    status: String,
}

/// Outcome of a legacy import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyImportReport {
    pub practitioners_imported: usize,
    pub practitioners_skipped: usize,
    pub records_imported: usize,
    pub records_skipped: usize,
}

/// Map a legacy status string.
pub fn legacy_status(status: &str) -> Option<RecordStatus> {
    match status.trim() {
        "" | "programada" => Some(RecordStatus::Scheduled),
        "pospuesta" => Some(RecordStatus::Rescheduled),
        "realizada" => Some(RecordStatus::Completed),
        _ => None,
    }
}

/// Legacy importer over a database connection.
pub struct LegacyImporter<'a> {
    db: &'a Database,
}

impl<'a> LegacyImporter<'a> {
    /// Create a new legacy importer.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Merge the given blobs into the store in one transaction.
    ///
    /// Existing practitioner codes and record IDs win over imported rows.
    pub fn import(
        &self,
        capability: &AdminCapability,
        practitioners_json: Option<&str>,
        appointments_json: Option<&str>,
    ) -> StoreResult<LegacyImportReport> {
        verify_admin(self.db, capability)?;

        let practitioner_rows = parse_array("medicos", practitioners_json)?;
        let appointment_rows = parse_array("citas", appointments_json)?;

        let report = self.db.with_transaction(|db| -> StoreResult<LegacyImportReport> {
            let mut report = LegacyImportReport::default();

            for row in practitioner_rows {
                match practitioner_from_row(row) {
                    Some(p) if db.get_practitioner(&p.code)?.is_none() => {
                        db.insert_practitioner(&p)?;
                        report.practitioners_imported += 1;
                    }
                    _ => report.practitioners_skipped += 1,
                }
            }

            for row in appointment_rows {
                match record_from_row(row) {
                    Some(r) if db.get_record(&r.id)?.is_none() => {
                        db.insert_record(&r)?;
                        report.records_imported += 1;
                    }
                    _ => report.records_skipped += 1,
                }
            }

            Ok(report)
        })?;

        if report.practitioners_skipped + report.records_skipped > 0 {
            warn!(
                practitioners_skipped = report.practitioners_skipped,
                records_skipped = report.records_skipped,
                "Legacy import skipped rows"
            );
        }
        info!(
            practitioners = report.practitioners_imported,
            records = report.records_imported,
            "Legacy import complete"
        );
        Ok(report)
    }
}

fn parse_array(field: &str, json: Option<&str>) -> StoreResult<Vec<Value>> {
    match json.map(str::trim) {
        None | Some("") | Some("null") => Ok(Vec::new()),
        Some(raw) => serde_json::from_str::<Vec<Value>>(raw)
            .map_err(|_| StoreError::validation(field, "is not a JSON array")),
    }
}

fn practitioner_from_row(row: Value) -> Option<Practitioner> {
    let legacy: LegacyPractitioner = serde_json::from_value(row).ok()?;
    let code = validation::require("codigo", &legacy.code).ok()?;
    let name = validation::require("nombre", &legacy.name).ok()?;
    let password = validation::require("password", &legacy.password).ok()?;
    Some(Practitioner::new(code, name, legacy.specialty.trim().to_string(), &password))
}

fn record_from_row(row: Value) -> Option<Record> {
    let legacy: LegacyAppointment = serde_json::from_value(row).ok()?;
    let input = validation::new_record(
        &legacy.owner_code,
        &legacy.subject_name,
        &legacy.date,
        &legacy.time,
        &legacy.reason,
    )
    .ok()?;
    let status = legacy_status(&legacy.status)?;

    let mut record = Record::new(input);
    if !legacy.id.trim().is_empty() {
        record.id = legacy.id.trim().to_string();
    }
    record.status = status;
    if status == RecordStatus::Completed {
        record.clinical_notes = Some(ClinicalNotes {
            diagnosis: IMPORTED_PLACEHOLDER.into(),
            prescription: IMPORTED_PLACEHOLDER.into(),
            treatment_days: 1,
            next_date: None,
            medications: Vec::new(),
            instructions: None,
        });
    }
    Some(record)
}
