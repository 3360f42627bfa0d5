//! Patient history export.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::models::{Record, DATE_FORMAT, TIME_FORMAT};
use crate::store::{RecordStore, StoreResult};

/// One visit in a patient's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// Record ID for traceability
    pub record_id: String,
    /// Practitioner code
    pub owner_code: String,
    /// Practitioner display name, if the account still exists
    pub owner_name: Option<String>,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
    pub reason: String,
    pub status: String,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub treatment_days: Option<u32>,
    /// `YYYY-MM-DD`
    pub next_date: Option<String>,
}

impl HistoryEntry {
    fn from_record(record: &Record, owner_name: Option<String>) -> Self {
        let notes = record.clinical_notes.as_ref();
        Self {
            record_id: record.id.clone(),
            owner_code: record.owner_code.clone(),
            owner_name,
            date: record.scheduled_date.format(DATE_FORMAT).to_string(),
            time: record.scheduled_time.format(TIME_FORMAT).to_string(),
            reason: record.reason.clone(),
            status: record.status.as_str().to_string(),
            diagnosis: notes.map(|n| n.diagnosis.clone()),
            prescription: notes.map(|n| n.prescription.clone()),
            treatment_days: notes.map(|n| n.treatment_days),
            next_date: notes
                .and_then(|n| n.next_date)
                .map(|d| d.format(DATE_FORMAT).to_string()),
        }
    }
}

/// A patient's visits, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientHistory {
    /// Patient name as recorded on the most recent visit
    pub subject_name: String,
    /// Export timestamp
    pub exported_at: String,
    pub entries: Vec<HistoryEntry>,
}

impl PatientHistory {
    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV format.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        // Header
        csv.push_str("subject_name,record_id,owner_code,owner_name,date,time,reason,status,diagnosis,prescription,treatment_days,next_date\n");

        for entry in &self.entries {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{}\n",
                escape_csv(&self.subject_name),
                escape_csv(&entry.record_id),
                escape_csv(&entry.owner_code),
                escape_csv(entry.owner_name.as_deref().unwrap_or("")),
                entry.date,
                entry.time,
                escape_csv(&entry.reason),
                entry.status,
                escape_csv(entry.diagnosis.as_deref().unwrap_or("")),
                escape_csv(entry.prescription.as_deref().unwrap_or("")),
                entry.treatment_days.map(|d| d.to_string()).unwrap_or_default(),
                entry.next_date.as_deref().unwrap_or(""),
            ));
        }

        csv
    }
}

/// History exporter.
pub struct HistoryExporter<'a> {
    db: &'a Database,
    store: RecordStore<'a>,
}

impl<'a> HistoryExporter<'a> {
    /// Create a new history exporter.
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            store: RecordStore::new(db),
        }
    }

    /// History of one patient, matched by name ignoring case and surrounding
    /// whitespace. An unknown patient yields an empty history.
    pub fn export_patient(&self, subject_name: &str, owner_code: Option<&str>) -> StoreResult<PatientHistory> {
        let wanted = subject_name.trim().to_lowercase();
        let records: Vec<Record> = self
            .store
            .search(&wanted, owner_code)?
            .into_iter()
            .filter(|r| r.subject_name.to_lowercase() == wanted)
            .collect();

        let names = self.practitioner_names()?;
        let entries = records
            .iter()
            .map(|r| HistoryEntry::from_record(r, names.get(&r.owner_code).cloned()))
            .collect();

        Ok(PatientHistory {
            subject_name: records
                .first()
                .map(|r| r.subject_name.clone())
                .unwrap_or_else(|| subject_name.trim().to_string()),
            exported_at: chrono::Utc::now().to_rfc3339(),
            entries,
        })
    }

    fn practitioner_names(&self) -> StoreResult<HashMap<String, String>> {
        Ok(self
            .db
            .list_practitioners()?
            .into_iter()
            .map(|p| (p.code, p.name))
            .collect())
    }
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
