//! Appointment records and their clinical outcome.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::sha256_hex;

/// Storage format for scheduled dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Storage format for scheduled times.
pub const TIME_FORMAT: &str = "%H:%M";

/// Record lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Created, not yet attended
    Scheduled,
    /// Date or time moved at least once
    Rescheduled,
    /// Clinically resolved (terminal)
    Completed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Scheduled => "scheduled",
            RecordStatus::Rescheduled => "rescheduled",
            RecordStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(RecordStatus::Scheduled),
            "rescheduled" => Some(RecordStatus::Rescheduled),
            "completed" => Some(RecordStatus::Completed),
            _ => None,
        }
    }

    /// No further edits are accepted once a record reaches this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::Completed)
    }
}

/// A single prescribed medication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub name: String,
    pub dose: String,
    pub frequency: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl Medication {
    /// One-line summary, e.g. `Amoxicillin 500mg - every 8h`.
    pub fn summary(&self) -> String {
        format!("{} {} - {}", self.name, self.dose, self.frequency)
    }
}

/// Diagnosis and prescription attached when a record is finalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClinicalNotes {
    pub diagnosis: String,
    pub prescription: String,
    /// Treatment duration in days (at least 1)
    pub treatment_days: u32,
    /// Optional follow-up date
    pub next_date: Option<NaiveDate>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    /// General instructions for the patient
    #[serde(default)]
    pub instructions: Option<String>,
}

/// An appointment and, once finalized, its clinical outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Unique record ID (UUID v4), immutable
    pub id: String,
    /// Client-supplied idempotency key for create
    pub request_id: Option<String>,
    /// Digest of the create input that `request_id` was first used with
    #[serde(default)]
    pub request_digest: Option<String>,
    /// Code of the issuing practitioner
    pub owner_code: String,
    /// Patient name, the search key
    pub subject_name: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    /// Reason for the visit
    pub reason: String,
    pub status: RecordStatus,
    /// Present only once the record is completed
    pub clinical_notes: Option<ClinicalNotes>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Record {
    /// Create a new scheduled record from validated input.
    pub fn new(input: NewRecord) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: None,
            request_digest: None,
            owner_code: input.owner_code,
            subject_name: input.subject_name,
            scheduled_date: input.scheduled_date,
            scheduled_time: input.scheduled_time,
            reason: input.reason,
            status: RecordStatus::Scheduled,
            clinical_notes: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Whether diagnosis/prescription data has been attached.
    pub fn is_resolved(&self) -> bool {
        self.clinical_notes.is_some()
    }

    /// Case-insensitive substring match on the patient name.
    ///
    /// `needle` must already be lowercased.
    pub fn subject_matches(&self, needle: &str) -> bool {
        needle.is_empty() || self.subject_name.to_lowercase().contains(needle)
    }

    /// True when this record was created from `input`.
    ///
    /// Compares against the stored create digest, so later reschedules do not
    /// affect the answer. Records without a digest fall back to their current
    /// fields.
    pub fn created_from(&self, input: &NewRecord) -> bool {
        if let Some(digest) = self.request_digest.as_deref() {
            return digest == input.digest();
        }
        self.owner_code == input.owner_code
            && self.subject_name == input.subject_name
            && self.scheduled_date == input.scheduled_date
            && self.scheduled_time == input.scheduled_time
            && self.reason == input.reason
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Validated input for creating a record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub owner_code: String,
    pub subject_name: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub reason: String,
}

impl NewRecord {
    /// Hex SHA-256 over the normalized fields, in validation order.
    pub fn digest(&self) -> String {
        sha256_hex(&format!(
            "{}\n{}\n{}\n{}\n{}",
            self.owner_code,
            self.subject_name,
            self.scheduled_date.format(DATE_FORMAT),
            self.scheduled_time.format(TIME_FORMAT),
            self.reason
        ))
    }
}

/// Unvalidated finalize input as received from the UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalizeRequest {
    pub diagnosis: String,
    pub prescription: String,
    pub treatment_days: u32,
    /// `YYYY-MM-DD`, blank for none
    pub next_date: Option<String>,
    pub medications: Vec<Medication>,
    pub instructions: Option<String>,
}
