//! Input validation for store operations.
//!
//! Every check reports the first offending field, so callers can point the
//! user at it directly.

use chrono::{NaiveDate, NaiveTime, Timelike};

use super::{StoreError, StoreResult};
use crate::models::{ClinicalNotes, FinalizeRequest, Medication, NewRecord, DATE_FORMAT, TIME_FORMAT};

/// Trimmed, non-empty value of a required text field.
pub fn require(field: &str, value: &str) -> StoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::validation(field, "is required"));
    }
    Ok(trimmed.to_string())
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(field: &str, value: &str) -> StoreResult<NaiveDate> {
    let value = require(field, value)?;
    NaiveDate::parse_from_str(&value, DATE_FORMAT)
        .map_err(|_| StoreError::validation(field, "must be a valid date (YYYY-MM-DD)"))
}

/// Parse an `HH:MM` (or `HH:MM:SS`) time of day, truncated to the minute.
pub fn parse_time(field: &str, value: &str) -> StoreResult<NaiveTime> {
    let value = require(field, value)?;
    let time = NaiveTime::parse_from_str(&value, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(&value, "%H:%M:%S"))
        .map_err(|_| StoreError::validation(field, "must be a valid time (HH:MM)"))?;
    // Storage keeps minute precision
    Ok(time.with_second(0).unwrap_or(time))
}

/// Validate create input in field order: owner, subject, date, time, reason.
pub fn new_record(
    owner_code: &str,
    subject_name: &str,
    scheduled_date: &str,
    scheduled_time: &str,
    reason: &str,
) -> StoreResult<NewRecord> {
    Ok(NewRecord {
        owner_code: require("owner_code", owner_code)?,
        subject_name: require("subject_name", subject_name)?,
        scheduled_date: parse_date("scheduled_date", scheduled_date)?,
        scheduled_time: parse_time("scheduled_time", scheduled_time)?,
        reason: require("reason", reason)?,
    })
}

/// Validate finalize input against the record's scheduled date.
///
/// A blank prescription is derived from the medication list.
pub fn clinical_notes(request: &FinalizeRequest, scheduled_date: NaiveDate) -> StoreResult<ClinicalNotes> {
    let diagnosis = require("diagnosis", &request.diagnosis)?;

    let mut medications = Vec::with_capacity(request.medications.len());
    for (i, med) in request.medications.iter().enumerate() {
        medications.push(Medication {
            name: require(&format!("medications[{}].name", i), &med.name)?,
            dose: require(&format!("medications[{}].dose", i), &med.dose)?,
            frequency: require(&format!("medications[{}].frequency", i), &med.frequency)?,
            instructions: non_blank(med.instructions.as_deref()),
        });
    }

    let prescription = match request.prescription.trim() {
        "" if medications.is_empty() => {
            return Err(StoreError::validation("prescription", "is required"));
        }
        "" => medications
            .iter()
            .map(Medication::summary)
            .collect::<Vec<_>>()
            .join(", "),
        text => text.to_string(),
    };

    if request.treatment_days == 0 {
        return Err(StoreError::validation("treatment_days", "must be at least 1"));
    }

    let next_date = match non_blank(request.next_date.as_deref()) {
        Some(raw) => {
            let date = parse_date("next_date", &raw)?;
            if date < scheduled_date {
                return Err(StoreError::validation(
                    "next_date",
                    "must not precede the scheduled date",
                ));
            }
            Some(date)
        }
        None => None,
    };

    Ok(ClinicalNotes {
        diagnosis,
        prescription,
        treatment_days: request.treatment_days,
        next_date,
        medications,
        instructions: non_blank(request.instructions.as_deref()),
    })
}

/// Check stored notes against the rules `clinical_notes` enforces on input.
pub fn verify_notes(notes: &ClinicalNotes, scheduled_date: NaiveDate) -> StoreResult<()> {
    let request = FinalizeRequest {
        diagnosis: notes.diagnosis.clone(),
        prescription: notes.prescription.clone(),
        treatment_days: notes.treatment_days,
        next_date: notes.next_date.map(|d| d.format(DATE_FORMAT).to_string()),
        medications: notes.medications.clone(),
        instructions: notes.instructions.clone(),
    };
    clinical_notes(&request, scheduled_date)?;
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
