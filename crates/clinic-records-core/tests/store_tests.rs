//! Record store integration tests.

use clinic_records_core::access::{AccessControl, AccessPolicy, AdminCapability};
use clinic_records_core::db::Database;
use clinic_records_core::models::{sha256_hex, FinalizeRequest, Medication, RecordStatus};
use clinic_records_core::store::{ErrorKind, RecordStore};

fn policy() -> AccessPolicy {
    AccessPolicy {
        admin_username: "admin".to_string(),
        admin_password_sha256: sha256_hex("s3cret"),
        grant_ttl_minutes: 30,
    }
}

fn admin(db: &Database) -> AdminCapability {
    let policy = policy();
    AccessControl::new(db, &policy)
        .grant_admin("admin", "s3cret")
        .unwrap()
}

fn flu() -> FinalizeRequest {
    FinalizeRequest {
        diagnosis: "flu".to_string(),
        prescription: "rest".to_string(),
        treatment_days: 5,
        ..Default::default()
    }
}

#[test]
fn test_maria_lopez_lifecycle() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);

    let record = store
        .create("DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
        .unwrap();
    assert_eq!(record.status, RecordStatus::Scheduled);
    assert!(record.clinical_notes.is_none());

    let moved = store.reschedule(&record.id, "2024-06-03", "10:00").unwrap();
    assert_eq!(moved.status, RecordStatus::Rescheduled);
    assert_eq!(moved.scheduled_date.to_string(), "2024-06-03");
    assert_eq!(moved.scheduled_time.format("%H:%M").to_string(), "10:00");
    assert_eq!(moved.subject_name, "Maria Lopez");

    let done = store.finalize(&record.id, &flu()).unwrap();
    assert_eq!(done.status, RecordStatus::Completed);
    let notes = done.clinical_notes.as_ref().unwrap();
    assert_eq!(notes.diagnosis, "flu");
    assert_eq!(notes.prescription, "rest");
    assert_eq!(notes.treatment_days, 5);

    let err = store.finalize(&record.id, &flu()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Persisted state matches what was returned
    assert_eq!(store.get(&record.id).unwrap(), done);
}

#[test]
fn test_create_then_search_by_owner_returns_only_new_record() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);

    store
        .create("DOC2", "Other Patient", "2024-06-01", "09:00", "control")
        .unwrap();
    let record = store
        .create("DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
        .unwrap();

    let results = store.search("", Some("DOC1")).unwrap();
    assert_eq!(results, vec![record]);
}

#[test]
fn test_search_is_case_insensitive() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);

    store
        .create("DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
        .unwrap();
    store
        .create("DOC1", "Pedro Ruiz", "2024-06-02", "09:00", "checkup")
        .unwrap();

    let lower = store.search("maria", None).unwrap();
    let upper = store.search("MARIA", None).unwrap();
    assert_eq!(lower.len(), 1);
    assert_eq!(lower, upper);
    assert_eq!(lower[0].subject_name, "Maria Lopez");

    // Surrounding whitespace in the query is ignored
    assert_eq!(store.search("  maria ", None).unwrap(), lower);
}

#[test]
fn test_search_orders_newest_appointment_first() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);

    let early = store
        .create("DOC1", "Ana", "2024-06-01", "09:00", "a")
        .unwrap();
    let late = store
        .create("DOC1", "Ana", "2024-06-03", "08:00", "b")
        .unwrap();
    let middle = store
        .create("DOC1", "Ana", "2024-06-01", "17:30", "c")
        .unwrap();

    let ids: Vec<String> = store
        .search("ana", Some("DOC1"))
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![late.id, middle.id, early.id]);
}

#[test]
fn test_reschedule_twice_equals_once() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);

    let record = store
        .create("DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
        .unwrap();

    let once = store.reschedule(&record.id, "2024-06-05", "11:15").unwrap();
    let twice = store.reschedule(&record.id, "2024-06-05", "11:15").unwrap();
    assert_eq!(once, twice);
    assert_eq!(store.get(&record.id).unwrap(), once);
}

#[test]
fn test_finalize_missing_record_is_not_found() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);

    let err = store.finalize("no-such-id", &flu()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_completed_record_cannot_be_rescheduled() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);

    let record = store
        .create("DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
        .unwrap();
    store.finalize(&record.id, &flu()).unwrap();

    let err = store
        .reschedule(&record.id, "2024-07-01", "09:00")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn test_finalize_derives_prescription_from_medications() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);

    let record = store
        .create("DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
        .unwrap();
    let request = FinalizeRequest {
        diagnosis: "otitis".to_string(),
        treatment_days: 7,
        next_date: Some("2024-06-08".to_string()),
        medications: vec![
            Medication {
                name: "Amoxicillin".to_string(),
                dose: "500mg".to_string(),
                frequency: "every 8h".to_string(),
                instructions: None,
            },
            Medication {
                name: "Ibuprofen".to_string(),
                dose: "400mg".to_string(),
                frequency: "as needed".to_string(),
                instructions: Some("with food".to_string()),
            },
        ],
        ..Default::default()
    };

    let done = store.finalize(&record.id, &request).unwrap();
    let notes = done.clinical_notes.unwrap();
    assert_eq!(
        notes.prescription,
        "Amoxicillin 500mg - every 8h, Ibuprofen 400mg - as needed"
    );
    assert_eq!(notes.next_date.unwrap().to_string(), "2024-06-08");
}

#[test]
fn test_delete_then_search_excludes_record() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);
    let cap = admin(&db);

    let record = store
        .create("DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
        .unwrap();
    let kept = store
        .create("DOC1", "Maria Lopez", "2024-06-02", "09:00", "follow-up")
        .unwrap();

    store.delete(&record.id, &cap).unwrap();

    let results = store.search("Maria Lopez", None).unwrap();
    assert_eq!(results, vec![kept]);

    let err = store.delete(&record.id, &cap).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_delete_requires_live_capability() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);
    let policy = policy();
    let access = AccessControl::new(&db, &policy);

    let record = store
        .create("DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
        .unwrap();

    // Forged token
    let forged = AdminCapability::from_token("not-a-real-token".to_string());
    let err = store.delete(&record.id, &forged).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    // Revoked token
    let cap = access.grant_admin("admin", "s3cret").unwrap();
    assert!(access.revoke_admin(&cap).unwrap());
    let err = store.delete(&record.id, &cap).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    // Authorization is checked before existence
    let err = store.delete("no-such-id", &forged).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_expired_capability_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);
    let policy = AccessPolicy {
        grant_ttl_minutes: 0,
        ..policy()
    };
    let cap = AccessControl::new(&db, &policy)
        .grant_admin("admin", "s3cret")
        .unwrap();

    let record = store
        .create("DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
        .unwrap();
    let err = store.delete(&record.id, &cap).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[test]
fn test_create_idempotent_replay_and_conflict() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);

    let first = store
        .create_idempotent("req-1", "DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
        .unwrap();
    let replay = store
        .create_idempotent("req-1", "DOC1", " Maria Lopez ", "2024-06-01", "09:00", "checkup")
        .unwrap();
    assert_eq!(first, replay);
    assert_eq!(store.count().unwrap(), 1);

    let err = store
        .create_idempotent("req-1", "DOC1", "Maria Lopez", "2024-06-02", "09:00", "checkup")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn test_create_idempotent_replay_after_reschedule() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);

    let first = store
        .create_idempotent("req-1", "DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
        .unwrap();
    let moved = store.reschedule(&first.id, "2024-06-03", "10:00").unwrap();

    let replay = store
        .create_idempotent("req-1", "DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
        .unwrap();
    assert_eq!(replay, moved);
    assert_eq!(store.count().unwrap(), 1);

    // Matching the current schedule is not the same request
    let err = store
        .create_idempotent("req-1", "DOC1", "Maria Lopez", "2024-06-03", "10:00", "checkup")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn test_validation_reports_first_bad_field_without_writing() {
    let db = Database::open_in_memory().unwrap();
    let store = RecordStore::new(&db);

    let cases = [
        (("", "", "bad", "bad", ""), "owner_code"),
        (("DOC1", "  ", "bad", "bad", ""), "subject_name"),
        (("DOC1", "Ana", "2024-02-30", "bad", ""), "scheduled_date"),
        (("DOC1", "Ana", "2024-06-01", "25:00", ""), "scheduled_time"),
        (("DOC1", "Ana", "2024-06-01", "09:00", " "), "reason"),
    ];

    for ((owner, subject, date, time, reason), expected) in cases {
        let err = store.create(owner, subject, date, time, reason).unwrap_err();
        match err {
            clinic_records_core::StoreError::Validation { field, .. } => {
                assert_eq!(field, expected)
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clinic.db");

    let id = {
        let db = Database::open(&path).unwrap();
        let store = RecordStore::new(&db);
        let record = store
            .create("DOC1", "Maria Lopez", "2024-06-01", "09:00", "checkup")
            .unwrap();
        store.finalize(&record.id, &flu()).unwrap();
        db.close().unwrap();
        record.id
    };

    let db = Database::open(&path).unwrap();
    let record = RecordStore::new(&db).get(&id).unwrap();
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.clinical_notes.unwrap().diagnosis, "flu");
}
