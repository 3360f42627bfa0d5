//! SQLite schema definition.

/// Current persisted schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete database schema for clinic records.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Schema Metadata
-- ============================================================================

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1');

-- ============================================================================
-- Practitioners
-- ============================================================================

CREATE TABLE IF NOT EXISTS practitioners (
    code TEXT PRIMARY KEY CHECK (length(trim(code)) > 0),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    specialty TEXT NOT NULL DEFAULT '',
    password_hash TEXT NOT NULL,                 -- hex SHA-256(salt || password)
    salt TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Records (appointments and their clinical outcome)
-- ============================================================================

CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    request_id TEXT UNIQUE,                      -- client idempotency key, optional
    request_digest TEXT,                         -- hex SHA-256 of the original create input
    owner_code TEXT NOT NULL CHECK (length(trim(owner_code)) > 0),
    subject_name TEXT NOT NULL CHECK (length(trim(subject_name)) > 0),
    scheduled_date TEXT NOT NULL,                -- YYYY-MM-DD
    scheduled_time TEXT NOT NULL,                -- HH:MM
    reason TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'scheduled'
        CHECK (status IN ('scheduled', 'rescheduled', 'completed')),
    clinical_notes TEXT,                         -- JSON object, NULL until finalized
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (status <> 'completed' OR clinical_notes IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_records_owner ON records(owner_code);
CREATE INDEX IF NOT EXISTS idx_records_schedule ON records(scheduled_date, scheduled_time);

-- ============================================================================
-- Administrative Capability Grants
-- ============================================================================

CREATE TABLE IF NOT EXISTS admin_grants (
    token_hash TEXT PRIMARY KEY,                 -- hex SHA-256 of the issued token
    username TEXT NOT NULL,
    issued_at INTEGER NOT NULL,                  -- unix seconds
    expires_at INTEGER NOT NULL                  -- unix seconds
);
"#;
