use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking - no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: Policy records

CREATE TABLE policy_records (
    file_id TEXT PRIMARY KEY NOT NULL,
    data_location TEXT NOT NULL,
    access_rights TEXT NOT NULL DEFAULT 'private',
    attention TEXT NOT NULL,
    confidence TEXT NOT NULL,
    label TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
",
        ),
        M::up(
            "-- Migration 2: Append-only local ledger

CREATE TABLE ledger_entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    tx_ref TEXT NOT NULL UNIQUE,
    file_id TEXT NOT NULL,
    version TEXT NOT NULL,
    locator TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    owner TEXT NOT NULL,
    signature TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX idx_ledger_file ON ledger_entries(file_id, seq);

CREATE TRIGGER ledger_entries_no_update
BEFORE UPDATE ON ledger_entries
BEGIN
    SELECT RAISE(ABORT, 'ledger entries are immutable');
END;

CREATE TRIGGER ledger_entries_no_delete
BEFORE DELETE ON ledger_entries
BEGIN
    SELECT RAISE(ABORT, 'ledger entries are immutable');
END;
",
        ),
    ])
}
