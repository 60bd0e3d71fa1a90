//! SQL DDL for the durable corpus.
//!
//! Defines the `records`, `record_log`, and `schema_meta` tables. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization. Columns added after the first
//! release (e.g. `domain_version`) arrive through [`super::migrations`].

use rusqlite::Connection;

/// Schema DDL at version 1.
const SCHEMA_SQL: &str = r#"
-- Knowledge records (the corpus)
CREATE TABLE IF NOT EXISTS records (
    id TEXT PRIMARY KEY,
    file TEXT NOT NULL,
    category TEXT NOT NULL,
    body TEXT NOT NULL,
    source TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    usage_count INTEGER NOT NULL DEFAULT 0,
    verified INTEGER NOT NULL DEFAULT 0,
    quality_score REAL NOT NULL DEFAULT 0.0 CHECK(quality_score >= 0.0 AND quality_score <= 1.0),
    version INTEGER NOT NULL DEFAULT 1 CHECK(version >= 1),
    history TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_records_partition ON records(file, category);
CREATE INDEX IF NOT EXISTS idx_records_updated ON records(updated_at);

-- Audit log
CREATE TABLE IF NOT EXISTS record_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('create','merge','update','delete','usage')),
    record_id TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_record_log_record ON record_log(record_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
