//! SQLite persistence for records and the audit log.
//!
//! Bodies and history are stored as JSON text; timestamps as RFC 3339. Callers
//! own the transaction: every mutation pairs a row write with an audit entry
//! under the same transaction.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::Result;
use crate::knowledge::types::{HistoryEntry, KnowledgeRecord, RecordBody, RecordMetadata};

const SELECT_COLUMNS: &str = "id, file, category, body, source, created_at, updated_at, \
     usage_count, verified, quality_score, version, domain_version, history";

/// Audit operation kinds accepted by the `record_log` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOperation {
    Create,
    Merge,
    Update,
    Delete,
    Usage,
}

impl LogOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Merge => "merge",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Usage => "usage",
        }
    }
}

/// One row of the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub operation: String,
    pub record_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub created_at: String,
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<KnowledgeRecord> {
    let body: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    let usage_count: i64 = row.get(7)?;
    let version: i64 = row.get(10)?;
    let history: String = row.get(12)?;

    Ok(KnowledgeRecord {
        id: row.get(0)?,
        file: row.get(1)?,
        category: row.get(2)?,
        body: parse_json::<RecordBody>(3, &body)?,
        metadata: RecordMetadata {
            source: row.get(4)?,
            created_at: parse_timestamp(5, &created_at)?,
            updated_at: parse_timestamp(6, &updated_at)?,
            usage_count: usage_count.max(0) as u64,
            verified: row.get(8)?,
            quality_score: row.get(9)?,
            version: version.max(1) as u32,
            domain_version: row.get(11)?,
            history: parse_json::<Vec<HistoryEntry>>(12, &history)?,
        },
    })
}

/// Load every record, ordered by id.
pub fn load_all(conn: &Connection) -> Result<Vec<KnowledgeRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM records ORDER BY id"))?;
    let records = stmt
        .query_map([], row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Load a single record.
pub fn load_record(conn: &Connection, id: &str) -> Result<Option<KnowledgeRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM records WHERE id = ?1"),
            params![id],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

/// Insert or fully replace a record row.
pub fn upsert_record(conn: &Connection, record: &KnowledgeRecord) -> Result<()> {
    let body = serde_json::to_string(&record.body)?;
    let history = serde_json::to_string(&record.metadata.history)?;
    let meta = &record.metadata;

    conn.execute(
        "INSERT INTO records (id, file, category, body, source, created_at, updated_at, \
             usage_count, verified, quality_score, version, domain_version, history) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
         ON CONFLICT(id) DO UPDATE SET \
             file = excluded.file, category = excluded.category, body = excluded.body, \
             source = excluded.source, updated_at = excluded.updated_at, \
             usage_count = excluded.usage_count, verified = excluded.verified, \
             quality_score = excluded.quality_score, version = excluded.version, \
             domain_version = excluded.domain_version, history = excluded.history",
        params![
            record.id,
            record.file,
            record.category,
            body,
            meta.source,
            meta.created_at.to_rfc3339(),
            meta.updated_at.to_rfc3339(),
            meta.usage_count as i64,
            meta.verified,
            meta.quality_score,
            meta.version as i64,
            meta.domain_version,
            history,
        ],
    )?;
    Ok(())
}

/// Usage counter and score only; avoids rewriting the body on every search.
pub fn update_usage(conn: &Connection, record: &KnowledgeRecord) -> Result<()> {
    conn.execute(
        "UPDATE records SET usage_count = ?1, quality_score = ?2 WHERE id = ?3",
        params![
            record.metadata.usage_count as i64,
            record.metadata.quality_score,
            record.id
        ],
    )?;
    Ok(())
}

/// Delete a record row. Returns `false` if no row had that id.
pub fn delete_record(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM records WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// Write an entry to the `record_log` audit table.
pub fn write_audit_log(
    conn: &Connection,
    operation: LogOperation,
    record_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO record_log (operation, record_id, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation.as_str(), record_id, details_json, now],
    )?;
    Ok(())
}

/// Audit entries for one record, oldest first.
pub fn audit_log(conn: &Connection, record_id: &str) -> Result<Vec<LogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT operation, record_id, details, created_at FROM record_log \
         WHERE record_id = ?1 ORDER BY id",
    )?;
    let entries = stmt
        .query_map(params![record_id], |row| {
            let details: Option<String> = row.get(2)?;
            Ok(LogEntry {
                operation: row.get(0)?,
                record_id: row.get(1)?,
                details: details.and_then(|d| serde_json::from_str(&d).ok()),
                created_at: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}
