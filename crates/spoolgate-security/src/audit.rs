// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail — append-only SQLite log of every operator decision and
// dispatch outcome.
//
// Schema:
//   audit_log(
//     id            INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp     TEXT    NOT NULL,   -- RFC 3339
//     action        TEXT    NOT NULL,   -- "approve", "reject", "abandoned", "forward"
//     job_id        INTEGER NOT NULL,   -- virtual queue job id
//     document_hash TEXT    NOT NULL,   -- SHA-256 hex digest of the spool file
//     success       INTEGER NOT NULL,   -- 0 = failure, 1 = success
//     details       TEXT                -- optional free-form context
//   )

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use spoolgate_core::error::SpoolgateError;
use spoolgate_core::types::JobId;
use tracing::{debug, instrument};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp     TEXT    NOT NULL,
    action        TEXT    NOT NULL,
    job_id        INTEGER NOT NULL,
    document_hash TEXT    NOT NULL,
    success       INTEGER NOT NULL,
    details       TEXT
);";

fn db_err(e: rusqlite::Error) -> SpoolgateError {
    SpoolgateError::Database(e.to_string())
}

/// A single entry in the audit log, used for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub action: String,
    pub job_id: JobId,
    pub document_hash: String,
    pub success: bool,
    pub details: Option<String>,
}

/// Append-only audit log backed by a SQLite database.
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SpoolgateError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("audit log opened");
        Ok(Self { conn })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SpoolgateError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory audit log opened");
        Ok(Self { conn })
    }

    /// Record a new audit entry.
    #[instrument(skip(self, details), fields(%action, %job_id, success))]
    pub fn record(
        &self,
        action: &str,
        job_id: JobId,
        document_hash: &str,
        success: bool,
        details: Option<&str>,
    ) -> Result<(), SpoolgateError> {
        let timestamp = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO audit_log (timestamp, action, job_id, document_hash, success, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    timestamp,
                    action,
                    job_id.0,
                    document_hash,
                    success as i32,
                    details
                ],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(())
    }

    /// All entries for a document, oldest first.
    pub fn entries_for_hash(&self, document_hash: &str) -> Result<Vec<AuditEntry>, SpoolgateError> {
        self.query(
            "SELECT id, timestamp, action, job_id, document_hash, success, details
             FROM audit_log WHERE document_hash = ?1 ORDER BY id ASC",
            params![document_hash],
        )
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<AuditEntry>, SpoolgateError> {
        self.query(
            "SELECT id, timestamp, action, job_id, document_hash, success, details
             FROM audit_log ORDER BY id DESC LIMIT ?1",
            params![limit],
        )
    }

    /// Total number of entries in the audit log.
    pub fn count(&self) -> Result<u64, SpoolgateError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(db_err)
    }

    fn query(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<AuditEntry>, SpoolgateError> {
        let mut stmt = self.conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    action: row.get(2)?,
                    job_id: JobId(row.get(3)?),
                    document_hash: row.get(4)?,
                    success: row.get::<_, i32>(5)? != 0,
                    details: row.get(6)?,
                })
            })
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_log() -> AuditLog {
        AuditLog::open_in_memory().expect("open in-memory audit log")
    }

    #[test]
    fn record_and_count() {
        let log = make_log();
        assert_eq!(log.count().unwrap(), 0);

        log.record("approve", JobId(1), "abc123", true, None).unwrap();
        log.record("forward", JobId(1), "abc123", true, Some("office"))
            .unwrap();

        assert_eq!(log.count().unwrap(), 2);
    }

    #[test]
    fn entries_for_hash() {
        let log = make_log();
        log.record("approve", JobId(1), "aaa", true, None).unwrap();
        log.record("reject", JobId(2), "bbb", true, None).unwrap();
        log.record("forward", JobId(1), "aaa", false, Some("connection refused"))
            .unwrap();

        let entries = log.entries_for_hash("aaa").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "approve");
        assert_eq!(entries[0].job_id, JobId(1));
        assert!(entries[0].success);
        assert_eq!(entries[1].action, "forward");
        assert!(!entries[1].success);
        assert_eq!(entries[1].details.as_deref(), Some("connection refused"));
    }

    #[test]
    fn abandoned_is_distinguishable_from_reject() {
        let log = make_log();
        log.record("reject", JobId(3), "ccc", true, None).unwrap();
        log.record("abandoned", JobId(4), "ddd", true, None).unwrap();

        let recent = log.recent_entries(10).unwrap();
        assert_eq!(recent[0].action, "abandoned");
        assert_eq!(recent[1].action, "reject");
    }

    #[test]
    fn recent_entries_ordering() {
        let log = make_log();
        for i in 0..5 {
            log.record("approve", JobId(i), &format!("hash_{i}"), true, None)
                .unwrap();
        }

        let recent = log.recent_entries(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent[0].id > recent[1].id);
        assert!(recent[1].id > recent[2].id);
    }
}
