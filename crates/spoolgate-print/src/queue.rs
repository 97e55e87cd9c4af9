// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Virtual print queue facade and its SQLite-backed implementation.
//
// The engine only ever reads queue jobs and deletes them once the operator
// has decided.  Jobs are added by the virtual printer's spool-port hook
// (`spoolgate enqueue`).  A file-backed queue opens the database for each
// operation and closes it again, so no handle outlives a single call.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

use spoolgate_core::error::{Result, SpoolgateError};
use spoolgate_core::types::{JobId, PrintJob};

/// SQLite schema for the jobs table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        printer TEXT NOT NULL,
        document_name TEXT NOT NULL,
        total_pages INTEGER NOT NULL DEFAULT 0,
        paper_width INTEGER NOT NULL DEFAULT 0,
        paper_height INTEGER NOT NULL DEFAULT 0,
        submitted_at TEXT NOT NULL
    )
"#;

/// Operations the engine needs from the virtual print queue.
///
/// Implementations are called from blocking contexts; they must not hold a
/// queue handle between calls.
pub trait PrintQueue: Send + Sync {
    /// All jobs currently held on the virtual printer, oldest first.
    fn enumerate_jobs(&self) -> Result<Vec<PrintJob>>;

    /// Full details of one job, or `None` if it is no longer queued.
    fn get_job(&self, job_id: JobId) -> Result<Option<PrintJob>>;

    /// Remove a job.  Deleting a job that is already gone succeeds.
    fn delete_job(&self, job_id: JobId) -> Result<()>;
}

enum Backing {
    File(PathBuf),
    Memory(Mutex<Connection>),
}

/// Virtual print queue stored in a SQLite database, scoped to one printer.
pub struct SqliteQueue {
    backing: Backing,
    printer: String,
}

impl SqliteQueue {
    /// Open (or create) the queue database at `path` for `printer`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, printer: impl Into<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let printer = printer.into();
        let conn = connect(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| SpoolgateError::Database(format!("WAL pragma: {e}")))?;
        drop(conn);

        info!(%printer, "virtual queue database ready");
        Ok(Self {
            backing: Backing::File(path),
            printer,
        })
    }

    /// Open an in-memory queue (useful for tests).
    pub fn open_in_memory(printer: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SpoolgateError::QueueUnavailable(format!("open in-memory: {e}")))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| SpoolgateError::Database(format!("create table: {e}")))?;

        debug!("in-memory virtual queue opened");
        Ok(Self {
            backing: Backing::Memory(Mutex::new(conn)),
            printer: printer.into(),
        })
    }

    pub fn printer(&self) -> &str {
        &self.printer
    }

    /// Add a job to the queue and return its id.
    #[instrument(skip(self))]
    pub fn submit(
        &self,
        document_name: &str,
        total_pages: u32,
        paper_width_units: u32,
        paper_height_units: u32,
    ) -> Result<JobId> {
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO jobs (printer, document_name, total_pages, paper_width,
                 paper_height, submitted_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    self.printer,
                    document_name,
                    total_pages,
                    paper_width_units,
                    paper_height_units,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| SpoolgateError::Database(format!("insert job: {e}")))?;
            Ok(conn.last_insert_rowid())
        })?;

        let id = u32::try_from(id)
            .map_err(|_| SpoolgateError::Database(format!("job id {id} out of range")))?;
        info!(job_id = id, "job submitted to virtual queue");
        Ok(JobId(id))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        match &self.backing {
            Backing::File(path) => {
                let conn = connect(path)?;
                f(&conn)
            }
            Backing::Memory(conn) => {
                let conn = conn.lock().expect("queue connection lock poisoned");
                f(&conn)
            }
        }
    }
}

impl PrintQueue for SqliteQueue {
    #[instrument(skip(self), fields(printer = %self.printer))]
    fn enumerate_jobs(&self) -> Result<Vec<PrintJob>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, document_name, total_pages, paper_width, paper_height
                     FROM jobs WHERE printer = ?1 ORDER BY id ASC",
                )
                .map_err(|e| SpoolgateError::Database(format!("prepare enumerate: {e}")))?;

            let jobs = stmt
                .query_map(params![self.printer], row_to_print_job)
                .map_err(|e| SpoolgateError::Database(format!("query enumerate: {e}")))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| SpoolgateError::Database(format!("collect rows: {e}")))?;

            debug!(count = jobs.len(), "enumerated queue jobs");
            Ok(jobs)
        })
    }

    #[instrument(skip(self), fields(%job_id))]
    fn get_job(&self, job_id: JobId) -> Result<Option<PrintJob>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, document_name, total_pages, paper_width, paper_height
                 FROM jobs WHERE id = ?1 AND printer = ?2",
                params![job_id.0, self.printer],
                row_to_print_job,
            )
            .optional()
            .map_err(|e| SpoolgateError::Database(format!("get job: {e}")))
        })
    }

    #[instrument(skip(self), fields(%job_id))]
    fn delete_job(&self, job_id: JobId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM jobs WHERE id = ?1 AND printer = ?2",
                params![job_id.0, self.printer],
            )
            .map_err(|e| SpoolgateError::Database(format!("delete job: {e}")))?;
            Ok(())
        })?;

        info!(%job_id, "job deleted from virtual queue");
        Ok(())
    }
}

fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| SpoolgateError::QueueUnavailable(format!("open {}: {e}", path.display())))?;
    conn.execute_batch(CREATE_TABLE_SQL)
        .map_err(|e| SpoolgateError::Database(format!("create table: {e}")))?;
    Ok(conn)
}

/// Map a SQLite row to a `PrintJob`.
///
/// Column order must match the SELECTs above.
fn row_to_print_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrintJob> {
    Ok(PrintJob {
        id: JobId(row.get(0)?),
        document_name: row.get(1)?,
        declared_total_pages: row.get(2)?,
        paper_width_units: row.get(3)?,
        paper_height_units: row.get(4)?,
    })
}
