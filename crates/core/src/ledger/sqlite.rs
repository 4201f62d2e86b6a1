//! SQLite-backed migration ledger.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{
    LedgerError, LessonState, LessonStatus, MigrationLedger, MigrationOutcome, MigrationRecord,
    MigrationStatus, MigrationUpdate,
};

const MIGRATION_COLUMNS: &str =
    "workspace_id, course_id, course_name, status, progress, local_path, remote_url, error, updated_at, job_id";

/// SQLite-backed ledger.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the ledger tables in the database at `path`.
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory ledger (useful for testing).
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                workspace_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                course_name TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                local_path TEXT NOT NULL DEFAULT '',
                remote_url TEXT,
                error TEXT,
                updated_at TEXT NOT NULL,
                job_id TEXT,
                UNIQUE(workspace_id, course_id)
            );

            CREATE INDEX IF NOT EXISTS idx_migrations_status ON migrations(status);

            CREATE TABLE IF NOT EXISTS lesson_migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lesson_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                workspace_id TEXT NOT NULL,
                processing_status TEXT NOT NULL DEFAULT 'idle',
                stream_url TEXT,
                updated_at TEXT NOT NULL,
                UNIQUE(workspace_id, course_id, lesson_id)
            );

            CREATE INDEX IF NOT EXISTS idx_lesson_migrations_status
                ON lesson_migrations(processing_status);
            "#,
        )?;

        // Migration: add job_id column if it doesn't exist
        let _ = conn.execute("ALTER TABLE migrations ADD COLUMN job_id TEXT", []);

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Database("ledger connection lock poisoned".to_string()))
    }

    fn parse_timestamp(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<(MigrationRecord, String)> {
        let status: String = row.get(3)?;
        let progress: i64 = row.get(4)?;
        let updated_at: String = row.get(8)?;

        let record = MigrationRecord {
            workspace_id: row.get(0)?,
            course_id: row.get(1)?,
            course_name: row.get(2)?,
            // Placeholder, replaced after the status text is validated.
            status: MigrationStatus::Queued,
            progress: progress.clamp(0, 100) as u8,
            local_path: row.get(5)?,
            remote_url: row.get(6)?,
            error: row.get(7)?,
            job_id: row.get(9)?,
            updated_at: Self::parse_timestamp(&updated_at),
        };
        Ok((record, status))
    }

    fn finish_row(
        (mut record, status): (MigrationRecord, String),
    ) -> Result<MigrationRecord, LedgerError> {
        record.status = status.parse().map_err(LedgerError::Corrupt)?;
        Ok(record)
    }

    fn select_one(
        conn: &Connection,
        workspace_id: &str,
        course_id: &str,
    ) -> Result<Option<MigrationRecord>, LedgerError> {
        let sql = format!(
            "SELECT {} FROM migrations WHERE workspace_id = ? AND course_id = ?",
            MIGRATION_COLUMNS
        );
        conn.query_row(&sql, params![workspace_id, course_id], Self::row_to_record)
            .optional()?
            .map(Self::finish_row)
            .transpose()
    }

    fn placeholders(count: usize) -> String {
        vec!["?"; count].join(", ")
    }
}

impl MigrationLedger for SqliteLedger {
    fn upsert_migration(
        &self,
        workspace_id: &str,
        course_id: &str,
        update: &MigrationUpdate,
    ) -> Result<MigrationRecord, LedgerError> {
        let conn = self.conn()?;
        let now = Utc::now();

        conn.execute(
            r#"
            INSERT INTO migrations
                (workspace_id, course_id, course_name, status, progress, local_path, remote_url, error, updated_at, job_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(workspace_id, course_id) DO UPDATE SET
                course_name = excluded.course_name,
                status = excluded.status,
                progress = excluded.progress,
                local_path = excluded.local_path,
                remote_url = excluded.remote_url,
                error = excluded.error,
                updated_at = excluded.updated_at,
                job_id = excluded.job_id
            "#,
            params![
                workspace_id,
                course_id,
                update.course_name,
                update.status.as_str(),
                i64::from(update.progress.min(100)),
                update.local_path,
                update.remote_url,
                update.error,
                now.to_rfc3339(),
                update.job_id,
            ],
        )?;

        Ok(MigrationRecord {
            workspace_id: workspace_id.to_string(),
            course_id: course_id.to_string(),
            course_name: update.course_name.clone(),
            status: update.status,
            progress: update.progress.min(100),
            local_path: update.local_path.clone(),
            remote_url: update.remote_url.clone(),
            error: update.error.clone(),
            job_id: update.job_id.clone(),
            updated_at: now,
        })
    }

    fn get_migration(
        &self,
        workspace_id: &str,
        course_id: &str,
    ) -> Result<Option<MigrationRecord>, LedgerError> {
        let conn = self.conn()?;
        Self::select_one(&conn, workspace_id, course_id)
    }

    fn list_migrations(&self, workspace_id: &str) -> Result<Vec<MigrationRecord>, LedgerError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM migrations WHERE workspace_id = ? ORDER BY updated_at DESC",
            MIGRATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![workspace_id], Self::row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(Self::finish_row(row?)?);
        }
        Ok(records)
    }

    fn assign_job(
        &self,
        workspace_id: &str,
        course_id: &str,
        job_id: &str,
    ) -> Result<bool, LedgerError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE migrations
            SET job_id = ?, updated_at = ?
            WHERE workspace_id = ? AND course_id = ? AND status IN ('queued', 'downloading')
            "#,
            params![job_id, Utc::now().to_rfc3339(), workspace_id, course_id],
        )?;
        Ok(changed > 0)
    }

    fn advance_progress(
        &self,
        workspace_id: &str,
        course_id: &str,
        job_id: &str,
        progress: u8,
    ) -> Result<bool, LedgerError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE migrations
            SET progress = MAX(progress, ?), updated_at = ?
            WHERE workspace_id = ? AND course_id = ? AND job_id = ? AND status = 'downloading'
            "#,
            params![
                i64::from(progress.min(100)),
                Utc::now().to_rfc3339(),
                workspace_id,
                course_id,
                job_id
            ],
        )?;
        Ok(changed > 0)
    }

    fn finish_migration(
        &self,
        workspace_id: &str,
        course_id: &str,
        job_id: &str,
        outcome: &MigrationOutcome,
    ) -> Result<bool, LedgerError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE migrations
            SET status = ?,
                progress = COALESCE(?, progress),
                remote_url = COALESCE(?, remote_url),
                error = ?,
                updated_at = ?
            WHERE workspace_id = ? AND course_id = ? AND job_id = ?
                AND status IN ('queued', 'downloading')
            "#,
            params![
                outcome.status.as_str(),
                outcome.progress.map(i64::from),
                outcome.remote_url,
                outcome.error,
                Utc::now().to_rfc3339(),
                workspace_id,
                course_id,
                job_id
            ],
        )?;
        Ok(changed > 0)
    }

    fn cancel_migrations(&self, statuses: &[MigrationStatus]) -> Result<usize, LedgerError> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let conn = self.conn()?;
        let sql = format!(
            "UPDATE migrations SET status = 'cancelled', updated_at = ? WHERE status IN ({})",
            Self::placeholders(statuses.len())
        );

        let now = Utc::now().to_rfc3339();
        let values = std::iter::once(now.as_str()).chain(statuses.iter().map(|s| s.as_str()));
        Ok(conn.execute(&sql, params_from_iter(values))?)
    }

    fn cancel_migration(&self, workspace_id: &str, course_id: &str) -> Result<bool, LedgerError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE migrations
            SET status = 'cancelled', updated_at = ?
            WHERE workspace_id = ? AND course_id = ? AND status IN ('queued', 'downloading')
            "#,
            params![Utc::now().to_rfc3339(), workspace_id, course_id],
        )?;
        Ok(changed > 0)
    }

    fn upsert_lesson_status(
        &self,
        workspace_id: &str,
        course_id: &str,
        lesson_id: &str,
        status: LessonStatus,
        stream_url: Option<&str>,
    ) -> Result<(), LedgerError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO lesson_migrations
                (lesson_id, course_id, workspace_id, processing_status, stream_url, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(workspace_id, course_id, lesson_id) DO UPDATE SET
                processing_status = excluded.processing_status,
                stream_url = COALESCE(excluded.stream_url, lesson_migrations.stream_url),
                updated_at = excluded.updated_at
            "#,
            params![
                lesson_id,
                course_id,
                workspace_id,
                status.as_str(),
                stream_url,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn fail_processing_lessons(&self) -> Result<usize, LedgerError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE lesson_migrations SET processing_status = 'error', updated_at = ? WHERE processing_status = 'processing'",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(changed)
    }

    fn read_lesson_statuses(
        &self,
        course_id: &str,
        workspace_id: &str,
    ) -> Result<HashMap<String, LessonState>, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT lesson_id, processing_status, stream_url FROM lesson_migrations WHERE course_id = ? AND workspace_id = ?",
        )?;
        let rows = stmt.query_map(params![course_id, workspace_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut statuses = HashMap::new();
        for row in rows {
            let (lesson_id, status, stream_url) = row?;
            statuses.insert(
                lesson_id,
                LessonState {
                    processing_status: status.parse().map_err(LedgerError::Corrupt)?,
                    stream_url,
                },
            );
        }
        Ok(statuses)
    }
}
