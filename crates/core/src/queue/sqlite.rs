//! SQLite-backed job queue.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Notify;
use uuid::Uuid;

use super::{Job, JobQueue, JobState, QueueCounts, QueueError};

const JOB_COLUMNS: &str =
    "id, name, payload, state, attempts, error, run_at, created_at, updated_at";

const PAUSED_KEY: &str = "paused";

/// SQLite-backed job queue.
pub struct SqliteJobQueue {
    conn: Mutex<Connection>,
    notify: Arc<Notify>,
}

impl SqliteJobQueue {
    /// Open (or create) the queue tables in the database at `path`.
    pub fn new(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            notify: Arc::new(Notify::new()),
        })
    }

    /// Create an in-memory queue (useful for testing).
    pub fn in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            notify: Arc::new(Notify::new()),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), QueueError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                payload TEXT NOT NULL,
                state TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                run_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_state_run_at ON jobs(state, run_at);

            CREATE TABLE IF NOT EXISTS queue_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Database("queue connection lock poisoned".to_string()))
    }

    /// Fixed-width UTC timestamps so text ordering matches time ordering.
    fn timestamp(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_timestamp(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<(Job, String)> {
        let state: String = row.get(3)?;
        let attempts: i64 = row.get(4)?;
        let run_at: String = row.get(6)?;
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(8)?;

        let job = Job {
            id: row.get(0)?,
            name: row.get(1)?,
            payload: row.get(2)?,
            state: JobState::Waiting,
            attempts: attempts.max(0) as u32,
            error: row.get(5)?,
            run_at: Self::parse_timestamp(&run_at),
            created_at: Self::parse_timestamp(&created_at),
            updated_at: Self::parse_timestamp(&updated_at),
        };
        Ok((job, state))
    }

    fn finish_row((mut job, state): (Job, String)) -> Result<Job, QueueError> {
        job.state = state.parse().map_err(QueueError::Corrupt)?;
        Ok(job)
    }

    fn select_one(conn: &Connection, id: &str) -> Result<Option<Job>, QueueError> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
        conn.query_row(&sql, params![id], Self::row_to_job)
            .optional()?
            .map(Self::finish_row)
            .transpose()
    }

    fn paused(conn: &Connection) -> Result<bool, QueueError> {
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM queue_meta WHERE key = ?",
                params![PAUSED_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.as_deref() == Some("1"))
    }

    fn set_paused(&self, paused: bool) -> Result<(), QueueError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO queue_meta (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![PAUSED_KEY, if paused { "1" } else { "0" }],
        )?;
        Ok(())
    }

    fn insert(
        &self,
        name: &str,
        payload: &serde_json::Value,
        state: JobState,
        run_at: DateTime<Utc>,
    ) -> Result<Job, QueueError> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            payload: payload.to_string(),
            state,
            attempts: 0,
            error: None,
            run_at,
            created_at: now,
            updated_at: now,
        };

        {
            let conn = self.conn()?;
            conn.execute(
                r#"
                INSERT INTO jobs (id, name, payload, state, attempts, error, run_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, 0, NULL, ?, ?, ?)
                "#,
                params![
                    job.id,
                    job.name,
                    job.payload,
                    job.state.as_str(),
                    Self::timestamp(job.run_at),
                    Self::timestamp(job.created_at),
                    Self::timestamp(job.updated_at),
                ],
            )?;
        }

        self.notify.notify_one();
        Ok(job)
    }

    fn finish(&self, id: &str, state: JobState, error: Option<&str>) -> Result<bool, QueueError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE jobs SET state = ?, error = ?, updated_at = ? WHERE id = ?",
            params![state.as_str(), error, Self::timestamp(Utc::now()), id],
        )?;
        Ok(changed > 0)
    }
}

impl JobQueue for SqliteJobQueue {
    fn enqueue(&self, name: &str, payload: &serde_json::Value) -> Result<Job, QueueError> {
        self.insert(name, payload, JobState::Waiting, Utc::now())
    }

    fn enqueue_delayed(
        &self,
        name: &str,
        payload: &serde_json::Value,
        delay: Duration,
    ) -> Result<Job, QueueError> {
        let run_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);
        self.insert(name, payload, JobState::Delayed, run_at)
    }

    fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        let mut conn = self.conn()?;
        if Self::paused(&conn)? {
            return Ok(None);
        }

        let now = Self::timestamp(Utc::now());
        let tx = conn.transaction()?;

        let sql = format!(
            r#"
            SELECT {} FROM jobs
            WHERE state = 'waiting' OR (state = 'delayed' AND run_at <= ?)
            ORDER BY run_at ASC, seq ASC
            LIMIT 1
            "#,
            JOB_COLUMNS
        );
        let claimed = tx
            .query_row(&sql, params![now], Self::row_to_job)
            .optional()?
            .map(Self::finish_row)
            .transpose()?;

        let Some(mut job) = claimed else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE jobs SET state = 'active', attempts = attempts + 1, updated_at = ? WHERE id = ?",
            params![now, job.id],
        )?;
        tx.commit()?;

        job.state = JobState::Active;
        job.attempts += 1;
        job.updated_at = Self::parse_timestamp(&now);
        Ok(Some(job))
    }

    fn complete(&self, id: &str) -> Result<bool, QueueError> {
        self.finish(id, JobState::Completed, None)
    }

    fn fail(&self, id: &str, error: &str) -> Result<bool, QueueError> {
        self.finish(id, JobState::Failed, Some(error))
    }

    fn pause(&self) -> Result<(), QueueError> {
        self.set_paused(true)
    }

    fn resume(&self) -> Result<(), QueueError> {
        self.set_paused(false)?;
        self.notify.notify_waiters();
        Ok(())
    }

    fn is_paused(&self) -> Result<bool, QueueError> {
        let conn = self.conn()?;
        Self::paused(&conn)
    }

    fn clean(&self, state: JobState) -> Result<usize, QueueError> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM jobs WHERE state = ?", params![state.as_str()])?)
    }

    fn drain(&self) -> Result<usize, QueueError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM jobs WHERE state IN ('waiting', 'delayed')",
            [],
        )?)
    }

    fn counts(&self) -> Result<QueueCounts, QueueError> {
        let conn = self.conn()?;
        let mut counts = QueueCounts {
            paused: Self::paused(&conn)?,
            ..QueueCounts::default()
        };

        let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM jobs GROUP BY state")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (state, count) = row?;
            let count = count.max(0) as usize;
            match state.parse().map_err(QueueError::Corrupt)? {
                JobState::Waiting => counts.waiting = count,
                JobState::Delayed => counts.delayed = count,
                JobState::Active => counts.active = count,
                JobState::Completed => counts.completed = count,
                JobState::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }

    fn get(&self, id: &str) -> Result<Option<Job>, QueueError> {
        let conn = self.conn()?;
        Self::select_one(&conn, id)
    }

    fn recover_stalled(&self) -> Result<usize, QueueError> {
        let recovered = {
            let conn = self.conn()?;
            conn.execute(
                "UPDATE jobs SET state = 'waiting', updated_at = ? WHERE state = 'active'",
                params![Self::timestamp(Utc::now())],
            )?
        };
        if recovered > 0 {
            self.notify.notify_waiters();
        }
        Ok(recovered)
    }

    fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue() -> SqliteJobQueue {
        SqliteJobQueue::in_memory().unwrap()
    }

    #[test]
    fn test_claim_is_fifo() {
        let queue = queue();
        let first = queue.enqueue("migrate", &json!({"n": 1})).unwrap();
        let second = queue.enqueue("migrate", &json!({"n": 2})).unwrap();

        let claimed = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.state, JobState::Active);
        assert_eq!(claimed.attempts, 1);

        let claimed = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, second.id);
        assert!(queue.claim_next().unwrap().is_none());
    }

    #[test]
    fn test_payload_is_preserved() {
        let queue = queue();
        queue
            .enqueue("migrate", &json!({"course": {"name": "C"}, "workspaceId": "ws"}))
            .unwrap();

        let job = queue.claim_next().unwrap().unwrap();
        let value: serde_json::Value = job.payload_as().unwrap();
        assert_eq!(value["course"]["name"], "C");
        assert_eq!(value["workspaceId"], "ws");
    }

    #[test]
    fn test_complete_and_fail() {
        let queue = queue();
        let a = queue.enqueue("migrate", &json!({})).unwrap();
        let b = queue.enqueue("migrate", &json!({})).unwrap();
        queue.claim_next().unwrap();
        queue.claim_next().unwrap();

        assert!(queue.complete(&a.id).unwrap());
        assert!(queue.fail(&b.id, "process exited with code 1").unwrap());
        assert!(!queue.complete("missing").unwrap());

        let failed = queue.get(&b.id).unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.error.as_deref(), Some("process exited with code 1"));

        let counts = queue.counts().unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending(), 0);
    }

    #[test]
    fn test_paused_queue_hands_out_nothing() {
        let queue = queue();
        queue.enqueue("migrate", &json!({})).unwrap();
        queue.pause().unwrap();

        assert!(queue.is_paused().unwrap());
        assert!(queue.claim_next().unwrap().is_none());

        queue.resume().unwrap();
        assert!(queue.claim_next().unwrap().is_some());
    }

    #[test]
    fn test_delayed_job_not_claimable_early() {
        let queue = queue();
        queue
            .enqueue_delayed("migrate", &json!({}), Duration::from_secs(3600))
            .unwrap();
        assert!(queue.claim_next().unwrap().is_none());
        assert_eq!(queue.counts().unwrap().delayed, 1);

        queue
            .enqueue_delayed("migrate", &json!({}), Duration::ZERO)
            .unwrap();
        let job = queue.claim_next().unwrap().unwrap();
        assert_eq!(job.state, JobState::Active);
    }

    #[test]
    fn test_clean_and_drain() {
        let queue = queue();
        queue.enqueue("migrate", &json!({})).unwrap();
        queue.enqueue("migrate", &json!({})).unwrap();
        queue
            .enqueue_delayed("migrate", &json!({}), Duration::from_secs(60))
            .unwrap();
        queue.claim_next().unwrap();

        assert_eq!(queue.clean(JobState::Active).unwrap(), 1);
        assert_eq!(queue.drain().unwrap(), 2);
        assert_eq!(queue.counts().unwrap(), QueueCounts::default());
    }

    #[test]
    fn test_recover_stalled() {
        let queue = queue();
        let job = queue.enqueue("migrate", &json!({})).unwrap();
        queue.claim_next().unwrap();

        assert_eq!(queue.recover_stalled().unwrap(), 1);
        let claimed = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert_eq!(claimed.attempts, 2);
    }

    #[test]
    fn test_jobs_and_pause_survive_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("queue.db");

        {
            let queue = SqliteJobQueue::new(&path).unwrap();
            queue.enqueue("migrate", &json!({"n": 1})).unwrap();
            queue.pause().unwrap();
        }

        let reopened = SqliteJobQueue::new(&path).unwrap();
        assert!(reopened.is_paused().unwrap());
        assert_eq!(reopened.counts().unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiter() {
        let queue = Arc::new(queue());
        let notify = queue.notifier();

        let waiter = tokio::spawn(async move { notify.notified().await });
        tokio::task::yield_now().await;
        queue.enqueue("migrate", &json!({})).unwrap();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .unwrap();
    }
}
