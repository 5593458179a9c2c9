//! Durable enrichment job: definition, queue, cursor and last snapshot.
//!
//! Only the current job is kept. The queue is rewritten when it changes
//! (start, retry). The cursor, state and snapshot are written after every
//! item in a single statement.

use super::models::JobState;
use super::progress::ProgressSnapshot;
use crate::selection::{QueueEntry, SelectionRequest};
use crate::sqlite_column;
use crate::sqlite_persistence::{open_versioned_db, Column, SqlType, Table, VersionedSchema};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const ENRICHMENT_JOBS_TABLE_V0: Table = Table {
    name: "enrichment_jobs",
    columns: &[
        sqlite_column!("job_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("state", &SqlType::Text, non_null = true),
        // JSON SelectionRequest, NULL for explicit runs
        sqlite_column!("request", &SqlType::Text),
        sqlite_column!(
            "force_refresh",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("queue", &SqlType::Text, non_null = true),
        sqlite_column!(
            "cursor",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("snapshot", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
};

pub const JOBS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[ENRICHMENT_JOBS_TABLE_V0],
    migration: None,
}];

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedJob {
    pub job_id: String,
    pub state: JobState,
    pub request: Option<SelectionRequest>,
    pub force_refresh: bool,
    pub queue: Vec<QueueEntry>,
    pub cursor: usize,
    pub snapshot: ProgressSnapshot,
    pub created_at: i64,
}

pub trait JobStore: Send + Sync {
    /// The current job, if any.
    fn load_current(&self) -> Result<Option<PersistedJob>>;

    /// Replace the current job with `job`.
    fn save_job(&self, job: &PersistedJob) -> Result<()>;

    /// Record per-item progress of the current job.
    fn save_progress(
        &self,
        job_id: &str,
        state: JobState,
        cursor: usize,
        snapshot: &ProgressSnapshot,
    ) -> Result<()>;

    /// Drop the current job.
    fn clear(&self) -> Result<()>;
}

pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, JOBS_VERSIONED_SCHEMAS, "enrichment jobs")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        JOBS_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl JobStore for SqliteJobStore {
    fn load_current(&self) -> Result<Option<PersistedJob>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                r#"SELECT job_id, state, request, force_refresh, queue, cursor, snapshot, created_at
                   FROM enrichment_jobs
                   ORDER BY created_at DESC
                   LIMIT 1"#,
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, i64>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((job_id, state, request, force_refresh, queue, cursor, snapshot, created_at)) =
            row
        else {
            return Ok(None);
        };

        let state = JobState::from_db_str(&state)
            .with_context(|| format!("Unknown job state '{}' for {}", state, job_id))?;
        let request = request
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .with_context(|| format!("Corrupted request of job {}", job_id))?;
        let queue = serde_json::from_str(&queue)
            .with_context(|| format!("Corrupted queue of job {}", job_id))?;
        let snapshot = serde_json::from_str(&snapshot)
            .with_context(|| format!("Corrupted snapshot of job {}", job_id))?;

        Ok(Some(PersistedJob {
            job_id,
            state,
            request,
            force_refresh: force_refresh != 0,
            queue,
            cursor: cursor.max(0) as usize,
            snapshot,
            created_at,
        }))
    }

    fn save_job(&self, job: &PersistedJob) -> Result<()> {
        let request = job.request.as_ref().map(serde_json::to_string).transpose()?;
        let queue = serde_json::to_string(&job.queue)?;
        let snapshot = serde_json::to_string(&job.snapshot)?;
        let now = chrono::Utc::now().timestamp();

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM enrichment_jobs WHERE job_id != ?1", [&job.job_id])?;
        tx.execute(
            r#"INSERT OR REPLACE INTO enrichment_jobs (
                job_id, state, request, force_refresh, queue, cursor, snapshot,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                job.job_id,
                job.state.as_db_str(),
                request,
                job.force_refresh as i64,
                queue,
                job.cursor as i64,
                snapshot,
                job.created_at,
                now,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn save_progress(
        &self,
        job_id: &str,
        state: JobState,
        cursor: usize,
        snapshot: &ProgressSnapshot,
    ) -> Result<()> {
        let snapshot = serde_json::to_string(snapshot)?;
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE enrichment_jobs
               SET state = ?2, cursor = ?3, snapshot = ?4, updated_at = ?5
               WHERE job_id = ?1"#,
            params![
                job_id,
                state.as_db_str(),
                cursor as i64,
                snapshot,
                chrono::Utc::now().timestamp()
            ],
        )?;
        if updated == 0 {
            anyhow::bail!("Job {} is not persisted", job_id);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM enrichment_jobs", [])?;
        Ok(())
    }
}
