//! libSQL storage layer for the action queue.
//!
//! The [`Storage`] struct wraps a local libSQL database holding three tables:
//! the action queue itself, the job list the worker drains, and the last
//! heartbeat of every job class.
//!
//! **Access rules:**
//! - worker and `enqueue`: read-write via [`Storage::open`]
//! - inspection commands: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use indexsync_shared::{Heartbeat, IndexSyncError, JobRecord, QueueEntry, Result};
use libsql::{Connection, Database, Value, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IndexSyncError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` without permitting writes.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IndexSyncError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        IndexSyncError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(IndexSyncError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Action queue
    // -----------------------------------------------------------------------

    /// Append an action to the queue. Returns the new entry's id.
    pub async fn enqueue(&self, action_type: &str, payload: Option<&str>) -> Result<i64> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO action_queue (type, payload) VALUES (?1, ?2)",
                params![action_type, payload],
            )
            .await
            .map_err(storage_err)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Read up to `limit` entries, oldest first. Does not modify the queue.
    pub async fn fetch_batch(&self, limit: usize) -> Result<Vec<QueueEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .query(
                "SELECT id, type, payload FROM action_queue ORDER BY id ASC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(storage_err)?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            entries.push(QueueEntry {
                id: row.get::<i64>(0).map_err(storage_err)?,
                action_type: row.get::<String>(1).map_err(storage_err)?,
                payload: match row.get_value(2).map_err(storage_err)? {
                    Value::Null => None,
                    Value::Text(text) => Some(text),
                    other => {
                        return Err(IndexSyncError::Storage(format!(
                            "queue entry payload has non-text type: {other:?}"
                        )));
                    }
                },
            });
        }
        Ok(entries)
    }

    /// Delete one entry by id. Deleting a missing id is not an error.
    pub async fn remove_from_queue(&self, id: i64) -> Result<()> {
        self.check_writable()?;
        let deleted = self
            .conn
            .execute("DELETE FROM action_queue WHERE id = ?1", params![id])
            .await
            .map_err(storage_err)?;
        if deleted == 0 {
            tracing::debug!(id, "queue entry already removed");
        }
        Ok(())
    }

    /// Number of pending entries.
    pub async fn queue_len(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM action_queue", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Job list
    // -----------------------------------------------------------------------

    /// Request a run of `job_class`. Returns `false` if a run is already pending.
    pub async fn add_job(&self, job_class: &str) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn
            .execute(
                "INSERT INTO jobs (job_class, added_at) VALUES (?1, ?2)
                 ON CONFLICT(job_class) DO NOTHING",
                params![job_class, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(inserted > 0)
    }

    /// Pop the oldest pending job. The row is deleted before it is returned,
    /// so a job that wants to run again must add itself back.
    pub async fn take_next_job(&self) -> Result<Option<JobRecord>> {
        self.check_writable()?;
        let mut rows = self
            .conn
            .query(
                "SELECT id, job_class, added_at FROM jobs ORDER BY id ASC LIMIT 1",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };
        let job = row_to_job(&row)?;
        drop(rows);

        self.conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![job.id])
            .await
            .map_err(storage_err)?;
        Ok(Some(job))
    }

    /// All pending jobs, oldest first.
    pub async fn list_jobs(&self) -> Result<Vec<JobRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, job_class, added_at FROM jobs ORDER BY id ASC",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    // -----------------------------------------------------------------------
    // Heartbeats
    // -----------------------------------------------------------------------

    /// Record that `job_class` is alive in run `run_id`.
    pub async fn record_heartbeat(&self, job_class: &str, run_id: i64) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO job_heartbeats (job_class, run_id, beat_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(job_class) DO UPDATE SET
                   run_id = excluded.run_id,
                   beat_at = excluded.beat_at",
                params![job_class, run_id, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Most recent heartbeat for `job_class`, if it ever ran.
    pub async fn last_heartbeat(&self, job_class: &str) -> Result<Option<Heartbeat>> {
        let mut rows = self
            .conn
            .query(
                "SELECT job_class, run_id, beat_at FROM job_heartbeats WHERE job_class = ?1",
                params![job_class],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(Heartbeat {
                job_class: row.get::<String>(0).map_err(storage_err)?,
                run_id: row.get::<i64>(1).map_err(storage_err)?,
                beat_at: parse_timestamp(&row.get::<String>(2).map_err(storage_err)?)?,
            })),
            None => Ok(None),
        }
    }
}

fn storage_err(e: libsql::Error) -> IndexSyncError {
    IndexSyncError::Storage(e.to_string())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| IndexSyncError::Storage(format!("invalid date '{s}': {e}")))
}

/// Convert a `jobs` row to a [`JobRecord`].
fn row_to_job(row: &libsql::Row) -> Result<JobRecord> {
    Ok(JobRecord {
        id: row.get::<i64>(0).map_err(storage_err)?,
        job_class: row.get::<String>(1).map_err(storage_err)?,
        added_at: parse_timestamp(&row.get::<String>(2).map_err(storage_err)?)?,
    })
}
