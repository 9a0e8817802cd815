//! SQL migration definitions for the indexsync database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: action_queue",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Pending remote actions. AUTOINCREMENT keeps ids monotonic even after
-- the newest row has been deleted.
CREATE TABLE IF NOT EXISTS action_queue (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    type    TEXT NOT NULL,
    payload TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Job list and heartbeats",
            sql: r#"
-- Requested job runs; one pending row per job class.
CREATE TABLE IF NOT EXISTS jobs (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    job_class TEXT NOT NULL UNIQUE,
    added_at  TEXT NOT NULL
);

-- Last liveness signal per job class.
CREATE TABLE IF NOT EXISTS job_heartbeats (
    job_class TEXT PRIMARY KEY,
    run_id    INTEGER NOT NULL,
    beat_at   TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
