use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::error::AppResult;

pub mod migrations;

pub mod repositories;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the teampulse database file.
///
/// Hands out a freshly configured connection per call instead of holding one
/// open. WAL mode plus the busy timeout lets the request path and the chain
/// confirmation poller touch the file concurrently without sharing a handle.
#[derive(Clone, Debug)]
pub struct DbPool {
    path: PathBuf,
}

impl DbPool {
    /// Create the handle, the parent directory if missing, and bootstrap
    /// schema and migrations up front so the first caller never pays for it.
    pub fn new<P: Into<PathBuf>>(path: P) -> AppResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let pool = Self { path };
        pool.get_connection()?;
        debug!(target: "app::db", db_path = %pool.path.display(), "database ready");
        Ok(pool)
    }

    pub fn get_connection(&self) -> AppResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", &1)?;
        conn.pragma_update(None, "journal_mode", &"WAL")?;
        conn.execute_batch(SCHEMA_SQL)?;
        migrations::run(&conn)?;
        Ok(conn)
    }

    /// Location of the backing file. Logs are written next to it.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("data").join("teampulse.sqlite");
        let pool = DbPool::new(nested.clone()).unwrap();
        assert!(nested.exists());
        assert_eq!(pool.path(), nested.as_path());
    }

    #[test]
    fn connections_come_up_with_schema_and_migrations_applied() {
        let dir = tempdir().unwrap();
        let pool = DbPool::new(dir.path().join("teampulse.sqlite")).unwrap();
        let conn = pool.get_connection().unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master \
                 WHERE type = 'table' AND name IN ('employees', 'tasks', 'score_snapshots', 'activity_log')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }
}
