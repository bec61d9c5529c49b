use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use crate::error::AppResult;

const USER_VERSION: i32 = 2;

pub fn run(conn: &Connection) -> AppResult<()> {
    // Ensure migration history table exists
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS migration_history (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );
        "#,
    )?;

    let mut current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version < 1 {
        info!(target: "app::db", version = current_version, "running migration v1");
        migrate_to_v1(conn)?;
        current_version = 1;
        conn.execute(&format!("PRAGMA user_version = {}", current_version), [])?;
        record_migration(conn, 1, "Add previous_score trend reference to score snapshots")?;
    }

    if current_version < 2 {
        info!(target: "app::db", version = current_version, "running migration v2");
        migrate_to_v2(conn)?;
        current_version = 2;
        conn.execute(&format!("PRAGMA user_version = {}", current_version), [])?;
        record_migration(conn, 2, "Add per-entry backoff scheduling to activity log")?;
    }

    debug_assert!(current_version == USER_VERSION);

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, description: &str) -> AppResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO migration_history (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![version, description, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn migrate_to_v1(conn: &Connection) -> AppResult<()> {
    if !column_exists(conn, "score_snapshots", "previous_score")? {
        conn.execute(
            "ALTER TABLE score_snapshots ADD COLUMN previous_score INTEGER",
            [],
        )?;
    }
    Ok(())
}

fn migrate_to_v2(conn: &Connection) -> AppResult<()> {
    if !column_exists(conn, "activity_log", "next_attempt_at")? {
        conn.execute(
            "ALTER TABLE activity_log ADD COLUMN next_attempt_at TEXT NOT NULL DEFAULT ''",
            [],
        )?;
        conn.execute(
            "UPDATE activity_log SET next_attempt_at = submitted_at WHERE next_attempt_at = ''",
            [],
        )?;
    }
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
