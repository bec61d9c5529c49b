use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::AppResult;
use crate::models::activity::{ActivityLogEntry, AnchorStatus};

const BASE_SELECT: &str = r#"
    SELECT
        id,
        organization_id,
        employee_id,
        task_id,
        event_type,
        activity_hash,
        status,
        transaction_hash,
        submitted_at,
        confirmed_at,
        retry_count,
        next_attempt_at
    FROM activity_log
"#;

#[derive(Debug, Clone)]
pub struct ActivityLogRow {
    pub id: String,
    pub organization_id: String,
    pub employee_id: String,
    pub task_id: String,
    pub event_type: String,
    pub activity_hash: String,
    pub status: String,
    pub transaction_hash: Option<String>,
    pub submitted_at: String,
    pub confirmed_at: Option<String>,
    pub retry_count: i64,
    // Poller scheduling state, not exposed on the audit record.
    pub next_attempt_at: String,
}

impl ActivityLogRow {
    pub fn into_record(self) -> AppResult<ActivityLogEntry> {
        Ok(ActivityLogEntry {
            id: self.id,
            organization_id: self.organization_id,
            employee_id: self.employee_id,
            task_id: self.task_id,
            event_type: self.event_type,
            activity_hash: self.activity_hash,
            status: AnchorStatus::parse(&self.status)?,
            transaction_hash: self.transaction_hash,
            submitted_at: self.submitted_at,
            confirmed_at: self.confirmed_at,
            retry_count: self.retry_count,
        })
    }
}

impl TryFrom<&Row<'_>> for ActivityLogRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(ActivityLogRow {
            id: row.get("id")?,
            organization_id: row.get("organization_id")?,
            employee_id: row.get("employee_id")?,
            task_id: row.get("task_id")?,
            event_type: row.get("event_type")?,
            activity_hash: row.get("activity_hash")?,
            status: row.get("status")?,
            transaction_hash: row.get("transaction_hash")?,
            submitted_at: row.get("submitted_at")?,
            confirmed_at: row.get("confirmed_at")?,
            retry_count: row.get("retry_count")?,
            next_attempt_at: row.get("next_attempt_at")?,
        })
    }
}

pub struct ActivityLogRepository;

impl ActivityLogRepository {
    /// Insert a fresh pending entry. The UNIQUE constraint on activity_hash
    /// makes concurrent check-then-insert races resolve to a Conflict error,
    /// which the service turns into an idempotent read of the existing row.
    pub fn insert_pending(conn: &Connection, row: &ActivityLogRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO activity_log (
                    id,
                    organization_id,
                    employee_id,
                    task_id,
                    event_type,
                    activity_hash,
                    status,
                    transaction_hash,
                    submitted_at,
                    confirmed_at,
                    retry_count,
                    next_attempt_at
                ) VALUES (
                    :id,
                    :organization_id,
                    :employee_id,
                    :task_id,
                    :event_type,
                    :activity_hash,
                    'pending',
                    NULL,
                    :submitted_at,
                    NULL,
                    0,
                    :next_attempt_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":organization_id": &row.organization_id,
                ":employee_id": &row.employee_id,
                ":task_id": &row.task_id,
                ":event_type": &row.event_type,
                ":activity_hash": &row.activity_hash,
                ":submitted_at": &row.submitted_at,
                ":next_attempt_at": &row.next_attempt_at,
            },
        )?;

        Ok(())
    }

    pub fn find_by_hash(conn: &Connection, activity_hash: &str) -> AppResult<Option<ActivityLogRow>> {
        let mut stmt = conn.prepare(&format!("{} WHERE activity_hash = ?1", BASE_SELECT))?;
        let row = stmt
            .query_row([activity_hash], |row| ActivityLogRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<ActivityLogRow>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", BASE_SELECT))?;
        let row = stmt
            .query_row([id], |row| ActivityLogRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    /// Pending entries whose backoff window has elapsed.
    pub fn list_due_pending(conn: &Connection, now: &str) -> AppResult<Vec<ActivityLogRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE status = 'pending' AND next_attempt_at <= ?1 ORDER BY next_attempt_at, id",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map([now], |row| ActivityLogRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Record the node-assigned transaction hash while the entry stays pending.
    pub fn record_submission(
        conn: &Connection,
        id: &str,
        transaction_hash: &str,
        next_attempt_at: &str,
    ) -> AppResult<bool> {
        let affected = conn.execute(
            r#"
                UPDATE activity_log SET
                    transaction_hash = :transaction_hash,
                    next_attempt_at = :next_attempt_at
                WHERE id = :id AND status = 'pending'
            "#,
            named_params! {
                ":id": id,
                ":transaction_hash": transaction_hash,
                ":next_attempt_at": next_attempt_at,
            },
        )?;
        Ok(affected > 0)
    }

    /// Single-statement transition so readers observe either the pre- or
    /// post-confirmation state, never a partial update. The status guard
    /// keeps transitions monotonic.
    pub fn mark_confirmed(
        conn: &Connection,
        id: &str,
        transaction_hash: &str,
        confirmed_at: &str,
    ) -> AppResult<bool> {
        let affected = conn.execute(
            r#"
                UPDATE activity_log SET
                    status = 'confirmed',
                    transaction_hash = :transaction_hash,
                    confirmed_at = :confirmed_at
                WHERE id = :id AND status = 'pending'
            "#,
            named_params! {
                ":id": id,
                ":transaction_hash": transaction_hash,
                ":confirmed_at": confirmed_at,
            },
        )?;
        Ok(affected > 0)
    }

    pub fn mark_failed(conn: &Connection, id: &str, retry_count: i64) -> AppResult<bool> {
        let affected = conn.execute(
            r#"
                UPDATE activity_log SET
                    status = 'failed',
                    retry_count = :retry_count
                WHERE id = :id AND status = 'pending'
            "#,
            named_params! {
                ":id": id,
                ":retry_count": retry_count,
            },
        )?;
        Ok(affected > 0)
    }

    pub fn record_attempt_failure(
        conn: &Connection,
        id: &str,
        retry_count: i64,
        next_attempt_at: &str,
    ) -> AppResult<bool> {
        let affected = conn.execute(
            r#"
                UPDATE activity_log SET
                    retry_count = :retry_count,
                    next_attempt_at = :next_attempt_at
                WHERE id = :id AND status = 'pending'
            "#,
            named_params! {
                ":id": id,
                ":retry_count": retry_count,
                ":next_attempt_at": next_attempt_at,
            },
        )?;
        Ok(affected > 0)
    }

    pub fn list_by_organization(
        conn: &Connection,
        organization_id: &str,
    ) -> AppResult<Vec<ActivityLogRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE organization_id = ?1 ORDER BY submitted_at DESC, id",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map([organization_id], |row| ActivityLogRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_by_employee(conn: &Connection, employee_id: &str) -> AppResult<Vec<ActivityLogRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE employee_id = ?1 ORDER BY submitted_at DESC, id",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map([employee_id], |row| ActivityLogRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
