use tracing::debug;

use crate::db::repositories::activity_log_repository::ActivityLogRepository;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::activity::ActivityLogEntry;

/// Read-side projection over the anchored activity log.
///
/// Presents locally recorded completion events merged with their latest
/// known on-chain state, newest first with a deterministic id tie-break.
/// Never mutates anything: confirmation state belongs to the anchor
/// service's poller, whose transitions are single-statement updates, so a
/// concurrent reader sees either the pre- or post-confirmation entry.
pub struct AuditLogService {
    db: DbPool,
}

impl AuditLogService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn organization_log(&self, organization_id: &str) -> AppResult<Vec<ActivityLogEntry>> {
        let conn = self.db.get_connection()?;
        let entries = ActivityLogRepository::list_by_organization(&conn, organization_id)?
            .into_iter()
            .map(|row| row.into_record())
            .collect::<AppResult<Vec<_>>>()?;

        debug!(
            target: "app::audit",
            organization_id,
            entries = entries.len(),
            "organization chain log fetched"
        );

        Ok(entries)
    }

    pub fn user_log(&self, employee_id: &str) -> AppResult<Vec<ActivityLogEntry>> {
        let conn = self.db.get_connection()?;
        let entries = ActivityLogRepository::list_by_employee(&conn, employee_id)?
            .into_iter()
            .map(|row| row.into_record())
            .collect::<AppResult<Vec<_>>>()?;

        debug!(
            target: "app::audit",
            employee_id,
            entries = entries.len(),
            "user chain log fetched"
        );

        Ok(entries)
    }
}
