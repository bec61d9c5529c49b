use tempfile::tempdir;

use teampulse_core::db::repositories::activity_log_repository::{
    ActivityLogRepository, ActivityLogRow,
};
use teampulse_core::db::DbPool;
use teampulse_core::models::activity::AnchorStatus;
use teampulse_core::services::audit_log_service::AuditLogService;

fn create_pool() -> (DbPool, tempfile::TempDir) {
    let dir = tempdir().expect("create temp dir");
    let db_path = dir.path().join("teampulse.sqlite");
    let pool = DbPool::new(db_path).expect("create db pool");
    (pool, dir)
}

fn insert_entry(
    pool: &DbPool,
    id: &str,
    organization_id: &str,
    employee_id: &str,
    submitted_at: &str,
) {
    let conn = pool.get_connection().expect("connection");
    ActivityLogRepository::insert_pending(
        &conn,
        &ActivityLogRow {
            id: id.to_string(),
            organization_id: organization_id.to_string(),
            employee_id: employee_id.to_string(),
            task_id: format!("task-for-{id}"),
            event_type: "task_completion".to_string(),
            activity_hash: format!("hash-{id}"),
            status: "pending".to_string(),
            transaction_hash: None,
            submitted_at: submitted_at.to_string(),
            confirmed_at: None,
            retry_count: 0,
            next_attempt_at: submitted_at.to_string(),
        },
    )
    .expect("insert entry");
}

#[test]
fn organization_log_is_newest_first() {
    let (pool, _dir) = create_pool();
    insert_entry(&pool, "e-old", "org-1", "emp-1", "2026-01-01T08:00:00+00:00");
    insert_entry(&pool, "e-new", "org-1", "emp-1", "2026-01-03T08:00:00+00:00");
    insert_entry(&pool, "e-mid", "org-1", "emp-2", "2026-01-02T08:00:00+00:00");
    insert_entry(&pool, "e-other", "org-2", "emp-9", "2026-01-04T08:00:00+00:00");

    let service = AuditLogService::new(pool);
    let log = service.organization_log("org-1").expect("organization log");

    let ids: Vec<&str> = log.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e-new", "e-mid", "e-old"]);
}

#[test]
fn equal_timestamps_break_ties_by_id() {
    let (pool, _dir) = create_pool();
    let at = "2026-01-05T12:00:00+00:00";
    insert_entry(&pool, "e-b", "org-1", "emp-1", at);
    insert_entry(&pool, "e-a", "org-1", "emp-1", at);
    insert_entry(&pool, "e-c", "org-1", "emp-1", at);

    let service = AuditLogService::new(pool);
    let log = service.organization_log("org-1").expect("organization log");

    let ids: Vec<&str> = log.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e-a", "e-b", "e-c"]);
}

#[test]
fn user_log_only_contains_that_employees_entries() {
    let (pool, _dir) = create_pool();
    insert_entry(&pool, "e-1", "org-1", "emp-1", "2026-01-01T08:00:00+00:00");
    insert_entry(&pool, "e-2", "org-1", "emp-2", "2026-01-02T08:00:00+00:00");
    insert_entry(&pool, "e-3", "org-1", "emp-1", "2026-01-03T08:00:00+00:00");

    let service = AuditLogService::new(pool);
    let log = service.user_log("emp-1").expect("user log");

    let ids: Vec<&str> = log.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e-3", "e-1"]);
    assert!(log.iter().all(|e| e.employee_id == "emp-1"));
}

#[test]
fn log_exposes_every_anchor_state() {
    let (pool, _dir) = create_pool();
    insert_entry(&pool, "e-pending", "org-1", "emp-1", "2026-01-01T08:00:00+00:00");
    insert_entry(&pool, "e-confirmed", "org-1", "emp-1", "2026-01-02T08:00:00+00:00");
    insert_entry(&pool, "e-failed", "org-1", "emp-1", "2026-01-03T08:00:00+00:00");

    {
        let conn = pool.get_connection().expect("connection");
        assert!(ActivityLogRepository::mark_confirmed(
            &conn,
            "e-confirmed",
            "0xfinal",
            "2026-01-02T09:00:00+00:00",
        )
        .expect("mark confirmed"));
        assert!(ActivityLogRepository::mark_failed(&conn, "e-failed", 8).expect("mark failed"));
    }

    let service = AuditLogService::new(pool);
    let log = service.organization_log("org-1").expect("organization log");

    assert_eq!(log.len(), 3);
    assert_eq!(log[0].status, AnchorStatus::Failed);
    assert_eq!(log[0].retry_count, 8);
    assert_eq!(log[1].status, AnchorStatus::Confirmed);
    assert_eq!(log[1].transaction_hash.as_deref(), Some("0xfinal"));
    assert_eq!(log[1].confirmed_at.as_deref(), Some("2026-01-02T09:00:00+00:00"));
    assert_eq!(log[2].status, AnchorStatus::Pending);
    assert!(log[2].transaction_hash.is_none());
}

#[test]
fn empty_logs_are_just_empty() {
    let (pool, _dir) = create_pool();
    let service = AuditLogService::new(pool);

    assert!(service.organization_log("org-none").expect("org log").is_empty());
    assert!(service.user_log("emp-none").expect("user log").is_empty());
}
