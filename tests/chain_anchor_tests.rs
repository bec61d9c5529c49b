use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use httpmock::prelude::*;
use serde_json::json;
use tempfile::tempdir;

use teampulse_core::db::repositories::activity_log_repository::{
    ActivityLogRepository, ActivityLogRow,
};
use teampulse_core::db::repositories::employee_repository::{EmployeeRepository, EmployeeRow};
use teampulse_core::db::repositories::task_repository::{TaskRepository, TaskRow};
use teampulse_core::db::DbPool;
use teampulse_core::error::AppError;
use teampulse_core::models::activity::AnchorStatus;
use teampulse_core::models::task::TaskStatus;
use teampulse_core::services::chain_anchor_service::{ChainAnchorService, ChainConfig};
use teampulse_core::services::task_service::TaskService;

fn create_pool() -> (DbPool, tempfile::TempDir) {
    let dir = tempdir().expect("create temp dir");
    let db_path = dir.path().join("teampulse.sqlite");
    let pool = DbPool::new(db_path).expect("create db pool");
    (pool, dir)
}

/// Immediate retries, small budget, pointed at the mock node.
fn test_config(endpoint: String, max_attempts: i64) -> ChainConfig {
    ChainConfig {
        endpoint,
        poll_interval: Duration::from_secs(3600),
        attempt_timeout: Duration::from_secs(2),
        max_attempts,
        backoff_base: Duration::from_millis(0),
    }
}

fn seed_task(pool: &DbPool, task_id: &str, employee_id: &str) {
    let conn = pool.get_connection().expect("connection");
    let now = Utc::now().to_rfc3339();
    EmployeeRepository::insert(
        &conn,
        &EmployeeRow {
            id: employee_id.to_string(),
            organization_id: "org-1".to_string(),
            name: format!("Employee {employee_id}"),
            department: None,
            position: None,
            role: "employee".to_string(),
            is_active: true,
            created_at: now.clone(),
        },
    )
    .expect("insert employee");
    TaskRepository::insert(
        &conn,
        &TaskRow {
            id: task_id.to_string(),
            organization_id: "org-1".to_string(),
            title: "ship release".to_string(),
            description: None,
            status: "in_progress".to_string(),
            priority: "high".to_string(),
            assigned_to: employee_id.to_string(),
            assigned_by: "admin-1".to_string(),
            due_date: None,
            completed_at: None,
            created_at: now.clone(),
            updated_at: now,
        },
    )
    .expect("insert task");
}

fn entry_status(pool: &DbPool, entry_id: &str) -> (String, Option<String>, i64) {
    let conn = pool.get_connection().expect("connection");
    let row = ActivityLogRepository::find_by_id(&conn, entry_id)
        .expect("query entry")
        .expect("entry exists");
    (row.status, row.transaction_hash, row.retry_count)
}

#[tokio::test]
async fn submitting_the_same_completion_twice_returns_one_entry() {
    let (pool, _dir) = create_pool();
    seed_task(&pool, "task-1", "emp-1");

    let service = ChainAnchorService::with_http_rpc(
        pool.clone(),
        test_config("http://127.0.0.1:9".to_string(), 3),
    )
    .expect("service");

    let completed_at = "2026-02-01T10:00:00+00:00";
    let first = service
        .submit_completion("task-1", "emp-1", completed_at)
        .expect("first submit");
    let second = service
        .submit_completion("task-1", "emp-1", completed_at)
        .expect("second submit");

    assert_eq!(first.id, second.id);
    assert_eq!(first.activity_hash, second.activity_hash);
    assert_eq!(second.status, AnchorStatus::Pending);

    let conn = pool.get_connection().expect("connection");
    let entries = ActivityLogRepository::list_by_organization(&conn, "org-1").expect("list");
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn submit_then_confirm_happy_path() {
    let server = MockServer::start_async().await;
    let submit_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/commitments");
            then.status(200)
                .json_body(json!({ "transactionHash": "0xabc123" }));
        })
        .await;
    let receipt_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/transactions/0xabc123");
            then.status(200)
                .json_body(json!({ "status": "confirmed", "blockNumber": 4242 }));
        })
        .await;

    let (pool, _dir) = create_pool();
    seed_task(&pool, "task-1", "emp-1");

    let service = ChainAnchorService::with_http_rpc(pool.clone(), test_config(server.base_url(), 5))
        .expect("service");
    let entry = service
        .submit_completion("task-1", "emp-1", "2026-02-01T10:00:00+00:00")
        .expect("submit");
    assert_eq!(entry.status, AnchorStatus::Pending);
    assert!(entry.transaction_hash.is_none());

    // First pass submits the commitment, second pass reads the receipt.
    assert_eq!(service.poll_pending_once().await.expect("pass 1"), 1);
    let (status, tx, _) = entry_status(&pool, &entry.id);
    assert_eq!(status, "pending");
    assert_eq!(tx.as_deref(), Some("0xabc123"));

    assert_eq!(service.poll_pending_once().await.expect("pass 2"), 1);
    let conn = pool.get_connection().expect("connection");
    let row = ActivityLogRepository::find_by_id(&conn, &entry.id)
        .expect("query")
        .expect("entry");
    assert_eq!(row.status, "confirmed");
    assert_eq!(row.transaction_hash.as_deref(), Some("0xabc123"));
    assert!(row.confirmed_at.is_some());

    submit_mock.assert_async().await;
    receipt_mock.assert_async().await;

    // Confirmed entries drop out of the poller's view.
    assert_eq!(service.poll_pending_once().await.expect("pass 3"), 0);
}

#[tokio::test]
async fn completion_survives_node_outage_and_recovers() {
    let server = MockServer::start_async().await;
    let outage_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/commitments");
            then.status(500);
        })
        .await;

    let (pool, _dir) = create_pool();
    seed_task(&pool, "task-1", "emp-1");

    let chain = Arc::new(
        ChainAnchorService::with_http_rpc(pool.clone(), test_config(server.base_url(), 10))
            .expect("service"),
    );
    let tasks = TaskService::new(pool.clone(), Arc::clone(&chain));

    // The local completion succeeds while the node is down.
    let result = tasks
        .update_status("task-1", TaskStatus::Completed)
        .expect("update status");
    assert_eq!(result.task.status, TaskStatus::Completed);
    assert!(result.task.completed_at.is_some());
    let hint = result.blockchain.expect("blockchain hint");
    assert_eq!(hint.status, "pending");

    let conn = pool.get_connection().expect("connection");
    let entry_id = ActivityLogRepository::list_by_organization(&conn, "org-1")
        .expect("list")[0]
        .id
        .clone();
    drop(conn);

    // Two failing passes burn retries without losing the entry.
    chain.poll_pending_once().await.expect("pass 1");
    chain.poll_pending_once().await.expect("pass 2");
    let (status, tx, retries) = entry_status(&pool, &entry_id);
    assert_eq!(status, "pending");
    assert!(tx.is_none());
    assert_eq!(retries, 2);

    // Node comes back: the entry confirms without any duplicate submission.
    outage_mock.delete_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/commitments");
            then.status(200)
                .json_body(json!({ "transactionHash": "0xrecovered" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/transactions/0xrecovered");
            then.status(200).json_body(json!({ "status": "confirmed" }));
        })
        .await;

    chain.poll_pending_once().await.expect("submit pass");
    chain.poll_pending_once().await.expect("confirm pass");

    let (status, tx, _) = entry_status(&pool, &entry_id);
    assert_eq!(status, "confirmed");
    assert_eq!(tx.as_deref(), Some("0xrecovered"));

    let conn = pool.get_connection().expect("connection");
    let entries = ActivityLogRepository::list_by_organization(&conn, "org-1").expect("list");
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn unconfirmed_receipt_spends_a_retry() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/commitments");
            then.status(200)
                .json_body(json!({ "transactionHash": "0xslow" }));
        })
        .await;
    // The node has not mined the transaction yet.
    server
        .mock_async(|when, then| {
            when.method(GET).path("/transactions/0xslow");
            then.status(404);
        })
        .await;

    let (pool, _dir) = create_pool();
    seed_task(&pool, "task-1", "emp-1");

    let service = ChainAnchorService::with_http_rpc(pool.clone(), test_config(server.base_url(), 10))
        .expect("service");
    let entry = service
        .submit_completion("task-1", "emp-1", "2026-02-01T10:00:00+00:00")
        .expect("submit");

    service.poll_pending_once().await.expect("submit pass");
    service.poll_pending_once().await.expect("receipt pass");

    let (status, tx, retries) = entry_status(&pool, &entry.id);
    assert_eq!(status, "pending");
    assert_eq!(tx.as_deref(), Some("0xslow"));
    assert_eq!(retries, 1);
}

#[tokio::test]
async fn retry_budget_exhaustion_marks_the_entry_failed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/commitments");
            then.status(503);
        })
        .await;

    let (pool, _dir) = create_pool();
    seed_task(&pool, "task-1", "emp-1");

    let service = ChainAnchorService::with_http_rpc(pool.clone(), test_config(server.base_url(), 2))
        .expect("service");
    let entry = service
        .submit_completion("task-1", "emp-1", "2026-02-01T10:00:00+00:00")
        .expect("submit");

    service.poll_pending_once().await.expect("pass 1");
    let (status, _, retries) = entry_status(&pool, &entry.id);
    assert_eq!(status, "pending");
    assert_eq!(retries, 1);

    service.poll_pending_once().await.expect("pass 2");
    let (status, _, retries) = entry_status(&pool, &entry.id);
    assert_eq!(status, "failed");
    assert_eq!(retries, 2);

    // Failed is terminal: nothing left for the poller.
    assert_eq!(service.poll_pending_once().await.expect("pass 3"), 0);
}

#[tokio::test]
async fn rejected_submission_fails_without_retrying() {
    let server = MockServer::start_async().await;
    let reject_mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/commitments");
            then.status(422);
        })
        .await;

    let (pool, _dir) = create_pool();
    seed_task(&pool, "task-1", "emp-1");

    let service = ChainAnchorService::with_http_rpc(pool.clone(), test_config(server.base_url(), 10))
        .expect("service");
    let entry = service
        .submit_completion("task-1", "emp-1", "2026-02-01T10:00:00+00:00")
        .expect("submit");

    service.poll_pending_once().await.expect("pass");

    let (status, _, retries) = entry_status(&pool, &entry.id);
    assert_eq!(status, "failed");
    assert_eq!(retries, 1);
    assert_eq!(reject_mock.hits_async().await, 1);
}

#[tokio::test]
async fn confirmed_entries_never_revert() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/commitments");
            then.status(200)
                .json_body(json!({ "transactionHash": "0xdone" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/transactions/0xdone");
            then.status(200).json_body(json!({ "status": "confirmed" }));
        })
        .await;

    let (pool, _dir) = create_pool();
    seed_task(&pool, "task-1", "emp-1");

    let service = ChainAnchorService::with_http_rpc(pool.clone(), test_config(server.base_url(), 5))
        .expect("service");
    let entry = service
        .submit_completion("task-1", "emp-1", "2026-02-01T10:00:00+00:00")
        .expect("submit");

    service.poll_pending_once().await.expect("submit pass");
    service.poll_pending_once().await.expect("confirm pass");
    let (status, _, _) = entry_status(&pool, &entry.id);
    assert_eq!(status, "confirmed");

    // Late transition attempts bounce off the status guard.
    let conn = pool.get_connection().expect("connection");
    assert!(!ActivityLogRepository::mark_failed(&conn, &entry.id, 99).expect("mark failed"));
    assert!(!ActivityLogRepository::record_attempt_failure(
        &conn,
        &entry.id,
        99,
        &Utc::now().to_rfc3339(),
    )
    .expect("record attempt"));
    let (status, _, retries) = entry_status(&pool, &entry.id);
    assert_eq!(status, "confirmed");
    assert_ne!(retries, 99);
}

#[tokio::test]
async fn unknown_task_is_a_validation_error() {
    let (pool, _dir) = create_pool();
    let service = ChainAnchorService::with_http_rpc(
        pool,
        test_config("http://127.0.0.1:9".to_string(), 3),
    )
    .expect("service");

    let err = service
        .submit_completion("missing-task", "emp-1", "2026-02-01T10:00:00+00:00")
        .expect_err("should fail");
    assert!(matches!(err, AppError::Validation { .. }));
}

#[test]
fn concurrent_inserts_of_one_hash_resolve_to_a_single_row() {
    let (pool, _dir) = create_pool();
    let conn = pool.get_connection().expect("connection");

    let now = Utc::now().to_rfc3339();
    let row = ActivityLogRow {
        id: "entry-1".to_string(),
        organization_id: "org-1".to_string(),
        employee_id: "emp-1".to_string(),
        task_id: "task-1".to_string(),
        event_type: "task_completion".to_string(),
        activity_hash: "hash-contended".to_string(),
        status: "pending".to_string(),
        transaction_hash: None,
        submitted_at: now.clone(),
        confirmed_at: None,
        retry_count: 0,
        next_attempt_at: now,
    };
    ActivityLogRepository::insert_pending(&conn, &row).expect("first insert");

    // The loser of a check-then-insert race hits the UNIQUE constraint.
    let mut loser = row.clone();
    loser.id = "entry-2".to_string();
    let err = ActivityLogRepository::insert_pending(&conn, &loser).expect_err("duplicate hash");
    assert!(matches!(err, AppError::Conflict { .. }));

    // Exactly one row exists, and the hash resolves to the winner.
    let existing = ActivityLogRepository::find_by_hash(&conn, "hash-contended")
        .expect("lookup")
        .expect("winner row");
    assert_eq!(existing.id, "entry-1");
    let entries = ActivityLogRepository::list_by_organization(&conn, "org-1").expect("list");
    assert_eq!(entries.len(), 1);
}
