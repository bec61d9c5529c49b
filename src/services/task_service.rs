use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::repositories::task_repository::{TaskRepository, TaskRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::task::{
    BlockchainHint, TaskCreateInput, TaskListFilter, TaskRecord, TaskStatus,
    TaskStatusUpdateResult,
};
use crate::services::chain_anchor_service::ChainAnchorService;

/// Task lifecycle facade over the event store.
///
/// Owns status transitions and the anchoring hook: completing a task
/// enqueues an on-chain commitment, but the local update succeeds regardless
/// of chain availability.
pub struct TaskService {
    db: DbPool,
    chain: Arc<ChainAnchorService>,
}

impl TaskService {
    pub fn new(db: DbPool, chain: Arc<ChainAnchorService>) -> Self {
        Self { db, chain }
    }

    pub fn create_task(&self, input: TaskCreateInput) -> AppResult<TaskRecord> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(AppError::validation("任务标题不能为空"));
        }
        if input.assigned_to.trim().is_empty() {
            return Err(AppError::validation("任务必须指定负责人"));
        }

        let now = Utc::now().to_rfc3339();
        let record = TaskRecord {
            id: Uuid::new_v4().to_string(),
            organization_id: input.organization_id,
            title: title.to_string(),
            description: input
                .description
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            status: TaskStatus::Assigned,
            priority: input.priority.unwrap_or_default(),
            assigned_to: input.assigned_to,
            assigned_by: input.assigned_by,
            due_date: input.due_date,
            completed_at: None,
            created_at: now.clone(),
            updated_at: now,
        };

        let conn = self.db.get_connection()?;
        TaskRepository::insert(&conn, &TaskRow::from_record(&record))?;

        info!(
            target: "app::tasks",
            task_id = %record.id,
            assigned_to = %record.assigned_to,
            "task created"
        );

        Ok(record)
    }

    pub fn list_tasks(
        &self,
        organization_id: &str,
        filter: &TaskListFilter,
    ) -> AppResult<Vec<TaskRecord>> {
        let conn = self.db.get_connection()?;
        TaskRepository::list_by_organization(&conn, organization_id, filter)?
            .into_iter()
            .map(|row| row.into_record())
            .collect()
    }

    pub fn get_task(&self, task_id: &str) -> AppResult<TaskRecord> {
        let conn = self.db.get_connection()?;
        TaskRepository::find_by_id(&conn, task_id)?
            .ok_or(AppError::NotFound)?
            .into_record()
    }

    pub fn delete_task(&self, task_id: &str) -> AppResult<()> {
        let conn = self.db.get_connection()?;
        TaskRepository::delete(&conn, task_id)
    }

    /// Move a task through its lifecycle. Completion sets `completed_at` and
    /// enqueues the anchoring commitment; reopening clears `completed_at`
    /// (the anchored entry for the prior completion stays in the append-only
    /// log). The returned blockchain hint is informational only.
    pub fn update_status(
        &self,
        task_id: &str,
        new_status: TaskStatus,
    ) -> AppResult<TaskStatusUpdateResult> {
        let conn = self.db.get_connection()?;
        let mut task = TaskRepository::find_by_id(&conn, task_id)?
            .ok_or(AppError::NotFound)?
            .into_record()?;

        let now = Utc::now().to_rfc3339();
        let newly_completed =
            new_status == TaskStatus::Completed && task.status != TaskStatus::Completed;

        // completed_at is set iff the task is completed.
        task.completed_at = match new_status {
            TaskStatus::Completed => {
                Some(task.completed_at.clone().unwrap_or_else(|| now.clone()))
            }
            _ => None,
        };
        task.status = new_status;
        task.updated_at = now.clone();

        TaskRepository::update_status(
            &conn,
            task_id,
            task.status.as_str(),
            task.completed_at.as_deref(),
            &task.updated_at,
        )?;
        drop(conn);

        let mut blockchain = None;
        if newly_completed {
            if let Some(completed_at) = task.completed_at.as_deref() {
                match self
                    .chain
                    .submit_completion(task_id, &task.assigned_to, completed_at)
                {
                    Ok(entry) => {
                        blockchain = Some(BlockchainHint {
                            status: entry.status.as_str().to_string(),
                            activity_hash: entry.activity_hash,
                        });
                    }
                    // Anchoring is best-effort: the local completion already
                    // succeeded and must not be rolled back or fail the caller.
                    Err(err) => {
                        warn!(
                            target: "app::tasks",
                            task_id,
                            error = %err,
                            "completion anchoring enqueue failed"
                        );
                    }
                }
            }
        }

        info!(
            target: "app::tasks",
            task_id,
            status = task.status.as_str(),
            anchored = blockchain.is_some(),
            "task status updated"
        );

        Ok(TaskStatusUpdateResult { task, blockchain })
    }
}
