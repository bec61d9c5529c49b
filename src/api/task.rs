use crate::models::task::{
    TaskCreateInput, TaskListFilter, TaskRecord, TaskStatus, TaskStatusUpdateResult,
};

use super::{AppState, CommandResult};

pub fn tasks_create(state: &AppState, input: TaskCreateInput) -> CommandResult<TaskRecord> {
    Ok(state.tasks().create_task(input)?)
}

pub fn tasks_list(
    state: &AppState,
    organization_id: &str,
    filter: Option<TaskListFilter>,
) -> CommandResult<Vec<TaskRecord>> {
    let filter = filter.unwrap_or_default();
    Ok(state.tasks().list_tasks(organization_id, &filter)?)
}

/// Status updates own the anchoring hook: completing a task reports a
/// `blockchain: { status: "pending" }` hint while the commitment confirms in
/// the background.
pub fn tasks_update_status(
    state: &AppState,
    task_id: &str,
    status: TaskStatus,
) -> CommandResult<TaskStatusUpdateResult> {
    Ok(state.tasks().update_status(task_id, status)?)
}

pub fn tasks_delete(state: &AppState, task_id: &str) -> CommandResult<()> {
    Ok(state.tasks().delete_task(task_id)?)
}
