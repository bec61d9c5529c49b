use crate::models::activity::ActivityLogEntry;

use super::{AppState, CommandResult};

/// GET organization-chain-log
pub fn organization_chain_log_fetch(
    state: &AppState,
    organization_id: &str,
) -> CommandResult<Vec<ActivityLogEntry>> {
    Ok(state.audit().organization_log(organization_id)?)
}

/// GET user-chain-log/{id}
pub fn user_chain_log_fetch(
    state: &AppState,
    employee_id: &str,
) -> CommandResult<Vec<ActivityLogEntry>> {
    Ok(state.audit().user_log(employee_id)?)
}
