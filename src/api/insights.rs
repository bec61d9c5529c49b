use serde::Serialize;

use crate::models::insights::{AssigneeSuggestion, OrganizationInsights, RankedEmployee};
use crate::models::score::ScoreSnapshot;

use super::{AppState, CommandResult};

const SUGGESTION_LIMIT: usize = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculateSummary {
    pub message: String,
    pub employees_scored: usize,
}

/// GET insights
pub fn insights_fetch(
    state: &AppState,
    organization_id: &str,
) -> CommandResult<OrganizationInsights> {
    Ok(state.insights().build_insights(organization_id)?)
}

/// GET productivity-rankings
pub fn productivity_rankings_fetch(
    state: &AppState,
    organization_id: &str,
) -> CommandResult<Vec<RankedEmployee>> {
    Ok(state.insights().productivity_rankings(organization_id)?)
}

/// POST recalculate-scores
pub fn scores_recalculate(
    state: &AppState,
    organization_id: &str,
) -> CommandResult<RecalculateSummary> {
    let snapshots = state.scoring().recompute_all(organization_id)?;
    Ok(RecalculateSummary {
        message: format!(
            "Recalculated productivity scores for {} employees",
            snapshots.len()
        ),
        employees_scored: snapshots.len(),
    })
}

/// GET employee-score/{id} — computed on demand, so the result is never stale.
pub fn employee_score_fetch(state: &AppState, employee_id: &str) -> CommandResult<ScoreSnapshot> {
    Ok(state.scoring().compute_score(employee_id)?)
}

/// GET assignee suggestions for new-task forms.
pub fn assignee_suggestions_fetch(
    state: &AppState,
    organization_id: &str,
) -> CommandResult<Vec<AssigneeSuggestion>> {
    Ok(state
        .insights()
        .suggest_assignees(organization_id, SUGGESTION_LIMIT)?)
}
