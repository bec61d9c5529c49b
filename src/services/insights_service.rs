use std::collections::HashMap;

use tracing::debug;

use crate::db::repositories::employee_repository::EmployeeRepository;
use crate::db::repositories::score_repository::ScoreRepository;
use crate::db::repositories::task_repository::TaskRepository;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::insights::{
    AssigneeSuggestion, OrganizationInsights, RankedEmployee, TrendBucket,
};
use crate::models::score::{PerformanceTrend, ScoreSnapshot};

const TOP_PERFORMER_LIMIT: usize = 3;

/// Employees scoring below this (or trending down) surface in the
/// needs-attention list. Top performers cannot fall below it by construction,
/// so the two lists stay disjoint in practice without deduplication.
const ATTENTION_SCORE_THRESHOLD: i64 = 40;

/// Trend buckets are always reported in this order, zero counts included.
const TREND_BUCKET_ORDER: [PerformanceTrend; 3] = [
    PerformanceTrend::Improving,
    PerformanceTrend::Stable,
    PerformanceTrend::Declining,
];

/// Read-side aggregation over current score snapshots.
///
/// Pure queries: nothing here triggers recomputation. Callers that need
/// freshness recompute first via the scoring engine.
pub struct InsightsService {
    db: DbPool,
}

impl InsightsService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn build_insights(&self, organization_id: &str) -> AppResult<OrganizationInsights> {
        let ranked = self.rank_employees(organization_id)?;

        let top_performers: Vec<RankedEmployee> =
            ranked.iter().take(TOP_PERFORMER_LIMIT).cloned().collect();

        let mut needs_attention: Vec<RankedEmployee> = ranked
            .iter()
            .filter(|employee| {
                employee.productivity_score < ATTENTION_SCORE_THRESHOLD
                    || employee.performance_trend == PerformanceTrend::Declining
            })
            .cloned()
            .collect();
        needs_attention.sort_by(|a, b| {
            a.productivity_score
                .cmp(&b.productivity_score)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut counts: HashMap<PerformanceTrend, i64> = HashMap::new();
        for employee in &ranked {
            *counts.entry(employee.performance_trend).or_insert(0) += 1;
        }
        let trend_distribution = TREND_BUCKET_ORDER
            .iter()
            .map(|trend| TrendBucket {
                performance_trend: *trend,
                count: counts.get(trend).copied().unwrap_or(0),
            })
            .collect();

        debug!(
            target: "app::scoring",
            organization_id,
            scored = ranked.len(),
            "organization insights built"
        );

        Ok(OrganizationInsights {
            top_performers,
            needs_attention,
            trend_distribution,
        })
    }

    /// All scored employees, best first. Deterministic: score descending,
    /// employee id ascending on ties.
    pub fn productivity_rankings(&self, organization_id: &str) -> AppResult<Vec<RankedEmployee>> {
        self.rank_employees(organization_id)
    }

    /// Candidate assignees for new work: active employees ranked by current
    /// score discounted by open-task load.
    pub fn suggest_assignees(
        &self,
        organization_id: &str,
        limit: usize,
    ) -> AppResult<Vec<AssigneeSuggestion>> {
        let conn = self.db.get_connection()?;

        let snapshots = snapshot_map(ScoreRepository::list_by_organization(
            &conn,
            organization_id,
        )?
        .into_iter()
        .map(|row| row.into_record())
        .collect::<AppResult<Vec<_>>>()?);

        let mut suggestions = Vec::new();
        for employee in EmployeeRepository::list_active_by_organization(&conn, organization_id)? {
            let open_tasks = TaskRepository::count_open_by_assignee(&conn, &employee.id)?;
            let base = snapshots
                .get(&employee.id)
                .map(|snapshot| snapshot.score)
                // Unscored employees start from the neutral midpoint so new
                // hires are still suggestable.
                .unwrap_or(50);
            let recommendation_score = (base - open_tasks * 10).clamp(0, 100);

            suggestions.push(AssigneeSuggestion {
                id: employee.id,
                name: employee.name,
                department: employee.department,
                recommendation_score,
                open_tasks,
            });
        }

        suggestions.sort_by(|a, b| {
            b.recommendation_score
                .cmp(&a.recommendation_score)
                .then_with(|| a.id.cmp(&b.id))
        });
        suggestions.truncate(limit);
        Ok(suggestions)
    }

    fn rank_employees(&self, organization_id: &str) -> AppResult<Vec<RankedEmployee>> {
        let conn = self.db.get_connection()?;

        let snapshots = snapshot_map(ScoreRepository::list_by_organization(
            &conn,
            organization_id,
        )?
        .into_iter()
        .map(|row| row.into_record())
        .collect::<AppResult<Vec<_>>>()?);

        let mut ranked = Vec::new();
        for employee in EmployeeRepository::list_by_organization(&conn, organization_id)? {
            let Some(snapshot) = snapshots.get(&employee.id) else {
                continue;
            };
            ranked.push(RankedEmployee {
                id: employee.id,
                name: employee.name,
                department: employee.department,
                position: employee.position,
                productivity_score: snapshot.score,
                task_completion_rate: snapshot.task_completion_rate,
                on_time_rate: snapshot.on_time_rate,
                performance_trend: snapshot.trend,
                recommendations: snapshot.recommendations.clone(),
            });
        }

        ranked.sort_by(|a, b| {
            b.productivity_score
                .cmp(&a.productivity_score)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(ranked)
    }
}

fn snapshot_map(snapshots: Vec<ScoreSnapshot>) -> HashMap<String, ScoreSnapshot> {
    snapshots
        .into_iter()
        .map(|snapshot| (snapshot.employee_id.clone(), snapshot))
        .collect()
}
