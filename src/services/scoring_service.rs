use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::db::repositories::employee_repository::EmployeeRepository;
use crate::db::repositories::score_repository::{ScoreRepository, ScoreSnapshotRow};
use crate::db::repositories::task_repository::TaskRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::score::{PerformanceTrend, ScoreSnapshot};
use crate::models::task::{TaskRecord, TaskStatus};

/// Fixed score weighting: the composite is an even blend of how much of the
/// assigned work gets finished and how much of it finishes on time.
const WEIGHT_COMPLETION: f64 = 0.5;
const WEIGHT_ON_TIME: f64 = 0.5;

/// Score delta (in points) separating a trend change from noise.
const TREND_DELTA: i64 = 5;

const MAX_RECOMMENDATIONS: usize = 3;

/// Metrics a recommendation rule can inspect.
#[derive(Debug, Clone, Copy)]
pub struct ScoreMetrics {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub overdue_open_tasks: i64,
    pub task_completion_rate: i64,
    pub on_time_rate: i64,
}

struct RecommendationRule {
    applies: fn(&ScoreMetrics) -> bool,
    message: &'static str,
}

/// Ordered rule table. Evaluated top to bottom; the first
/// `MAX_RECOMMENDATIONS` matches are kept, so recommendation order is
/// reproducible across recomputes.
const RECOMMENDATION_RULES: &[RecommendationRule] = &[
    RecommendationRule {
        applies: |m| m.total_tasks == 0,
        message: "No tasks assigned yet - productivity data will appear once work is assigned",
    },
    RecommendationRule {
        applies: |m| m.total_tasks > 0 && m.task_completion_rate < 50,
        message: "Reduce concurrent task load and close out in-progress work",
    },
    RecommendationRule {
        applies: |m| m.completed_tasks > 0 && m.on_time_rate < 60,
        message: "Review deadline estimation - most completed tasks finish late",
    },
    RecommendationRule {
        applies: |m| m.overdue_open_tasks > 0,
        message: "Clear overdue tasks before taking on new assignments",
    },
    RecommendationRule {
        applies: |m| m.task_completion_rate >= 90 && m.on_time_rate >= 90,
        message: "Strong delivery record - consider mentoring teammates",
    },
];

/// One in-flight organization-wide recompute. Joiners wait on the condvar
/// and share the leader's result instead of starting a duplicate pass.
struct RecomputeFlight {
    result: Mutex<Option<Result<Vec<ScoreSnapshot>, String>>>,
    done: Condvar,
}

/// Rule-based productivity scoring engine.
///
/// Computes deterministic, explainable per-employee scores from task history.
/// Snapshots are superseded on recompute; the trend reference only advances
/// when the score changes, so recomputing over unchanged history is
/// idempotent apart from `computed_at`.
pub struct ScoringService {
    db: DbPool,
    flights: Mutex<HashMap<String, Arc<RecomputeFlight>>>,
    recompute_passes: AtomicU64,
}

impl ScoringService {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            flights: Mutex::new(HashMap::new()),
            recompute_passes: AtomicU64::new(0),
        }
    }

    /// Compute (and persist) the employee's current snapshot from their full
    /// task history. Never fails for a known employee: no tasks yields the
    /// neutral zero snapshot.
    pub fn compute_score(&self, employee_id: &str) -> AppResult<ScoreSnapshot> {
        let conn = self.db.get_connection()?;

        let employee = EmployeeRepository::find_by_id(&conn, employee_id)?
            .ok_or_else(|| AppError::validation(format!("员工不存在: {employee_id}")))?;

        let tasks = TaskRepository::list_by_assignee(&conn, employee_id)?
            .into_iter()
            .map(|row| row.into_record())
            .collect::<AppResult<Vec<_>>>()?;

        let previous = ScoreRepository::find_by_employee(&conn, employee_id)?
            .map(|row| row.into_record())
            .transpose()?;

        let snapshot = build_snapshot(
            employee_id,
            &employee.organization_id,
            &tasks,
            previous.as_ref(),
            Utc::now(),
        );

        ScoreRepository::upsert(&conn, &ScoreSnapshotRow::from_record(&snapshot)?)?;

        debug!(
            target: "app::scoring",
            employee_id,
            score = snapshot.score,
            trend = snapshot.trend.as_str(),
            "score snapshot computed"
        );

        Ok(snapshot)
    }

    /// Recompute every active employee of the organization.
    ///
    /// Single-flight per organization: callers arriving while a pass is in
    /// flight wait for it and receive its result; independent organizations
    /// recompute concurrently without coordination.
    pub fn recompute_all(&self, organization_id: &str) -> AppResult<Vec<ScoreSnapshot>> {
        let (flight, is_leader) = {
            let mut flights = self.flights.lock().expect("flight map lock poisoned");
            match flights.get(organization_id) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let flight = Arc::new(RecomputeFlight {
                        result: Mutex::new(None),
                        done: Condvar::new(),
                    });
                    flights.insert(organization_id.to_string(), Arc::clone(&flight));
                    (flight, true)
                }
            }
        };

        if !is_leader {
            let mut guard = flight.result.lock().expect("flight lock poisoned");
            while guard.is_none() {
                guard = flight.done.wait(guard).expect("flight lock poisoned");
            }
            return match guard.as_ref().expect("flight result set") {
                Ok(snapshots) => Ok(snapshots.clone()),
                Err(message) => Err(AppError::other(message.clone())),
            };
        }

        let outcome = self.recompute_pass(organization_id);

        // Remove the flight before publishing so late callers start a fresh
        // pass instead of consuming a stale result.
        {
            let mut flights = self.flights.lock().expect("flight map lock poisoned");
            flights.remove(organization_id);
        }

        let shared = match &outcome {
            Ok(snapshots) => Ok(snapshots.clone()),
            Err(err) => Err(err.to_string()),
        };
        {
            let mut guard = flight.result.lock().expect("flight lock poisoned");
            *guard = Some(shared);
        }
        flight.done.notify_all();

        outcome
    }

    fn recompute_pass(&self, organization_id: &str) -> AppResult<Vec<ScoreSnapshot>> {
        self.recompute_passes.fetch_add(1, Ordering::SeqCst);

        let conn = self.db.get_connection()?;
        let employees = EmployeeRepository::list_active_by_organization(&conn, organization_id)?;

        let now = Utc::now();
        let mut snapshots = Vec::with_capacity(employees.len());
        for employee in employees {
            let tasks = TaskRepository::list_by_assignee(&conn, &employee.id)?
                .into_iter()
                .map(|row| row.into_record())
                .collect::<AppResult<Vec<_>>>()?;

            let previous = ScoreRepository::find_by_employee(&conn, &employee.id)?
                .map(|row| row.into_record())
                .transpose()?;

            let snapshot = build_snapshot(
                &employee.id,
                organization_id,
                &tasks,
                previous.as_ref(),
                now,
            );
            ScoreRepository::upsert(&conn, &ScoreSnapshotRow::from_record(&snapshot)?)?;
            snapshots.push(snapshot);
        }

        info!(
            target: "app::scoring",
            organization_id,
            employees = snapshots.len(),
            "organization scores recomputed"
        );

        Ok(snapshots)
    }

    /// Number of underlying recompute passes that actually ran. Collapsed
    /// concurrent callers do not increment it.
    pub fn recompute_pass_count(&self) -> u64 {
        self.recompute_passes.load(Ordering::SeqCst)
    }
}

fn build_snapshot(
    employee_id: &str,
    organization_id: &str,
    tasks: &[TaskRecord],
    previous: Option<&ScoreSnapshot>,
    now: DateTime<Utc>,
) -> ScoreSnapshot {
    let metrics = compute_metrics(tasks, now);
    let score = compute_composite(&metrics);

    // The trend reference only moves when the score moves, so a recompute
    // over unchanged history reproduces the same trend.
    let reference = match previous {
        None => None,
        Some(prev) if prev.score == score => prev.previous_score,
        Some(prev) => Some(prev.score),
    };
    let trend = trend_for(reference, score);

    ScoreSnapshot {
        employee_id: employee_id.to_string(),
        organization_id: organization_id.to_string(),
        score,
        task_completion_rate: metrics.task_completion_rate,
        on_time_rate: metrics.on_time_rate,
        previous_score: reference,
        trend,
        recommendations: evaluate_rules(&metrics),
        computed_at: now.to_rfc3339(),
    }
}

fn compute_metrics(tasks: &[TaskRecord], now: DateTime<Utc>) -> ScoreMetrics {
    let total_tasks = tasks.len() as i64;
    let completed: Vec<&TaskRecord> = tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Completed)
        .collect();
    let completed_tasks = completed.len() as i64;
    let overdue_open_tasks = tasks.iter().filter(|task| task.is_overdue(now)).count() as i64;

    let on_time = completed
        .iter()
        .filter(|task| completed_on_time(task))
        .count() as i64;

    // Integer floor division keeps rates whole and deterministic
    // (4 on-time of 6 completed reads as 66, not 67).
    let task_completion_rate = if total_tasks > 0 {
        completed_tasks * 100 / total_tasks
    } else {
        0
    };
    let on_time_rate = if completed_tasks > 0 {
        on_time * 100 / completed_tasks
    } else {
        0
    };

    ScoreMetrics {
        total_tasks,
        completed_tasks,
        overdue_open_tasks,
        task_completion_rate,
        on_time_rate,
    }
}

fn completed_on_time(task: &TaskRecord) -> bool {
    let due = match task.due_date.as_deref().map(DateTime::parse_from_rfc3339) {
        Some(Ok(due)) => due.with_timezone(&Utc),
        // No due date (or an unparseable one) counts as on time.
        _ => return true,
    };
    match task.completed_at.as_deref().map(DateTime::parse_from_rfc3339) {
        Some(Ok(completed)) => completed.with_timezone(&Utc) <= due,
        _ => true,
    }
}

fn compute_composite(metrics: &ScoreMetrics) -> i64 {
    let weighted = WEIGHT_COMPLETION * metrics.task_completion_rate as f64
        + WEIGHT_ON_TIME * metrics.on_time_rate as f64;
    (weighted.round() as i64).clamp(0, 100)
}

fn trend_for(previous_score: Option<i64>, score: i64) -> PerformanceTrend {
    match previous_score {
        None => PerformanceTrend::Stable,
        Some(previous) => {
            let delta = score - previous;
            if delta >= TREND_DELTA {
                PerformanceTrend::Improving
            } else if delta <= -TREND_DELTA {
                PerformanceTrend::Declining
            } else {
                PerformanceTrend::Stable
            }
        }
    }
}

fn evaluate_rules(metrics: &ScoreMetrics) -> Vec<String> {
    RECOMMENDATION_RULES
        .iter()
        .filter(|rule| (rule.applies)(metrics))
        .take(MAX_RECOMMENDATIONS)
        .map(|rule| rule.message.to_string())
        .collect()
}
