use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTrend {
    Improving,
    Declining,
    Stable,
}

impl PerformanceTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceTrend::Improving => "improving",
            PerformanceTrend::Declining => "declining",
            PerformanceTrend::Stable => "stable",
        }
    }

    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw {
            "improving" => Ok(PerformanceTrend::Improving),
            "declining" => Ok(PerformanceTrend::Declining),
            "stable" => Ok(PerformanceTrend::Stable),
            other => Err(AppError::validation(format!("未知的趋势分类: {other}"))),
        }
    }
}

impl Default for PerformanceTrend {
    fn default() -> Self {
        PerformanceTrend::Stable
    }
}

/// One employee's current productivity snapshot.
///
/// Snapshots are superseded on recompute, never mutated in place;
/// `previous_score` is the reference the trend was derived from and only
/// advances when the score itself changes, so recomputing over unchanged
/// task history reproduces the same snapshot (modulo `computed_at`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSnapshot {
    pub employee_id: String,
    pub organization_id: String,
    pub score: i64,
    pub task_completion_rate: i64,
    pub on_time_rate: i64,
    pub previous_score: Option<i64>,
    pub trend: PerformanceTrend,
    pub recommendations: Vec<String>,
    pub computed_at: String,
}
