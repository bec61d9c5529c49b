use serde::{Deserialize, Serialize};

use crate::models::score::PerformanceTrend;

/// One employee joined with their current snapshot, as surfaced by the
/// rankings and insights endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RankedEmployee {
    pub id: String,
    pub name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub productivity_score: i64,
    pub task_completion_rate: i64,
    pub on_time_rate: i64,
    pub performance_trend: PerformanceTrend,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrendBucket {
    pub performance_trend: PerformanceTrend,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationInsights {
    pub top_performers: Vec<RankedEmployee>,
    pub needs_attention: Vec<RankedEmployee>,
    pub trend_distribution: Vec<TrendBucket>,
}

/// Candidate assignee for a new task, ranked by current score and open load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssigneeSuggestion {
    pub id: String,
    pub name: String,
    pub department: Option<String>,
    pub recommendation_score: i64,
    pub open_tasks: i64,
}
