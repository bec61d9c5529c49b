use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::AppResult;
use crate::models::score::{PerformanceTrend, ScoreSnapshot};

const BASE_SELECT: &str = r#"
    SELECT
        employee_id,
        organization_id,
        score,
        task_completion_rate,
        on_time_rate,
        previous_score,
        trend,
        recommendations,
        computed_at
    FROM score_snapshots
"#;

#[derive(Debug, Clone)]
pub struct ScoreSnapshotRow {
    pub employee_id: String,
    pub organization_id: String,
    pub score: i64,
    pub task_completion_rate: i64,
    pub on_time_rate: i64,
    pub previous_score: Option<i64>,
    pub trend: String,
    pub recommendations: Option<String>,
    pub computed_at: String,
}

impl ScoreSnapshotRow {
    pub fn from_record(record: &ScoreSnapshot) -> AppResult<Self> {
        Ok(Self {
            employee_id: record.employee_id.clone(),
            organization_id: record.organization_id.clone(),
            score: record.score,
            task_completion_rate: record.task_completion_rate,
            on_time_rate: record.on_time_rate,
            previous_score: record.previous_score,
            trend: record.trend.as_str().to_string(),
            recommendations: serialize_vec(&record.recommendations)?,
            computed_at: record.computed_at.clone(),
        })
    }

    pub fn into_record(self) -> AppResult<ScoreSnapshot> {
        Ok(ScoreSnapshot {
            employee_id: self.employee_id,
            organization_id: self.organization_id,
            score: self.score,
            task_completion_rate: self.task_completion_rate,
            on_time_rate: self.on_time_rate,
            previous_score: self.previous_score,
            trend: PerformanceTrend::parse(&self.trend)?,
            recommendations: deserialize_vec(self.recommendations)?,
            computed_at: self.computed_at,
        })
    }
}

impl TryFrom<&Row<'_>> for ScoreSnapshotRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(ScoreSnapshotRow {
            employee_id: row.get("employee_id")?,
            organization_id: row.get("organization_id")?,
            score: row.get("score")?,
            task_completion_rate: row.get("task_completion_rate")?,
            on_time_rate: row.get("on_time_rate")?,
            previous_score: row.get("previous_score")?,
            trend: row.get("trend")?,
            recommendations: row.get("recommendations")?,
            computed_at: row.get("computed_at")?,
        })
    }
}

pub struct ScoreRepository;

impl ScoreRepository {
    /// Supersede the employee's snapshot. One row per employee: the prior
    /// snapshot is only needed to derive the trend, which the caller has
    /// already folded into `previous_score`.
    pub fn upsert(conn: &Connection, row: &ScoreSnapshotRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO score_snapshots (
                    employee_id,
                    organization_id,
                    score,
                    task_completion_rate,
                    on_time_rate,
                    previous_score,
                    trend,
                    recommendations,
                    computed_at
                ) VALUES (
                    :employee_id,
                    :organization_id,
                    :score,
                    :task_completion_rate,
                    :on_time_rate,
                    :previous_score,
                    :trend,
                    :recommendations,
                    :computed_at
                )
                ON CONFLICT(employee_id) DO UPDATE SET
                    organization_id = excluded.organization_id,
                    score = excluded.score,
                    task_completion_rate = excluded.task_completion_rate,
                    on_time_rate = excluded.on_time_rate,
                    previous_score = excluded.previous_score,
                    trend = excluded.trend,
                    recommendations = excluded.recommendations,
                    computed_at = excluded.computed_at
            "#,
            named_params! {
                ":employee_id": &row.employee_id,
                ":organization_id": &row.organization_id,
                ":score": &row.score,
                ":task_completion_rate": &row.task_completion_rate,
                ":on_time_rate": &row.on_time_rate,
                ":previous_score": &row.previous_score,
                ":trend": &row.trend,
                ":recommendations": &row.recommendations,
                ":computed_at": &row.computed_at,
            },
        )?;

        Ok(())
    }

    pub fn find_by_employee(
        conn: &Connection,
        employee_id: &str,
    ) -> AppResult<Option<ScoreSnapshotRow>> {
        let mut stmt = conn.prepare(&format!("{} WHERE employee_id = ?1", BASE_SELECT))?;
        let row = stmt
            .query_row([employee_id], |row| ScoreSnapshotRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list_by_organization(
        conn: &Connection,
        organization_id: &str,
    ) -> AppResult<Vec<ScoreSnapshotRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE organization_id = ?1 ORDER BY employee_id",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map([organization_id], |row| ScoreSnapshotRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn serialize_vec(values: &[String]) -> AppResult<Option<String>> {
    if values.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(values)?))
    }
}

fn deserialize_vec(raw: Option<String>) -> AppResult<Vec<String>> {
    match raw {
        Some(value) if !value.is_empty() => Ok(serde_json::from_str(&value)?),
        _ => Ok(Vec::new()),
    }
}
