use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::task::{TaskListFilter, TaskPriority, TaskRecord, TaskStatus};

const BASE_SELECT: &str = r#"
    SELECT
        id,
        organization_id,
        title,
        description,
        status,
        priority,
        assigned_to,
        assigned_by,
        due_date,
        completed_at,
        created_at,
        updated_at
    FROM tasks
"#;

#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: String,
    pub organization_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub assigned_to: String,
    pub assigned_by: String,
    pub due_date: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskRow {
    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            id: record.id.clone(),
            organization_id: record.organization_id.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            status: record.status.as_str().to_string(),
            priority: record.priority.as_str().to_string(),
            assigned_to: record.assigned_to.clone(),
            assigned_by: record.assigned_by.clone(),
            due_date: record.due_date.clone(),
            completed_at: record.completed_at.clone(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> AppResult<TaskRecord> {
        Ok(TaskRecord {
            id: self.id,
            organization_id: self.organization_id,
            title: self.title,
            description: self.description,
            status: TaskStatus::parse(&self.status)?,
            priority: TaskPriority::parse(&self.priority)?,
            assigned_to: self.assigned_to,
            assigned_by: self.assigned_by,
            due_date: self.due_date,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<&Row<'_>> for TaskRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(TaskRow {
            id: row.get("id")?,
            organization_id: row.get("organization_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            status: row.get("status")?,
            priority: row.get("priority")?,
            assigned_to: row.get("assigned_to")?,
            assigned_by: row.get("assigned_by")?,
            due_date: row.get("due_date")?,
            completed_at: row.get("completed_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct TaskRepository;

impl TaskRepository {
    pub fn insert(conn: &Connection, row: &TaskRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO tasks (
                    id,
                    organization_id,
                    title,
                    description,
                    status,
                    priority,
                    assigned_to,
                    assigned_by,
                    due_date,
                    completed_at,
                    created_at,
                    updated_at
                ) VALUES (
                    :id,
                    :organization_id,
                    :title,
                    :description,
                    :status,
                    :priority,
                    :assigned_to,
                    :assigned_by,
                    :due_date,
                    :completed_at,
                    :created_at,
                    :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":organization_id": &row.organization_id,
                ":title": &row.title,
                ":description": &row.description,
                ":status": &row.status,
                ":priority": &row.priority,
                ":assigned_to": &row.assigned_to,
                ":assigned_by": &row.assigned_by,
                ":due_date": &row.due_date,
                ":completed_at": &row.completed_at,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;

        Ok(())
    }

    pub fn update_status(
        conn: &Connection,
        id: &str,
        status: &str,
        completed_at: Option<&str>,
        updated_at: &str,
    ) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE tasks SET
                    status = :status,
                    completed_at = :completed_at,
                    updated_at = :updated_at
                WHERE id = :id
            "#,
            named_params! {
                ":id": id,
                ":status": status,
                ":completed_at": completed_at,
                ":updated_at": updated_at,
            },
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }

        Ok(())
    }

    pub fn delete(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(AppError::not_found());
        }
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<TaskRow>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", BASE_SELECT))?;
        let row = stmt
            .query_row([id], |row| TaskRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list_by_organization(
        conn: &Connection,
        organization_id: &str,
        filter: &TaskListFilter,
    ) -> AppResult<Vec<TaskRow>> {
        let mut sql = format!("{} WHERE organization_id = :organization_id", BASE_SELECT);
        if filter.status.is_some() {
            sql.push_str(" AND status = :status");
        }
        if filter.assigned_to.is_some() {
            sql.push_str(" AND assigned_to = :assigned_to");
        }
        sql.push_str(" ORDER BY created_at DESC, id");

        let status = filter.status.map(|s| s.as_str().to_string());
        let mut stmt = conn.prepare(&sql)?;
        let mut params: Vec<(&str, &dyn rusqlite::ToSql)> =
            vec![(":organization_id", &organization_id)];
        if let Some(status) = status.as_ref() {
            params.push((":status", status));
        }
        if let Some(assigned_to) = filter.assigned_to.as_ref() {
            params.push((":assigned_to", assigned_to));
        }

        let rows = stmt
            .query_map(params.as_slice(), |row| TaskRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_by_assignee(conn: &Connection, assigned_to: &str) -> AppResult<Vec<TaskRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE assigned_to = ?1 ORDER BY created_at DESC, id",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map([assigned_to], |row| TaskRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_open_by_assignee(conn: &Connection, assigned_to: &str) -> AppResult<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE assigned_to = ?1 AND status != 'completed'",
            [assigned_to],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
