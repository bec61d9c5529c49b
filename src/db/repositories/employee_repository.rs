use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::AppResult;
use crate::models::employee::EmployeeRecord;

const BASE_SELECT: &str = r#"
    SELECT
        id,
        organization_id,
        name,
        department,
        position,
        role,
        is_active,
        created_at
    FROM employees
"#;

#[derive(Debug, Clone)]
pub struct EmployeeRow {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub created_at: String,
}

impl EmployeeRow {
    pub fn from_record(record: &EmployeeRecord) -> Self {
        Self {
            id: record.id.clone(),
            organization_id: record.organization_id.clone(),
            name: record.name.clone(),
            department: record.department.clone(),
            position: record.position.clone(),
            role: record.role.clone(),
            is_active: record.is_active,
            created_at: record.created_at.clone(),
        }
    }

    pub fn into_record(self) -> EmployeeRecord {
        EmployeeRecord {
            id: self.id,
            organization_id: self.organization_id,
            name: self.name,
            department: self.department,
            position: self.position,
            role: self.role,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

impl TryFrom<&Row<'_>> for EmployeeRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(EmployeeRow {
            id: row.get("id")?,
            organization_id: row.get("organization_id")?,
            name: row.get("name")?,
            department: row.get("department")?,
            position: row.get("position")?,
            role: row.get("role")?,
            is_active: row.get::<_, i64>("is_active")? != 0,
            created_at: row.get("created_at")?,
        })
    }
}

pub struct EmployeeRepository;

impl EmployeeRepository {
    pub fn insert(conn: &Connection, row: &EmployeeRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO employees (
                    id,
                    organization_id,
                    name,
                    department,
                    position,
                    role,
                    is_active,
                    created_at
                ) VALUES (
                    :id,
                    :organization_id,
                    :name,
                    :department,
                    :position,
                    :role,
                    :is_active,
                    :created_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":organization_id": &row.organization_id,
                ":name": &row.name,
                ":department": &row.department,
                ":position": &row.position,
                ":role": &row.role,
                ":is_active": row.is_active as i64,
                ":created_at": &row.created_at,
            },
        )?;

        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<EmployeeRow>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", BASE_SELECT))?;
        let row = stmt
            .query_row([id], |row| EmployeeRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list_by_organization(
        conn: &Connection,
        organization_id: &str,
    ) -> AppResult<Vec<EmployeeRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE organization_id = ?1 ORDER BY id",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map([organization_id], |row| EmployeeRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_active_by_organization(
        conn: &Connection,
        organization_id: &str,
    ) -> AppResult<Vec<EmployeeRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE organization_id = ?1 AND is_active = 1 ORDER BY id",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map([organization_id], |row| EmployeeRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
