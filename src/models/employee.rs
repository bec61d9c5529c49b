use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRecord {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub created_at: String,
}
