use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnchorStatus {
    Pending,
    Confirmed,
    Failed,
}

impl AnchorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorStatus::Pending => "pending",
            AnchorStatus::Confirmed => "confirmed",
            AnchorStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw {
            "pending" => Ok(AnchorStatus::Pending),
            "confirmed" => Ok(AnchorStatus::Confirmed),
            "failed" => Ok(AnchorStatus::Failed),
            other => Err(AppError::validation(format!("未知的锚定状态: {other}"))),
        }
    }
}

/// Append-only audit record for one anchored task-completion event.
///
/// Created `pending` at submission time, mutated only by the confirmation
/// poller, and never deleted. Transitions are monotonic:
/// `pending -> confirmed` or `pending -> failed`, never backward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    pub id: String,
    pub organization_id: String,
    pub employee_id: String,
    pub task_id: String,
    pub event_type: String,
    pub activity_hash: String,
    pub status: AnchorStatus,
    pub transaction_hash: Option<String>,
    pub submitted_at: String,
    pub confirmed_at: Option<String>,
    pub retry_count: i64,
}

pub const EVENT_TYPE_TASK_COMPLETION: &str = "task_completion";
