use std::fmt;

use rusqlite;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainErrorCode {
    HttpTimeout,
    RateLimited,
    InvalidResponse,
    NodeUnavailable,
    SubmissionRejected,
    Unknown,
}

impl ChainErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ChainErrorCode::HttpTimeout => "HTTP_TIMEOUT",
            ChainErrorCode::RateLimited => "RATE_LIMITED",
            ChainErrorCode::InvalidResponse => "INVALID_RESPONSE",
            ChainErrorCode::NodeUnavailable => "NODE_UNAVAILABLE",
            ChainErrorCode::SubmissionRejected => "SUBMISSION_REJECTED",
            ChainErrorCode::Unknown => "UNKNOWN_CHAIN_ERROR",
        }
    }

    /// Whether the confirmation poller should count this attempt and retry later.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ChainErrorCode::SubmissionRejected)
    }
}

impl fmt::Display for ChainErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("数据库错误: {message}")]
    Database { message: String },

    #[error("记录未找到")]
    NotFound,

    #[error("记录冲突: {message}")]
    Conflict { message: String },

    #[error("验证失败: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        details: Option<JsonValue>,
    },

    #[error("{message}")]
    Chain {
        code: ChainErrorCode,
        message: String,
        correlation_id: Option<String>,
    },

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            source: None,
            details: None,
        }
    }

    pub fn chain(code: ChainErrorCode, message: impl Into<String>) -> Self {
        Self::chain_with_correlation(code, message, None)
    }

    pub fn chain_with_correlation(
        code: ChainErrorCode,
        message: impl Into<String>,
        correlation_id: Option<&str>,
    ) -> Self {
        let message = message.into();
        let correlation = correlation_id.map(|value| value.to_string());
        match &correlation {
            Some(id) => {
                warn!(target: "app::chain::error", code = %code, correlation_id = %id, %message);
            }
            None => {
                warn!(target: "app::chain::error", code = %code, %message);
            }
        }

        AppError::Chain {
            code,
            message,
            correlation_id: correlation,
        }
    }

    pub fn chain_code(&self) -> Option<ChainErrorCode> {
        match self {
            AppError::Chain { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::conflict", %message, "conflict error");
        AppError::Conflict { message }
    }

    pub fn not_found() -> Self {
        warn!(target: "app::database", "resource not found");
        AppError::NotFound
    }

    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::database", %message, "database error");
        AppError::Database { message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::Error::{QueryReturnedNoRows, SqliteFailure};
        use rusqlite::ErrorCode;

        match &error {
            QueryReturnedNoRows => AppError::not_found(),
            SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                AppError::conflict("违反唯一性或约束限制")
            }
            _ => {
                error!(target: "app::database", error = ?error, "sqlite error");
                AppError::database(error.to_string())
            }
        }
    }
}
