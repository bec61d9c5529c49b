pub mod audit;
pub mod insights;
pub mod task;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::error;

use crate::db::DbPool;
use crate::error::AppError;
use crate::services::audit_log_service::AuditLogService;
use crate::services::chain_anchor_service::{ChainAnchorService, ChainConfig, ChainRpc};
use crate::services::insights_service::InsightsService;
use crate::services::scoring_service::ScoringService;
use crate::services::task_service::TaskService;
use crate::utils::logger;

#[derive(Clone)]
pub struct AppState {
    task_service: Arc<TaskService>,
    scoring_service: Arc<ScoringService>,
    insights_service: Arc<InsightsService>,
    chain_service: Arc<ChainAnchorService>,
    audit_service: Arc<AuditLogService>,
}

impl AppState {
    /// Wire the services against the production HTTP chain RPC and start the
    /// background confirmation job. Logging lands next to the database file.
    pub fn new(db_pool: DbPool) -> crate::error::AppResult<Self> {
        if let Some(data_dir) = db_pool.path().parent() {
            logger::init_logging(data_dir)?;
        }
        let config = ChainConfig::from_env();
        let chain_service = Arc::new(ChainAnchorService::with_http_rpc(db_pool.clone(), config)?);
        chain_service.ensure_confirmation_job()?;
        Ok(Self::with_chain_service(db_pool, chain_service))
    }

    /// Wiring seam for tests: inject a mock RPC and drive the poller by hand.
    pub fn with_chain_rpc(
        db_pool: DbPool,
        rpc: Arc<dyn ChainRpc>,
        config: ChainConfig,
    ) -> Self {
        let chain_service = Arc::new(ChainAnchorService::new(db_pool.clone(), rpc, config));
        Self::with_chain_service(db_pool, chain_service)
    }

    fn with_chain_service(db_pool: DbPool, chain_service: Arc<ChainAnchorService>) -> Self {
        let task_service = Arc::new(TaskService::new(
            db_pool.clone(),
            Arc::clone(&chain_service),
        ));
        let scoring_service = Arc::new(ScoringService::new(db_pool.clone()));
        let insights_service = Arc::new(InsightsService::new(db_pool.clone()));
        let audit_service = Arc::new(AuditLogService::new(db_pool));

        Self {
            task_service,
            scoring_service,
            insights_service,
            chain_service,
            audit_service,
        }
    }

    pub fn tasks(&self) -> Arc<TaskService> {
        Arc::clone(&self.task_service)
    }

    pub fn scoring(&self) -> Arc<ScoringService> {
        Arc::clone(&self.scoring_service)
    }

    pub fn insights(&self) -> Arc<InsightsService> {
        Arc::clone(&self.insights_service)
    }

    pub fn chain(&self) -> Arc<ChainAnchorService> {
        Arc::clone(&self.chain_service)
    }

    pub fn audit(&self) -> Arc<AuditLogService> {
        Arc::clone(&self.audit_service)
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Validation {
                message, details, ..
            } => CommandError::new("VALIDATION_ERROR", message, details),
            AppError::NotFound => CommandError::new("NOT_FOUND", "请求的资源不存在", None),
            AppError::Conflict { message } => CommandError::new("CONFLICT", message, None),
            AppError::Chain {
                code,
                message,
                correlation_id,
            } => {
                let details = correlation_id
                    .map(|id| serde_json::json!({ "correlationId": id }));
                CommandError::new(code.as_str(), message, details)
            }
            AppError::Database { message } => {
                error!(target: "app::command", %message, "database error in command");
                CommandError::new("UNKNOWN", message, None)
            }
            AppError::Serialization(error) => {
                error!(target: "app::command", error = %error, "serialization error in command");
                CommandError::new("UNKNOWN", "序列化失败", None)
            }
            AppError::Io(error) => {
                error!(target: "app::command", error = %error, "io error in command");
                CommandError::new("UNKNOWN", "文件系统读写失败", None)
            }
            AppError::Other(message) => {
                error!(target: "app::command", %message, "unexpected error in command");
                CommandError::new("UNKNOWN", message, None)
            }
        }
    }
}
