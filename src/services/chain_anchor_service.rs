use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::repositories::activity_log_repository::{ActivityLogRepository, ActivityLogRow};
use crate::db::repositories::task_repository::TaskRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult, ChainErrorCode};
use crate::models::activity::{ActivityLogEntry, EVENT_TYPE_TASK_COMPLETION};
use crate::utils::activity_hash::activity_hash;

const DEFAULT_ENDPOINT: &str = "https://rpc-mumbai.maticvigil.com";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_ATTEMPTS: i64 = 8;
const DEFAULT_BACKOFF_BASE_SECS: u64 = 5;

/// Backoff never schedules an entry further out than this.
const MAX_BACKOFF: StdDuration = StdDuration::from_secs(600);

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub endpoint: String,
    pub poll_interval: StdDuration,
    pub attempt_timeout: StdDuration,
    pub max_attempts: i64,
    pub backoff_base: StdDuration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll_interval: StdDuration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            attempt_timeout: StdDuration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: StdDuration::from_secs(DEFAULT_BACKOFF_BASE_SECS),
        }
    }
}

impl ChainConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var("TEAMPULSE_CHAIN_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                config.endpoint = endpoint.trim().trim_end_matches('/').to_string();
            }
        }
        if let Some(secs) = env_u64("TEAMPULSE_CHAIN_POLL_INTERVAL_SECS") {
            config.poll_interval = StdDuration::from_secs(secs);
        }
        if let Some(secs) = env_u64("TEAMPULSE_CHAIN_ATTEMPT_TIMEOUT_SECS") {
            config.attempt_timeout = StdDuration::from_secs(secs);
        }
        if let Some(attempts) = env_u64("TEAMPULSE_CHAIN_MAX_ATTEMPTS") {
            config.max_attempts = attempts as i64;
        }
        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfirmation {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
}

/// Seam to the external network. The poller only ever talks to the chain
/// through this trait, so tests can stand in a mock node.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Submit a commitment for the given activity hash, returning the
    /// node-assigned transaction hash.
    async fn submit_commitment(&self, activity_hash: &str) -> AppResult<String>;

    /// Poll the commitment's confirmation state. `None` means the
    /// transaction is known but not yet confirmed.
    async fn fetch_confirmation(&self, transaction_hash: &str)
        -> AppResult<Option<ChainConfirmation>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    transaction_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptResponse {
    status: String,
    #[serde(default)]
    block_number: Option<u64>,
}

/// Production RPC over the anchoring node's HTTP interface.
pub struct HttpChainRpc {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChainRpc {
    pub fn try_new(config: &ChainConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.attempt_timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("初始化链上 HTTP 客户端失败: {err}")))?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn map_http_error(status: StatusCode, correlation_id: &str) -> AppError {
        let code = if status == StatusCode::TOO_MANY_REQUESTS {
            ChainErrorCode::RateLimited
        } else if status.is_server_error() {
            ChainErrorCode::NodeUnavailable
        } else if status.is_client_error() {
            ChainErrorCode::SubmissionRejected
        } else {
            ChainErrorCode::Unknown
        };
        AppError::chain_with_correlation(
            code,
            format!("链上节点返回非成功状态: {}", status.as_u16()),
            Some(correlation_id),
        )
    }

    fn map_transport_error(err: reqwest::Error, correlation_id: &str) -> AppError {
        let code = if err.is_timeout() {
            ChainErrorCode::HttpTimeout
        } else if err.is_connect() {
            ChainErrorCode::NodeUnavailable
        } else {
            ChainErrorCode::Unknown
        };
        AppError::chain_with_correlation(
            code,
            format!("链上请求失败: {err}"),
            Some(correlation_id),
        )
    }
}

#[async_trait]
impl ChainRpc for HttpChainRpc {
    async fn submit_commitment(&self, activity_hash: &str) -> AppResult<String> {
        let correlation_id = Uuid::new_v4().to_string();
        let url = format!("{}/commitments", self.base_url);

        debug!(
            target: "app::chain::rpc",
            correlation_id = %correlation_id,
            activity_hash,
            "submitting commitment"
        );

        let response = self
            .client
            .post(&url)
            .json(&json!({ "activityHash": activity_hash }))
            .send()
            .await
            .map_err(|err| Self::map_transport_error(err, &correlation_id))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::map_http_error(status, &correlation_id));
        }

        let body: SubmitResponse = response.json().await.map_err(|err| {
            AppError::chain_with_correlation(
                ChainErrorCode::InvalidResponse,
                format!("解析提交响应失败: {err}"),
                Some(&correlation_id),
            )
        })?;

        Ok(body.transaction_hash)
    }

    async fn fetch_confirmation(
        &self,
        transaction_hash: &str,
    ) -> AppResult<Option<ChainConfirmation>> {
        let correlation_id = Uuid::new_v4().to_string();
        let url = format!("{}/transactions/{}", self.base_url, transaction_hash);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| Self::map_transport_error(err, &correlation_id))?;

        let status = response.status();
        // A receipt that does not exist yet reads as still pending.
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::map_http_error(status, &correlation_id));
        }

        let body: ReceiptResponse = response.json().await.map_err(|err| {
            AppError::chain_with_correlation(
                ChainErrorCode::InvalidResponse,
                format!("解析交易回执失败: {err}"),
                Some(&correlation_id),
            )
        })?;

        if body.status == "confirmed" {
            Ok(Some(ChainConfirmation {
                transaction_hash: transaction_hash.to_string(),
                block_number: body.block_number,
            }))
        } else {
            Ok(None)
        }
    }
}

/// Anchors task-completion events on the chain without ever blocking the
/// task-completion caller.
///
/// `submit_completion` only writes the local pending entry; all network I/O
/// happens in the background confirmation job, which walks due pending
/// entries, submits missing commitments and polls receipts with per-entry
/// exponential backoff until they confirm or the retry budget runs out.
pub struct ChainAnchorService {
    db: DbPool,
    rpc: Arc<dyn ChainRpc>,
    config: ChainConfig,
    poller_started: AtomicBool,
}

impl ChainAnchorService {
    pub fn new(db: DbPool, rpc: Arc<dyn ChainRpc>, config: ChainConfig) -> Self {
        Self {
            db,
            rpc,
            config,
            poller_started: AtomicBool::new(false),
        }
    }

    pub fn with_http_rpc(db: DbPool, config: ChainConfig) -> AppResult<Self> {
        let rpc = Arc::new(HttpChainRpc::try_new(&config)?);
        Ok(Self::new(db, rpc, config))
    }

    /// Record a completion event for anchoring. Idempotent: the activity hash
    /// is derived from immutable event data, and resubmitting the same event
    /// returns the existing entry. Returns immediately with a pending entry;
    /// no network I/O happens on this path.
    pub fn submit_completion(
        &self,
        task_id: &str,
        employee_id: &str,
        completed_at: &str,
    ) -> AppResult<ActivityLogEntry> {
        let conn = self.db.get_connection()?;

        let task = TaskRepository::find_by_id(&conn, task_id)?
            .ok_or_else(|| AppError::validation(format!("任务不存在: {task_id}")))?;

        let hash = activity_hash(employee_id, task_id, completed_at);

        if let Some(existing) = ActivityLogRepository::find_by_hash(&conn, &hash)? {
            debug!(
                target: "app::chain",
                activity_hash = %hash,
                "duplicate completion submission, returning existing entry"
            );
            return existing.into_record();
        }

        let now = Utc::now().to_rfc3339();
        let row = ActivityLogRow {
            id: Uuid::new_v4().to_string(),
            organization_id: task.organization_id.clone(),
            employee_id: employee_id.to_string(),
            task_id: task_id.to_string(),
            event_type: EVENT_TYPE_TASK_COMPLETION.to_string(),
            activity_hash: hash.clone(),
            status: "pending".to_string(),
            transaction_hash: None,
            submitted_at: now.clone(),
            confirmed_at: None,
            retry_count: 0,
            next_attempt_at: now,
        };

        match ActivityLogRepository::insert_pending(&conn, &row) {
            Ok(()) => {}
            // Lost a concurrent check-then-insert race on the same hash;
            // the UNIQUE constraint guarantees exactly one entry exists.
            Err(AppError::Conflict { .. }) => {
                return match ActivityLogRepository::find_by_hash(&conn, &hash)? {
                    Some(existing) => existing.into_record(),
                    None => Err(AppError::other(format!(
                        "活动哈希冲突但记录不存在: {hash}"
                    ))),
                };
            }
            Err(err) => return Err(err),
        }

        info!(
            target: "app::chain",
            task_id,
            employee_id,
            activity_hash = %hash,
            "completion event queued for anchoring"
        );

        row.into_record()
    }

    /// Start the background confirmation job once. Runs on its own thread
    /// with a dedicated runtime so request handling never waits on it.
    pub fn ensure_confirmation_job(self: &Arc<Self>) -> AppResult<()> {
        if self
            .poller_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let service = Arc::clone(self);
            if let Err(err) = thread::Builder::new()
                .name("chain-confirmation-job".to_string())
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime,
                        Err(err) => {
                            error!(
                                target: "app::chain",
                                error = %err,
                                "failed to build confirmation runtime"
                            );
                            return;
                        }
                    };
                    runtime.block_on(service.run_confirmation_loop());
                })
            {
                self.poller_started.store(false, Ordering::SeqCst);
                error!(
                    target: "app::chain",
                    error = %err,
                    "failed to start chain confirmation thread"
                );
                return Err(AppError::other(format!("无法启动链上确认任务: {err}")));
            }
        }

        Ok(())
    }

    async fn run_confirmation_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            if let Err(err) = self.poll_pending_once().await {
                error!(
                    target: "app::chain",
                    error = %err,
                    "confirmation poll pass failed"
                );
            }
        }
    }

    /// One poller pass over all due pending entries. Per-entry errors are
    /// absorbed into that entry's retry state and never abort the pass.
    pub async fn poll_pending_once(&self) -> AppResult<usize> {
        let due = {
            let conn = self.db.get_connection()?;
            ActivityLogRepository::list_due_pending(&conn, &Utc::now().to_rfc3339())?
        };

        let processed = due.len();
        for row in due {
            self.process_entry(row).await?;
        }
        Ok(processed)
    }

    async fn process_entry(&self, row: ActivityLogRow) -> AppResult<()> {
        match row.transaction_hash.clone() {
            None => match self.rpc.submit_commitment(&row.activity_hash).await {
                Ok(transaction_hash) => {
                    let conn = self.db.get_connection()?;
                    ActivityLogRepository::record_submission(
                        &conn,
                        &row.id,
                        &transaction_hash,
                        &Utc::now().to_rfc3339(),
                    )?;
                    debug!(
                        target: "app::chain",
                        entry_id = %row.id,
                        transaction_hash = %transaction_hash,
                        "commitment submitted, awaiting confirmation"
                    );
                    Ok(())
                }
                Err(err) => self.record_failed_attempt(&row, &err),
            },
            Some(transaction_hash) => {
                match self.rpc.fetch_confirmation(&transaction_hash).await {
                    Ok(Some(confirmation)) => {
                        let conn = self.db.get_connection()?;
                        let transitioned = ActivityLogRepository::mark_confirmed(
                            &conn,
                            &row.id,
                            &confirmation.transaction_hash,
                            &Utc::now().to_rfc3339(),
                        )?;
                        if transitioned {
                            info!(
                                target: "app::chain",
                                entry_id = %row.id,
                                transaction_hash = %confirmation.transaction_hash,
                                block_number = ?confirmation.block_number,
                                "completion event confirmed on chain"
                            );
                        }
                        Ok(())
                    }
                    // Known but unconfirmed: spend one attempt and back off.
                    Ok(None) => self.record_failed_attempt(
                        &row,
                        &AppError::chain(ChainErrorCode::Unknown, "交易尚未确认"),
                    ),
                    Err(err) => self.record_failed_attempt(&row, &err),
                }
            }
        }
    }

    fn record_failed_attempt(&self, row: &ActivityLogRow, err: &AppError) -> AppResult<()> {
        let retryable = err.chain_code().map(|code| code.is_retryable()).unwrap_or(true);
        let retry_count = row.retry_count + 1;
        let conn = self.db.get_connection()?;

        if !retryable || retry_count >= self.config.max_attempts {
            ActivityLogRepository::mark_failed(&conn, &row.id, retry_count)?;
            warn!(
                target: "app::chain",
                entry_id = %row.id,
                retry_count,
                error = %err,
                "anchoring abandoned, entry marked failed"
            );
            return Ok(());
        }

        let next_attempt_at = next_attempt(Utc::now(), self.config.backoff_base, retry_count);
        ActivityLogRepository::record_attempt_failure(
            &conn,
            &row.id,
            retry_count,
            &next_attempt_at.to_rfc3339(),
        )?;
        debug!(
            target: "app::chain",
            entry_id = %row.id,
            retry_count,
            next_attempt_at = %next_attempt_at.to_rfc3339(),
            error = %err,
            "anchoring attempt failed, backing off"
        );
        Ok(())
    }
}

/// Exponential backoff with jitter, capped at `MAX_BACKOFF`.
fn next_attempt(now: DateTime<Utc>, base: StdDuration, retry_count: i64) -> DateTime<Utc> {
    let shift = retry_count.clamp(0, 16) as u32;
    let backoff_ms = (base.as_millis() as u64)
        .saturating_mul(1u64 << shift)
        .min(MAX_BACKOFF.as_millis() as u64);
    let jitter_ms = if backoff_ms > 0 {
        rand::thread_rng().gen_range(0..=backoff_ms / 4)
    } else {
        0
    };
    now + Duration::milliseconds((backoff_ms + jitter_ms) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_is_capped() {
        let now = Utc::now();
        let base = StdDuration::from_secs(5);

        let first = next_attempt(now, base, 1) - now;
        assert!(first >= Duration::seconds(10));
        // 10s plus at most 25% jitter.
        assert!(first <= Duration::milliseconds(12_500));

        let deep = next_attempt(now, base, 12) - now;
        assert!(deep <= Duration::milliseconds((MAX_BACKOFF.as_millis() as i64 * 5) / 4));
    }

    #[test]
    fn non_retryable_codes_are_flagged() {
        assert!(!ChainErrorCode::SubmissionRejected.is_retryable());
        assert!(ChainErrorCode::HttpTimeout.is_retryable());
        assert!(ChainErrorCode::NodeUnavailable.is_retryable());
    }
}
