//! Postgres-backed storage
//!
//! Durable implementations of the storage traits. The schema is
//! created lazily on first use; `DATABASE_URL` selects this backend.
//!
//! Both write races are settled in SQL: idempotency begin is
//! `INSERT .. ON CONFLICT DO NOTHING`, and the daily spend reservation
//! is a conditional upsert that only bumps the counter below the cap.

use crate::error::AgentOpsError;
use crate::idempotency::{BeginOutcome, IdempotencyStore};
use crate::ledger::ActivityLedger;
use crate::models::{
    ActivityLogEntry, ActivityType, ApprovalRequest, ApprovalStatus, CorrelationId,
    DailySpendCounter, IdempotencyKeyRecord, IdempotencyStatus, Plan, ToolStatus, Transaction,
    TransactionStatus,
};
use crate::spend::SpendTracker;
use crate::state::{ApprovalStore, TransactionStore};
use crate::Result;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;
use uuid::Uuid;

/// Shared Postgres backend for transactions, idempotency keys, daily
/// spend counters, approvals and the activity ledger.
#[derive(Clone)]
pub struct PgStores {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PgStores {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;

        info!("Connected to Postgres");

        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    /// Build from `DATABASE_URL` when set.
    pub async fn from_env() -> Result<Option<Self>> {
        match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Ok(Some(Self::connect(&url).await?)),
            _ => Ok(None),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS transactions (
                      transaction_id UUID PRIMARY KEY,
                      from_user_id UUID NOT NULL,
                      to_user_id UUID NOT NULL,
                      from_address TEXT NOT NULL,
                      to_address TEXT NOT NULL,
                      amount NUMERIC NOT NULL,
                      token_contract TEXT NOT NULL,
                      token_symbol TEXT NOT NULL,
                      chain_id BIGINT NOT NULL,
                      status TEXT NOT NULL,
                      provider_transaction_id TEXT,
                      message TEXT,
                      created_at TIMESTAMPTZ NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS idempotency_keys (
                      key TEXT PRIMARY KEY,
                      owner_id UUID NOT NULL,
                      request_hash TEXT NOT NULL,
                      status TEXT NOT NULL,
                      cached_response JSONB,
                      created_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS daily_spend_tracking (
                      user_id UUID NOT NULL,
                      date DATE NOT NULL,
                      transaction_count INTEGER NOT NULL DEFAULT 0,
                      PRIMARY KEY (user_id, date)
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS approval_requests (
                      approval_request_id UUID PRIMARY KEY,
                      agent_id UUID NOT NULL,
                      correlation_id UUID NOT NULL,
                      input TEXT NOT NULL,
                      plan_snapshot JSONB NOT NULL,
                      status TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL,
                      resolved_at TIMESTAMPTZ
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS agent_activity_log (
                      entry_id UUID PRIMARY KEY,
                      agent_id UUID NOT NULL,
                      correlation_id UUID NOT NULL,
                      activity_type TEXT NOT NULL,
                      tool_name TEXT,
                      tool_status TEXT NOT NULL,
                      latency_ms BIGINT,
                      cost NUMERIC,
                      payload JSONB NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS audit_logs (
                      event_id UUID PRIMARY KEY,
                      correlation_id UUID,
                      actor_id UUID,
                      action TEXT NOT NULL,
                      detail JSONB NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    "CREATE INDEX IF NOT EXISTS idx_transactions_pending \
                     ON transactions (created_at) WHERE status = 'pending';",
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await?;

        Ok(())
    }
}

//
// ================= Row Mapping =================
//

fn transaction_status_from_str(s: &str) -> Result<TransactionStatus> {
    match s {
        "pending" => Ok(TransactionStatus::Pending),
        "confirmed" => Ok(TransactionStatus::Confirmed),
        "failed" => Ok(TransactionStatus::Failed),
        other => Err(AgentOpsError::Storage(format!(
            "unknown transaction status in storage: {}",
            other
        ))),
    }
}

fn idempotency_status_from_str(s: &str) -> Result<IdempotencyStatus> {
    match s {
        "pending" => Ok(IdempotencyStatus::Pending),
        "completed" => Ok(IdempotencyStatus::Completed),
        "failed" => Ok(IdempotencyStatus::Failed),
        other => Err(AgentOpsError::Storage(format!(
            "unknown idempotency status in storage: {}",
            other
        ))),
    }
}

fn approval_status_from_str(s: &str) -> Result<ApprovalStatus> {
    match s {
        "pending" => Ok(ApprovalStatus::Pending),
        "approved" => Ok(ApprovalStatus::Approved),
        "rejected" => Ok(ApprovalStatus::Rejected),
        other => Err(AgentOpsError::Storage(format!(
            "unknown approval status in storage: {}",
            other
        ))),
    }
}

fn approval_status_to_str(s: ApprovalStatus) -> &'static str {
    match s {
        ApprovalStatus::Pending => "pending",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Rejected => "rejected",
    }
}

fn transaction_from_row(row: &sqlx::postgres::PgRow) -> Result<Transaction> {
    let status: String = row.try_get("status")?;
    let chain_id: i64 = row.try_get("chain_id")?;

    Ok(Transaction {
        transaction_id: row.try_get("transaction_id")?,
        from_user_id: row.try_get("from_user_id")?,
        to_user_id: row.try_get("to_user_id")?,
        from_address: row.try_get("from_address")?,
        to_address: row.try_get("to_address")?,
        amount: row.try_get("amount")?,
        token_contract: row.try_get("token_contract")?,
        token_symbol: row.try_get("token_symbol")?,
        chain_id: chain_id as u64,
        status: transaction_status_from_str(&status)?,
        provider_transaction_id: row.try_get("provider_transaction_id")?,
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn approval_from_row(row: &sqlx::postgres::PgRow) -> Result<ApprovalRequest> {
    let status: String = row.try_get("status")?;
    let plan_snapshot: serde_json::Value = row.try_get("plan_snapshot")?;
    let correlation_id: Uuid = row.try_get("correlation_id")?;
    let plan: Plan = serde_json::from_value(plan_snapshot)?;

    Ok(ApprovalRequest {
        approval_request_id: row.try_get("approval_request_id")?,
        agent_id: row.try_get("agent_id")?,
        correlation_id: CorrelationId(correlation_id),
        input: row.try_get("input")?,
        plan_snapshot: plan,
        status: approval_status_from_str(&status)?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

//
// ================= TransactionStore =================
//

#[async_trait::async_trait]
impl TransactionStore for PgStores {
    async fn insert(&self, transaction: Transaction) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO transactions
              (transaction_id, from_user_id, to_user_id, from_address, to_address,
               amount, token_contract, token_symbol, chain_id, status,
               provider_transaction_id, message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(transaction.transaction_id)
        .bind(transaction.from_user_id)
        .bind(transaction.to_user_id)
        .bind(&transaction.from_address)
        .bind(&transaction.to_address)
        .bind(transaction.amount)
        .bind(&transaction.token_contract)
        .bind(&transaction.token_symbol)
        .bind(transaction.chain_id as i64)
        .bind(transaction.status.to_string())
        .bind(&transaction.provider_transaction_id)
        .bind(&transaction.message)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, transaction_id: Uuid) -> Result<Option<Transaction>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT * FROM transactions WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn update_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
        provider_transaction_id: Option<String>,
    ) -> Result<()> {
        self.ensure_schema().await?;

        // The WHERE clause enforces pending -> terminal at the storage
        // layer; an already-terminal row never matches.
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2,
                provider_transaction_id = COALESCE($3, provider_transaction_id),
                updated_at = NOW()
            WHERE transaction_id = $1 AND status = 'pending'
            "#,
        )
        .bind(transaction_id)
        .bind(status.to_string())
        .bind(provider_transaction_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match TransactionStore::get(self, transaction_id).await? {
                Some(existing) => Err(AgentOpsError::Storage(format!(
                    "illegal status transition {} -> {} for transaction {}",
                    existing.status, status, transaction_id
                ))),
                None => Err(AgentOpsError::NotFound(format!(
                    "transaction {}",
                    transaction_id
                ))),
            };
        }

        Ok(())
    }

    async fn attach_provider_id(
        &self,
        transaction_id: Uuid,
        provider_transaction_id: String,
    ) -> Result<()> {
        self.ensure_schema().await?;

        let result = sqlx::query(
            "UPDATE transactions SET provider_transaction_id = $2, updated_at = NOW() \
             WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .bind(provider_transaction_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AgentOpsError::NotFound(format!(
                "transaction {}",
                transaction_id
            )));
        }
        Ok(())
    }

    async fn pending_oldest_first(&self, limit: usize) -> Result<Vec<Transaction>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            "SELECT * FROM transactions WHERE status = 'pending' \
             ORDER BY created_at ASC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }
}

//
// ================= IdempotencyStore =================
//

#[async_trait::async_trait]
impl IdempotencyStore for PgStores {
    async fn begin(&self, key: &str, owner_id: Uuid, request_hash: &str) -> Result<BeginOutcome> {
        self.ensure_schema().await?;

        // Conditional insert: the unique key constraint is the check.
        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, owner_id, request_hash, status, created_at)
            VALUES ($1, $2, $3, 'pending', NOW())
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(owner_id)
        .bind(request_hash)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(BeginOutcome::Started);
        }

        let row = sqlx::query("SELECT * FROM idempotency_keys WHERE key = $1")
            .bind(key)
            .fetch_one(&self.pool)
            .await?;

        let existing_hash: String = row.try_get("request_hash")?;
        if existing_hash != request_hash {
            return Ok(BeginOutcome::Conflict);
        }

        let status: String = row.try_get("status")?;
        match idempotency_status_from_str(&status)? {
            IdempotencyStatus::Completed => {
                let cached: Option<serde_json::Value> = row.try_get("cached_response")?;
                Ok(BeginOutcome::Completed(cached.unwrap_or(serde_json::Value::Null)))
            }
            IdempotencyStatus::Pending => Ok(BeginOutcome::InProgress),
            IdempotencyStatus::Failed => {
                // Reclaim a failed key. If a concurrent retry got there
                // first, the row is pending again and we report that.
                let reclaimed = sqlx::query(
                    "UPDATE idempotency_keys \
                     SET status = 'pending', cached_response = NULL, created_at = NOW() \
                     WHERE key = $1 AND status = 'failed'",
                )
                .bind(key)
                .execute(&self.pool)
                .await?;

                if reclaimed.rows_affected() == 1 {
                    Ok(BeginOutcome::Started)
                } else {
                    Ok(BeginOutcome::InProgress)
                }
            }
        }
    }

    async fn complete(&self, key: &str, response: serde_json::Value) -> Result<()> {
        self.ensure_schema().await?;

        let result = sqlx::query(
            "UPDATE idempotency_keys SET status = 'completed', cached_response = $2 \
             WHERE key = $1",
        )
        .bind(key)
        .bind(response)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AgentOpsError::Storage(format!(
                "idempotency key not found: {}",
                key
            )));
        }
        Ok(())
    }

    async fn fail(&self, key: &str) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query("UPDATE idempotency_keys SET status = 'failed' WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyKeyRecord>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT * FROM idempotency_keys WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        Ok(Some(IdempotencyKeyRecord {
            key: row.try_get("key")?,
            owner_id: row.try_get("owner_id")?,
            request_hash: row.try_get("request_hash")?,
            status: idempotency_status_from_str(&status)?,
            cached_response: row.try_get("cached_response")?,
            created_at: row.try_get("created_at")?,
        }))
    }
}

//
// ================= SpendTracker =================
//

#[async_trait::async_trait]
impl SpendTracker for PgStores {
    async fn try_reserve(&self, user_id: Uuid, date: NaiveDate) -> Result<u32> {
        self.ensure_schema().await?;

        // One statement: insert at 1, or bump only while below the cap.
        let row = sqlx::query(
            r#"
            INSERT INTO daily_spend_tracking (user_id, date, transaction_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id, date) DO UPDATE
              SET transaction_count = daily_spend_tracking.transaction_count + 1
              WHERE daily_spend_tracking.transaction_count < $3
            RETURNING transaction_count
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(crate::spend::MAX_DAILY_TRANSACTIONS as i32)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let count: i32 = row.try_get("transaction_count")?;
                Ok(count as u32)
            }
            None => Err(AgentOpsError::RateLimited),
        }
    }

    async fn counter_for(&self, user_id: Uuid, date: NaiveDate) -> Result<DailySpendCounter> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            "SELECT transaction_count FROM daily_spend_tracking WHERE user_id = $1 AND date = $2",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        let transaction_count = match row {
            Some(row) => {
                let count: i32 = row.try_get("transaction_count")?;
                count as u32
            }
            None => 0,
        };
        Ok(DailySpendCounter {
            user_id,
            date,
            transaction_count,
        })
    }
}

//
// ================= ApprovalStore =================
//

#[async_trait::async_trait]
impl ApprovalStore for PgStores {
    async fn insert(&self, request: ApprovalRequest) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO approval_requests
              (approval_request_id, agent_id, correlation_id, input, plan_snapshot,
               status, created_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(request.approval_request_id)
        .bind(request.agent_id)
        .bind(request.correlation_id.0)
        .bind(&request.input)
        .bind(serde_json::to_value(&request.plan_snapshot)?)
        .bind(approval_status_to_str(request.status))
        .bind(request.created_at)
        .bind(request.resolved_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, approval_request_id: Uuid) -> Result<Option<ApprovalRequest>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT * FROM approval_requests WHERE approval_request_id = $1")
            .bind(approval_request_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(approval_from_row).transpose()
    }

    async fn resolve(
        &self,
        approval_request_id: Uuid,
        status: ApprovalStatus,
    ) -> Result<ApprovalRequest> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            r#"
            UPDATE approval_requests
            SET status = $2, resolved_at = NOW()
            WHERE approval_request_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(approval_request_id)
        .bind(approval_status_to_str(status))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => approval_from_row(&row),
            None => match ApprovalStore::get(self, approval_request_id).await? {
                Some(_) => Err(AgentOpsError::Validation(format!(
                    "approval request {} already resolved",
                    approval_request_id
                ))),
                None => Err(AgentOpsError::NotFound(format!(
                    "approval {}",
                    approval_request_id
                ))),
            },
        }
    }
}

//
// ================= ActivityLedger =================
//

#[async_trait::async_trait]
impl ActivityLedger for PgStores {
    async fn append(&self, entry: ActivityLogEntry) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO agent_activity_log
              (entry_id, agent_id, correlation_id, activity_type, tool_name,
               tool_status, latency_ms, cost, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.entry_id)
        .bind(entry.agent_id)
        .bind(entry.correlation_id.0)
        .bind(activity_type_to_str(entry.activity_type))
        .bind(&entry.tool_name)
        .bind(tool_status_to_str(entry.tool_status))
        .bind(entry.latency_ms.map(|ms| ms as i64))
        .bind(entry.cost)
        .bind(&entry.payload)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn entries_for(&self, correlation_id: CorrelationId) -> Result<Vec<ActivityLogEntry>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            "SELECT * FROM agent_activity_log WHERE correlation_id = $1 ORDER BY created_at ASC",
        )
        .bind(correlation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ledger_entry_from_row).collect()
    }

    async fn entries_for_agent(&self, agent_id: Uuid) -> Result<Vec<ActivityLogEntry>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            "SELECT * FROM agent_activity_log WHERE agent_id = $1 ORDER BY created_at ASC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ledger_entry_from_row).collect()
    }
}

//
// ================= AuditTrail =================
//

#[async_trait::async_trait]
impl crate::ledger::AuditTrail for PgStores {
    async fn record(&self, event: crate::ledger::AuditEvent) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO audit_logs (event_id, correlation_id, actor_id, action, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.event_id)
        .bind(event.correlation_id.map(|c| c.0))
        .bind(event.actor_id)
        .bind(&event.action)
        .bind(&event.detail)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn events_for_action(&self, action: &str) -> Result<Vec<crate::ledger::AuditEvent>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            "SELECT * FROM audit_logs WHERE action = $1 ORDER BY created_at ASC",
        )
        .bind(action)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let correlation_id: Option<Uuid> = row.try_get("correlation_id")?;
                Ok(crate::ledger::AuditEvent {
                    event_id: row.try_get("event_id")?,
                    correlation_id: correlation_id.map(CorrelationId),
                    actor_id: row.try_get("actor_id")?,
                    action: row.try_get("action")?,
                    detail: row.try_get("detail")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

fn activity_type_to_str(t: ActivityType) -> &'static str {
    match t {
        ActivityType::Planning => "planning",
        ActivityType::ToolCall => "tool_call",
        ActivityType::ApprovalRequested => "approval_requested",
        ActivityType::Completion => "completion",
        ActivityType::Error => "error",
    }
}

fn activity_type_from_str(s: &str) -> Result<ActivityType> {
    match s {
        "planning" => Ok(ActivityType::Planning),
        "tool_call" => Ok(ActivityType::ToolCall),
        "approval_requested" => Ok(ActivityType::ApprovalRequested),
        "completion" => Ok(ActivityType::Completion),
        "error" => Ok(ActivityType::Error),
        other => Err(AgentOpsError::Storage(format!(
            "unknown activity type in storage: {}",
            other
        ))),
    }
}

fn tool_status_to_str(s: ToolStatus) -> &'static str {
    match s {
        ToolStatus::Success => "success",
        ToolStatus::Failure => "failure",
        ToolStatus::Pending => "pending",
    }
}

fn tool_status_from_str(s: &str) -> Result<ToolStatus> {
    match s {
        "success" => Ok(ToolStatus::Success),
        "failure" => Ok(ToolStatus::Failure),
        "pending" => Ok(ToolStatus::Pending),
        other => Err(AgentOpsError::Storage(format!(
            "unknown tool status in storage: {}",
            other
        ))),
    }
}

fn ledger_entry_from_row(row: &sqlx::postgres::PgRow) -> Result<ActivityLogEntry> {
    let activity_type: String = row.try_get("activity_type")?;
    let tool_status: String = row.try_get("tool_status")?;
    let latency_ms: Option<i64> = row.try_get("latency_ms")?;
    let correlation_id: Uuid = row.try_get("correlation_id")?;

    Ok(ActivityLogEntry {
        entry_id: row.try_get("entry_id")?,
        agent_id: row.try_get("agent_id")?,
        correlation_id: CorrelationId(correlation_id),
        activity_type: activity_type_from_str(&activity_type)?,
        tool_name: row.try_get("tool_name")?,
        tool_status: tool_status_from_str(&tool_status)?,
        latency_ms: latency_ms.map(|ms| ms as u64),
        cost: row.try_get("cost")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
    })
}
