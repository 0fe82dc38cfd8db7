//! Core data models for the agent platform

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

//
// ================= Agent =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Paused,
    Disabled,
    Archived,
}

/// An autonomous agent owned by a platform user. Read-only to the
/// orchestrator; invocation is rejected unless the agent is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub status: AgentStatus,
    pub tools_enabled: HashSet<String>,
    pub requires_approval: bool,
    pub spend_limit: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

//
// ================= Correlation =================
//

/// Opaque id minted once per invocation; the join key across every
/// ledger row, the approval request, and the final response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ================= Activity Ledger =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Planning,
    ToolCall,
    ApprovalRequested,
    Completion,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Failure,
    Pending,
}

/// One append-only row in the agent activity ledger.
/// Never updated or deleted; nothing reads it back for control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub entry_id: Uuid,
    pub agent_id: Uuid,
    pub correlation_id: CorrelationId,
    pub activity_type: ActivityType,
    pub tool_name: Option<String>,
    pub tool_status: ToolStatus,
    pub latency_ms: Option<u64>,
    pub cost: Option<Decimal>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(
        agent_id: Uuid,
        correlation_id: CorrelationId,
        activity_type: ActivityType,
        tool_status: ToolStatus,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            agent_id,
            correlation_id,
            activity_type,
            tool_name: None,
            tool_status,
            latency_ms: None,
            cost: None,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn with_tool(mut self, tool_name: &str, latency_ms: u64) -> Self {
        self.tool_name = Some(tool_name.to_string());
        self.latency_ms = Some(latency_ms);
        self
    }
}

//
// ================= Plan =================
//

/// Ephemeral plan produced by the planner. Not persisted except
/// embedded inside ledger and approval rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: Uuid,
    pub steps: Vec<PlanStep>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub tool: String,
    pub input: serde_json::Value,
    pub description: String,
}

//
// ================= Approval =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Created when an agent requires approval; execution halts until an
/// out-of-band decision resolves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approval_request_id: Uuid,
    pub agent_id: Uuid,
    pub correlation_id: CorrelationId,
    pub input: String,
    pub plan_snapshot: Plan,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

//
// ================= Transaction =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    /// Status transitions are one-directional: pending -> terminal.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(self, TransactionStatus::Pending) && next != TransactionStatus::Pending
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Durable record of one accepted transfer. Created once per accepted
/// request; confirmation arrives out of band via the reconciliation sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub from_address: String,
    pub to_address: String,
    pub amount: Decimal,
    pub token_contract: String,
    pub token_symbol: String,
    pub chain_id: u64,
    pub status: TransactionStatus,
    pub provider_transaction_id: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//
// ================= Idempotency =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdempotencyStatus {
    Pending,
    Completed,
    Failed,
}

/// Maps a caller-supplied key to a canonical request hash and a cached
/// terminal response. Created before any external side effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyKeyRecord {
    pub key: String,
    pub owner_id: Uuid,
    pub request_hash: String,
    pub status: IdempotencyStatus,
    pub cached_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

//
// ================= Daily Spend =================
//

/// Per-user, per-day transfer attempt counter, independent of amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySpendCounter {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub transaction_count: u32,
}

//
// ================= Transfer I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub from_address: String,
    pub to_address: String,
    /// Decimal string; must parse and be strictly positive.
    pub amount: String,
    pub token_contract: String,
    pub token_symbol: String,
    pub chain_id: u64,
    pub message: Option<String>,
}

/// Outcome of an accepted transfer. Insufficient funds is a distinct
/// branch with a remediation link, not a failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferOutcome {
    Pending {
        transaction_id: Uuid,
        provider_transaction_id: String,
    },
    InsufficientFunds {
        transaction_id: Uuid,
        payment_link: String,
    },
}

//
// ================= Step Execution =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
}

/// Result of one dispatched plan step, accumulated across the pipeline
/// and fed to the synthesis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub tool: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub status: StepStatus,
    pub latency_ms: u64,
}

//
// ================= Invocation Outcome =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationOutcome {
    Completed {
        correlation_id: CorrelationId,
        response: String,
        execution_results: Vec<ExecutionResult>,
        plan: Plan,
    },
    ApprovalRequired {
        correlation_id: CorrelationId,
        approval_request_id: Uuid,
        plan: Plan,
        message: String,
    },
    Rejected {
        correlation_id: CorrelationId,
        approval_request_id: Uuid,
    },
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Active => "active",
            AgentStatus::Paused => "paused",
            AgentStatus::Disabled => "disabled",
            AgentStatus::Archived => "archived",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_status_is_monotone() {
        assert!(TransactionStatus::Pending.can_transition_to(TransactionStatus::Confirmed));
        assert!(TransactionStatus::Pending.can_transition_to(TransactionStatus::Failed));
        assert!(!TransactionStatus::Pending.can_transition_to(TransactionStatus::Pending));
        assert!(!TransactionStatus::Confirmed.can_transition_to(TransactionStatus::Pending));
        assert!(!TransactionStatus::Failed.can_transition_to(TransactionStatus::Confirmed));
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        assert_ne!(CorrelationId::mint(), CorrelationId::mint());
    }
}
