//! State persistence layer
//!
//! Storage traits with in-memory implementations for development and
//! tests; `postgres` holds the durable implementations.

pub mod postgres;

use crate::error::AgentOpsError;
use crate::models::{
    Agent, ApprovalRequest, ApprovalStatus, Transaction, TransactionStatus,
};
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

//
// ================= Traits =================
//

/// Agents are mutated by the owner through the CRUD surface; the
/// orchestrator only reads them.
#[async_trait::async_trait]
pub trait AgentStore: Send + Sync {
    async fn get(&self, agent_id: Uuid) -> Result<Option<Agent>>;
    async fn put(&self, agent: Agent) -> Result<()>;
}

#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, transaction: Transaction) -> Result<()>;
    async fn get(&self, transaction_id: Uuid) -> Result<Option<Transaction>>;

    /// Transition a transaction to a terminal status. Refuses any
    /// terminal -> anything move so the sweep and the gateway cannot
    /// fight over a row.
    async fn update_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
        provider_transaction_id: Option<String>,
    ) -> Result<()>;

    /// Attach the provider's id while the row is still pending.
    async fn attach_provider_id(
        &self,
        transaction_id: Uuid,
        provider_transaction_id: String,
    ) -> Result<()>;

    /// Oldest-first pending rows, at most `limit`.
    async fn pending_oldest_first(&self, limit: usize) -> Result<Vec<Transaction>>;
}

#[async_trait::async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn insert(&self, request: ApprovalRequest) -> Result<()>;
    async fn get(&self, approval_request_id: Uuid) -> Result<Option<ApprovalRequest>>;

    /// Resolve a pending request. Only pending -> {approved, rejected}
    /// is legal; resolution is single-shot.
    async fn resolve(&self, approval_request_id: Uuid, status: ApprovalStatus) -> Result<ApprovalRequest>;
}

//
// ================= In-Memory Implementations =================
//

pub struct InMemoryAgentStore {
    agents: Arc<RwLock<HashMap<Uuid, Agent>>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryAgentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn get(&self, agent_id: Uuid) -> Result<Option<Agent>> {
        let agents = self.agents.read().await;
        Ok(agents.get(&agent_id).cloned())
    }

    async fn put(&self, agent: Agent) -> Result<()> {
        let mut agents = self.agents.write().await;
        agents.insert(agent.agent_id, agent);
        Ok(())
    }
}

pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<Uuid, Transaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryTransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, transaction: Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(transaction.transaction_id, transaction);
        Ok(())
    }

    async fn get(&self, transaction_id: Uuid) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&transaction_id).cloned())
    }

    async fn update_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
        provider_transaction_id: Option<String>,
    ) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&transaction_id)
            .ok_or_else(|| AgentOpsError::NotFound(format!("transaction {}", transaction_id)))?;

        if !transaction.status.can_transition_to(status) {
            return Err(AgentOpsError::Storage(format!(
                "illegal status transition {} -> {} for transaction {}",
                transaction.status, status, transaction_id
            )));
        }

        transaction.status = status;
        if let Some(provider_id) = provider_transaction_id {
            transaction.provider_transaction_id = Some(provider_id);
        }
        transaction.updated_at = Utc::now();
        Ok(())
    }

    async fn attach_provider_id(
        &self,
        transaction_id: Uuid,
        provider_transaction_id: String,
    ) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&transaction_id)
            .ok_or_else(|| AgentOpsError::NotFound(format!("transaction {}", transaction_id)))?;

        transaction.provider_transaction_id = Some(provider_transaction_id);
        transaction.updated_at = Utc::now();
        Ok(())
    }

    async fn pending_oldest_first(&self, limit: usize) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;

        let mut pending: Vec<Transaction> = transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|t| t.created_at);
        pending.truncate(limit);
        Ok(pending)
    }
}

pub struct InMemoryApprovalStore {
    requests: Arc<RwLock<HashMap<Uuid, ApprovalRequest>>>,
}

impl InMemoryApprovalStore {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryApprovalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn insert(&self, request: ApprovalRequest) -> Result<()> {
        let mut requests = self.requests.write().await;
        requests.insert(request.approval_request_id, request);
        Ok(())
    }

    async fn get(&self, approval_request_id: Uuid) -> Result<Option<ApprovalRequest>> {
        let requests = self.requests.read().await;
        Ok(requests.get(&approval_request_id).cloned())
    }

    async fn resolve(
        &self,
        approval_request_id: Uuid,
        status: ApprovalStatus,
    ) -> Result<ApprovalRequest> {
        let mut requests = self.requests.write().await;
        let request = requests
            .get_mut(&approval_request_id)
            .ok_or_else(|| AgentOpsError::NotFound(format!("approval {}", approval_request_id)))?;

        if request.status != ApprovalStatus::Pending {
            return Err(AgentOpsError::Validation(format!(
                "approval request {} already resolved",
                approval_request_id
            )));
        }

        request.status = status;
        request.resolved_at = Some(Utc::now());
        Ok(request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CorrelationId, Plan};
    use rust_decimal::Decimal;

    fn pending_transaction() -> Transaction {
        Transaction {
            transaction_id: Uuid::new_v4(),
            from_user_id: Uuid::new_v4(),
            to_user_id: Uuid::new_v4(),
            from_address: "0xfrom".into(),
            to_address: "0xto".into(),
            amount: Decimal::new(1000, 2),
            token_contract: "0xToken".into(),
            token_symbol: "USDC".into(),
            chain_id: 8453,
            status: TransactionStatus::Pending,
            provider_transaction_id: None,
            message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_update_status_refuses_terminal_reversal() {
        let store = InMemoryTransactionStore::new();
        let tx = pending_transaction();
        let id = tx.transaction_id;
        store.insert(tx).await.unwrap();

        store
            .update_status(id, TransactionStatus::Confirmed, Some("0xhash".into()))
            .await
            .unwrap();

        let err = store
            .update_status(id, TransactionStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentOpsError::Storage(_)));

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Confirmed);
        assert_eq!(stored.provider_transaction_id.as_deref(), Some("0xhash"));
    }

    #[tokio::test]
    async fn test_pending_oldest_first_is_bounded() {
        let store = InMemoryTransactionStore::new();
        for _ in 0..5 {
            store.insert(pending_transaction()).await.unwrap();
        }
        let mut confirmed = pending_transaction();
        confirmed.status = TransactionStatus::Confirmed;
        store.insert(confirmed).await.unwrap();

        let batch = store.pending_oldest_first(3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch.iter().all(|t| t.status == TransactionStatus::Pending));
        assert!(batch.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn test_approval_resolution_is_single_shot() {
        let store = InMemoryApprovalStore::new();
        let request = ApprovalRequest {
            approval_request_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            correlation_id: CorrelationId::mint(),
            input: "pay $10 to X".into(),
            plan_snapshot: Plan {
                plan_id: Uuid::new_v4(),
                steps: vec![],
                created_at: Utc::now(),
            },
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };
        let id = request.approval_request_id;
        store.insert(request).await.unwrap();

        let resolved = store.resolve(id, ApprovalStatus::Approved).await.unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Approved);
        assert!(resolved.resolved_at.is_some());

        let err = store.resolve(id, ApprovalStatus::Rejected).await.unwrap_err();
        assert!(matches!(err, AgentOpsError::Validation(_)));
    }
}
