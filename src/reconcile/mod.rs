//! Reconciliation sweep
//!
//! Periodic batch job that resolves transactions the gateway left
//! pending against the provider's authoritative status. Runs off the
//! request path; produces a count report for operational tooling, no
//! user-facing response.

use crate::ledger::{AuditEvent, AuditTrail};
use crate::models::{Transaction, TransactionStatus};
use crate::provider::{map_provider_status, PaymentProvider};
use crate::state::TransactionStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on transactions examined per run.
pub const SWEEP_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub processed: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub errors: usize,
}

pub struct ReconciliationSweep {
    transactions: Arc<dyn TransactionStore>,
    provider: Arc<dyn PaymentProvider>,
    audit: Arc<dyn AuditTrail>,
}

impl ReconciliationSweep {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        provider: Arc<dyn PaymentProvider>,
        audit: Arc<dyn AuditTrail>,
    ) -> Self {
        Self {
            transactions,
            provider,
            audit,
        }
    }

    /// One sweep over the oldest pending transactions. A failure on
    /// item i never prevents items i+1..n from being processed.
    pub async fn sync(&self) -> Result<SyncReport> {
        let batch = self
            .transactions
            .pending_oldest_first(SWEEP_BATCH_SIZE)
            .await?;

        let mut report = SyncReport::default();

        debug!(batch = batch.len(), "Starting reconciliation sweep");

        for transaction in &batch {
            report.processed += 1;

            match self.reconcile_one(transaction).await {
                Ok(true) => report.updated += 1,
                Ok(false) => report.unchanged += 1,
                Err(e) => {
                    warn!(
                        transaction_id = %transaction.transaction_id,
                        error = %e,
                        "Reconciliation item failed"
                    );
                    report.errors += 1;
                }
            }
        }

        info!(
            processed = report.processed,
            updated = report.updated,
            unchanged = report.unchanged,
            errors = report.errors,
            "Reconciliation sweep complete"
        );

        Ok(report)
    }

    /// Returns true when the transaction moved to a terminal status.
    async fn reconcile_one(&self, transaction: &Transaction) -> Result<bool> {
        let Some(provider_id) = &transaction.provider_transaction_id else {
            // Never reached the provider; nothing to reconcile yet.
            return Ok(false);
        };

        let provider_status = self.provider.payment_status(provider_id).await?;
        let mapped = map_provider_status(&provider_status.status);

        if mapped == TransactionStatus::Pending {
            return Ok(false);
        }

        self.transactions
            .update_status(
                transaction.transaction_id,
                mapped,
                provider_status.transaction_hash.clone(),
            )
            .await?;

        self.audit
            .record(AuditEvent::new(
                None,
                None,
                "transaction_reconciled",
                serde_json::json!({
                    "transactionId": transaction.transaction_id,
                    "previousStatus": transaction.status.to_string(),
                    "newStatus": mapped.to_string(),
                    "providerStatus": provider_status.status,
                    "transactionHash": provider_status.transaction_hash,
                }),
            ))
            .await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentOpsError;
    use crate::ledger::InMemoryAuditTrail;
    use crate::provider::{CompletionOutcome, CreatedPayment, ProviderStatus};
    use crate::state::InMemoryTransactionStore;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use uuid::Uuid;

    /// Provider with a scripted status per provider transaction id.
    struct ScriptedProvider {
        statuses: HashMap<String, ProviderStatus>,
        failing: Vec<String>,
    }

    #[async_trait::async_trait]
    impl PaymentProvider for ScriptedProvider {
        async fn create_payment(
            &self,
            _from: &str,
            _to: &str,
            _amount: &Decimal,
            _token: &str,
            _chain: u64,
        ) -> Result<CreatedPayment> {
            unreachable!("sweep never creates payments")
        }

        async fn complete_payment(&self, _payment_id: &str) -> Result<CompletionOutcome> {
            unreachable!("sweep never completes payments")
        }

        async fn payment_status(&self, provider_transaction_id: &str) -> Result<ProviderStatus> {
            if self.failing.iter().any(|id| id == provider_transaction_id) {
                return Err(AgentOpsError::ExternalService("status lookup failed".into()));
            }
            Ok(self
                .statuses
                .get(provider_transaction_id)
                .cloned()
                .unwrap_or(ProviderStatus {
                    status: "SUBMITTED".into(),
                    transaction_hash: None,
                }))
        }

        async fn balance(&self, _address: &str, _token: Option<&str>) -> Result<Decimal> {
            Ok(Decimal::ZERO)
        }
    }

    fn pending_tx(provider_id: &str) -> Transaction {
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
            provider_transaction_id: Some(provider_id.to_string()),
            message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_sweep_updates_terminal_and_keeps_pending() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let confirmed = pending_tx("p-confirmed");
        let failed = pending_tx("p-failed");
        let queued = pending_tx("p-queued");
        let ids = (
            confirmed.transaction_id,
            failed.transaction_id,
            queued.transaction_id,
        );
        store.insert(confirmed).await.unwrap();
        store.insert(failed).await.unwrap();
        store.insert(queued).await.unwrap();

        let mut statuses = HashMap::new();
        statuses.insert(
            "p-confirmed".to_string(),
            ProviderStatus {
                status: "CONFIRMED".into(),
                transaction_hash: Some("0xhash".into()),
            },
        );
        statuses.insert(
            "p-failed".to_string(),
            ProviderStatus {
                status: "FAILED".into(),
                transaction_hash: None,
            },
        );
        statuses.insert(
            "p-queued".to_string(),
            ProviderStatus {
                status: "QUEUED".into(),
                transaction_hash: None,
            },
        );

        let audit = Arc::new(InMemoryAuditTrail::new());
        let sweep = ReconciliationSweep::new(
            store.clone(),
            Arc::new(ScriptedProvider {
                statuses,
                failing: vec![],
            }),
            audit.clone(),
        );

        let report = sweep.sync().await.unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.updated, 2);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.errors, 0);

        assert_eq!(
            store.get(ids.0).await.unwrap().unwrap().status,
            TransactionStatus::Confirmed
        );
        assert_eq!(
            store.get(ids.0).await.unwrap().unwrap().provider_transaction_id.as_deref(),
            Some("0xhash")
        );
        assert_eq!(
            store.get(ids.1).await.unwrap().unwrap().status,
            TransactionStatus::Failed
        );
        assert_eq!(
            store.get(ids.2).await.unwrap().unwrap().status,
            TransactionStatus::Pending
        );

        // Each update wrote an audit event with prior and new status.
        let events = audit.events_for_action("transaction_reconciled").await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| e.detail["previousStatus"] == "pending"));
    }

    #[tokio::test]
    async fn test_item_failure_is_isolated() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let good = pending_tx("p-good");
        let bad = pending_tx("p-bad");
        let good_id = good.transaction_id;
        store.insert(bad).await.unwrap();
        store.insert(good).await.unwrap();

        let mut statuses = HashMap::new();
        statuses.insert(
            "p-good".to_string(),
            ProviderStatus {
                status: "CONFIRMED".into(),
                transaction_hash: None,
            },
        );

        let sweep = ReconciliationSweep::new(
            store.clone(),
            Arc::new(ScriptedProvider {
                statuses,
                failing: vec!["p-bad".to_string()],
            }),
            Arc::new(InMemoryAuditTrail::new()),
        );

        let report = sweep.sync().await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.updated, 1);

        assert_eq!(
            store.get(good_id).await.unwrap().unwrap().status,
            TransactionStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_unrecognized_status_stays_pending() {
        let store = Arc::new(InMemoryTransactionStore::new());
        let tx = pending_tx("p-weird");
        let id = tx.transaction_id;
        store.insert(tx).await.unwrap();

        let mut statuses = HashMap::new();
        statuses.insert(
            "p-weird".to_string(),
            ProviderStatus {
                status: "SOMETHING_NEW".into(),
                transaction_hash: None,
            },
        );

        let sweep = ReconciliationSweep::new(
            store.clone(),
            Arc::new(ScriptedProvider {
                statuses,
                failing: vec![],
            }),
            Arc::new(InMemoryAuditTrail::new()),
        );

        let report = sweep.sync().await.unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(
            store.get(id).await.unwrap().unwrap().status,
            TransactionStatus::Pending
        );
    }
}
