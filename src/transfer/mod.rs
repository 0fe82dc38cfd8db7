//! Transfer gateway
//!
//! Validates, deduplicates, and executes a single transfer against the
//! external payment provider. All-or-nothing after the transaction row
//! exists: any provider failure marks the row and the idempotency
//! record failed and propagates. The one exception is insufficient
//! funds, which is a distinct outcome, not a failure.

pub mod confirmation;

use crate::error::AgentOpsError;
use crate::idempotency::{request_hash, BeginOutcome, IdempotencyStore};
use crate::ledger::{AuditEvent, AuditTrail};
use crate::models::{
    CorrelationId, Transaction, TransactionStatus, TransferOutcome, TransferRequest,
};
use crate::provider::{CompletionOutcome, PaymentProvider};
use crate::spend::SpendTracker;
use crate::state::TransactionStore;
use crate::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Executes transfers. One instance per process, collaborators injected.
pub struct TransferGateway {
    idempotency: Arc<dyn IdempotencyStore>,
    spend: Arc<dyn SpendTracker>,
    transactions: Arc<dyn TransactionStore>,
    provider: Arc<dyn PaymentProvider>,
    audit: Arc<dyn AuditTrail>,
}

impl TransferGateway {
    pub fn new(
        idempotency: Arc<dyn IdempotencyStore>,
        spend: Arc<dyn SpendTracker>,
        transactions: Arc<dyn TransactionStore>,
        provider: Arc<dyn PaymentProvider>,
        audit: Arc<dyn AuditTrail>,
    ) -> Self {
        Self {
            idempotency,
            spend,
            transactions,
            provider,
            audit,
        }
    }

    /// Execute a transfer. The idempotency key is optional but required
    /// for retry safety; without one, every call executes.
    pub async fn transfer(
        &self,
        request: TransferRequest,
        idempotency_key: Option<String>,
        correlation_id: CorrelationId,
    ) -> Result<TransferOutcome> {
        let amount = validate(&request)?;

        // Register execution intent before any external side effect.
        if let Some(key) = &idempotency_key {
            let hash = request_hash(
                request.from_user_id,
                request.to_user_id,
                &amount,
                &request.token_contract,
                request.chain_id,
            );

            match self
                .idempotency
                .begin(key, request.from_user_id, &hash)
                .await?
            {
                BeginOutcome::Started => {}
                BeginOutcome::Completed(cached) => {
                    info!(key = %key, "Replaying cached transfer response");
                    return Ok(serde_json::from_value(cached)?);
                }
                BeginOutcome::InProgress => return Err(AgentOpsError::IdempotencyInProgress),
                BeginOutcome::Conflict => return Err(AgentOpsError::IdempotencyConflict),
            }
        }

        match self
            .execute(&request, amount, idempotency_key.as_deref(), correlation_id)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Release the key so a later retry can start over. A
                // failed release must not mask the provider error.
                if let Some(key) = &idempotency_key {
                    if let Err(release_err) = self.idempotency.fail(key).await {
                        warn!(
                            key = %key,
                            error = %release_err,
                            "Failed to release idempotency key"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        request: &TransferRequest,
        amount: Decimal,
        idempotency_key: Option<&str>,
        correlation_id: CorrelationId,
    ) -> Result<TransferOutcome> {
        // Daily cap check rejects before any Transaction row exists.
        let today = Utc::now().date_naive();
        let count = self.spend.try_reserve(request.from_user_id, today).await?;

        let transaction = Transaction {
            transaction_id: Uuid::new_v4(),
            from_user_id: request.from_user_id,
            to_user_id: request.to_user_id,
            from_address: request.from_address.clone(),
            to_address: request.to_address.clone(),
            amount,
            token_contract: request.token_contract.clone(),
            token_symbol: request.token_symbol.clone(),
            chain_id: request.chain_id,
            status: TransactionStatus::Pending,
            provider_transaction_id: None,
            message: request.message.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let transaction_id = transaction.transaction_id;
        self.transactions.insert(transaction).await?;

        info!(
            transaction_id = %transaction_id,
            correlation_id = %correlation_id,
            daily_count = count,
            "Transfer accepted"
        );

        // Two-phase provider call: create, then complete.
        let created = match self
            .provider
            .create_payment(
                &request.from_address,
                &request.to_address,
                &amount,
                &request.token_contract,
                request.chain_id,
            )
            .await
        {
            Ok(created) => created,
            Err(e) => {
                self.mark_failed(transaction_id).await?;
                return Err(e);
            }
        };

        match self.provider.complete_payment(&created.payment_id).await {
            Ok(CompletionOutcome::Completed {
                provider_transaction_id,
            }) => {
                // Completion is acknowledgement, not confirmation: the
                // row stays pending until reconciliation observes a
                // terminal provider status.
                self.transactions
                    .attach_provider_id(transaction_id, provider_transaction_id.clone())
                    .await?;

                self.audit
                    .record(AuditEvent::new(
                        Some(correlation_id),
                        Some(request.from_user_id),
                        "transfer_executed",
                        serde_json::json!({
                            "transactionId": transaction_id,
                            "providerTransactionId": provider_transaction_id,
                            "amount": amount.to_string(),
                            "tokenContract": request.token_contract,
                        }),
                    ))
                    .await?;

                let outcome = TransferOutcome::Pending {
                    transaction_id,
                    provider_transaction_id,
                };

                // Cache the response verbatim for future retries.
                if let Some(key) = idempotency_key {
                    self.idempotency
                        .complete(key, serde_json::to_value(&outcome)?)
                        .await?;
                }

                Ok(outcome)
            }
            Ok(CompletionOutcome::InsufficientFunds { payment_link }) => {
                // Not a failure: the transaction row stays pending and
                // the caller settles via the payment link. The sweep
                // picks the row up once funded.
                self.transactions
                    .attach_provider_id(transaction_id, created.payment_id.clone())
                    .await?;

                warn!(
                    transaction_id = %transaction_id,
                    "Transfer pending on insufficient funds"
                );

                let outcome = TransferOutcome::InsufficientFunds {
                    transaction_id,
                    payment_link,
                };

                // The key caches this outcome too, so a retry replays
                // the same response instead of seeing an in-progress
                // record it can never resolve.
                if let Some(key) = idempotency_key {
                    self.idempotency
                        .complete(key, serde_json::to_value(&outcome)?)
                        .await?;
                }

                Ok(outcome)
            }
            Err(e) => {
                self.mark_failed(transaction_id).await?;
                Err(e)
            }
        }
    }

    async fn mark_failed(&self, transaction_id: Uuid) -> Result<()> {
        self.transactions
            .update_status(transaction_id, TransactionStatus::Failed, None)
            .await
    }
}

fn validate(request: &TransferRequest) -> Result<Decimal> {
    if request.from_address.trim().is_empty() || request.to_address.trim().is_empty() {
        return Err(AgentOpsError::Validation(
            "fromAddress and toAddress are required".into(),
        ));
    }
    if request.token_contract.trim().is_empty() {
        return Err(AgentOpsError::Validation("tokenContract is required".into()));
    }

    let amount: Decimal = request
        .amount
        .parse()
        .map_err(|_| AgentOpsError::Validation("Invalid amount".into()))?;
    if amount <= Decimal::ZERO {
        return Err(AgentOpsError::Validation("Invalid amount".into()));
    }

    Ok(amount)
}
