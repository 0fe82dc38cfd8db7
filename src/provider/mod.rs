//! Payment/blockchain provider client
//!
//! The provider exposes create-payment, complete-payment and get-status
//! endpoints. Its "complete" acknowledgement is not confirmation:
//! transactions stay pending until the reconciliation sweep observes a
//! terminal status.

use crate::error::AgentOpsError;
use crate::models::TransactionStatus;
use crate::Result;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, warn};

/// A payment created but not yet completed on the provider side.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPayment {
    pub payment_id: String,
}

/// Result of the complete-payment call. Insufficient funds is a
/// distinct branch carrying a remediation link, not an error.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    Completed { provider_transaction_id: String },
    InsufficientFunds { payment_link: String },
}

/// Provider-side status of a previously completed payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub status: String,
    pub transaction_hash: Option<String>,
}

/// Map the provider's status vocabulary onto ours.
/// Unrecognized values stay pending; a later sweep will retry them.
pub fn map_provider_status(raw: &str) -> TransactionStatus {
    match raw {
        "CONFIRMED" => TransactionStatus::Confirmed,
        "FAILED" => TransactionStatus::Failed,
        "QUEUED" | "SUBMITTED" => TransactionStatus::Pending,
        other => {
            warn!(status = other, "Unrecognized provider status, keeping pending");
            TransactionStatus::Pending
        }
    }
}

#[async_trait::async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment(
        &self,
        from_address: &str,
        to_address: &str,
        amount: &Decimal,
        token_contract: &str,
        chain_id: u64,
    ) -> Result<CreatedPayment>;

    async fn complete_payment(&self, payment_id: &str) -> Result<CompletionOutcome>;

    async fn payment_status(&self, provider_transaction_id: &str) -> Result<ProviderStatus>;

    /// Native or ERC-20 balance for an address; token_contract None
    /// means the chain's native asset.
    async fn balance(&self, address: &str, token_contract: Option<&str>) -> Result<Decimal>;
}

//
// ================= HTTP Provider =================
//

/// HTTP-backed provider client (connection-pooled).
pub struct HttpPaymentProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentProvider {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_env() -> Option<Self> {
        let base_url = env::var("PROVIDER_API_BASE_URL").ok()?;
        let api_key = env::var("PROVIDER_API_KEY").unwrap_or_default();
        Some(Self::new(base_url, api_key))
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        self.client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!("Provider request failed for {}: {}", path, e);
                AgentOpsError::ExternalService(format!("provider request failed: {}", e))
            })
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AgentOpsError::ExternalService(format!("provider request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| AgentOpsError::ExternalService(format!("invalid provider JSON: {}", e)))?;

        if !status.is_success() {
            return Err(AgentOpsError::ExternalService(format!(
                "provider returned {} for {}: {}",
                status, path, body
            )));
        }

        Ok(body)
    }
}

#[async_trait::async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn create_payment(
        &self,
        from_address: &str,
        to_address: &str,
        amount: &Decimal,
        token_contract: &str,
        chain_id: u64,
    ) -> Result<CreatedPayment> {
        let response = self
            .post_json(
                "/v1/payments",
                &json!({
                    "from": from_address,
                    "to": to_address,
                    "amount": amount.to_string(),
                    "tokenContract": token_contract,
                    "chainId": chain_id,
                }),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentOpsError::ExternalService(format!(
                "create payment returned {}: {}",
                status, body
            )));
        }

        response
            .json::<CreatedPayment>()
            .await
            .map_err(|e| AgentOpsError::ExternalService(format!("invalid provider JSON: {}", e)))
    }

    async fn complete_payment(&self, payment_id: &str) -> Result<CompletionOutcome> {
        let response = self
            .post_json(&format!("/v1/payments/{}/complete", payment_id), &json!({}))
            .await?;

        let status = response.status();

        // 402 means the payer lacks funds; the provider returns a
        // remediation link for topping up. Not a failure.
        if status == StatusCode::PAYMENT_REQUIRED {
            let body: Value = response
                .json()
                .await
                .map_err(|e| AgentOpsError::ExternalService(format!("invalid provider JSON: {}", e)))?;
            let payment_link = body
                .get("paymentLink")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(CompletionOutcome::InsufficientFunds { payment_link });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentOpsError::ExternalService(format!(
                "complete payment returned {}: {}",
                status, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentOpsError::ExternalService(format!("invalid provider JSON: {}", e)))?;

        let provider_transaction_id = body
            .get("transactionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AgentOpsError::ExternalService("complete payment response missing transactionId".into())
            })?
            .to_string();

        Ok(CompletionOutcome::Completed {
            provider_transaction_id,
        })
    }

    async fn payment_status(&self, provider_transaction_id: &str) -> Result<ProviderStatus> {
        let body = self
            .get_json(&format!("/v1/payments/{}/status", provider_transaction_id))
            .await?;

        Ok(ProviderStatus {
            status: body
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN")
                .to_string(),
            transaction_hash: body
                .get("transactionHash")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
        })
    }

    async fn balance(&self, address: &str, token_contract: Option<&str>) -> Result<Decimal> {
        let path = match token_contract {
            Some(token) => format!("/v1/balances/{}?token={}", address, token),
            None => format!("/v1/balances/{}", address),
        };
        let body = self.get_json(&path).await?;

        body.get("balance")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Decimal>().ok())
            .ok_or_else(|| AgentOpsError::ExternalService("balance response missing balance".into()))
    }
}

//
// ================= Mock Provider =================
//

/// Mock provider for development and tests. Payments complete
/// immediately and report SUBMITTED until marked otherwise.
pub struct MockPaymentProvider {
    sequence: AtomicU64,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self {
            sequence: AtomicU64::new(1),
        }
    }
}

impl Default for MockPaymentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_payment(
        &self,
        _from_address: &str,
        _to_address: &str,
        _amount: &Decimal,
        _token_contract: &str,
        _chain_id: u64,
    ) -> Result<CreatedPayment> {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        Ok(CreatedPayment {
            payment_id: format!("mock-pay-{}", n),
        })
    }

    async fn complete_payment(&self, payment_id: &str) -> Result<CompletionOutcome> {
        Ok(CompletionOutcome::Completed {
            provider_transaction_id: format!("mock-tx-{}", payment_id),
        })
    }

    async fn payment_status(&self, _provider_transaction_id: &str) -> Result<ProviderStatus> {
        Ok(ProviderStatus {
            status: "SUBMITTED".to_string(),
            transaction_hash: None,
        })
    }

    async fn balance(&self, _address: &str, _token_contract: Option<&str>) -> Result<Decimal> {
        Ok(Decimal::new(100_000, 2))
    }
}
