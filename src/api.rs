//! REST API server for the creator operations core
//!
//! Exposes agent invocation, transfers, reconciliation, and balance
//! lookups over HTTP.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::Orchestrator;
use crate::balance::BalanceCache;
use crate::error::AgentOpsError;
use crate::models::{ApprovalDecision, CorrelationId, TransferOutcome, TransferRequest};
use crate::reconcile::ReconciliationSweep;
use crate::transfer::confirmation::{ConfirmationToken, ConfirmationVerifier};
use crate::transfer::TransferGateway;

/// =============================
/// Request Models
/// =============================

/// `ownerId` stands in for the authenticated principal: the API runs
/// behind a shared bearer token, not per-user sessions, so the caller
/// asserts who they act as and the orchestrator checks that principal
/// against the agent's owner. Same for `actorId` on approval
/// resolution.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub agent_id: Uuid,
    pub owner_id: Uuid,
    pub input: String,
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub requires_approval: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveApprovalRequest {
    pub decision: ApprovalDecision,
    pub actor_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    #[serde(flatten)]
    pub request: TransferRequest,
    pub confirmation: Option<ConfirmationToken>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub token: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn error_response(e: AgentOpsError) -> (StatusCode, Json<ApiResponse>) {
    (e.status_code(), Json(ApiResponse::error(e.to_string())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub gateway: Arc<TransferGateway>,
    pub sweep: Arc<ReconciliationSweep>,
    pub balances: Arc<BalanceCache>,
    pub verifier: Option<Arc<ConfirmationVerifier>>,
    /// Shared bearer token; None disables auth (dev mode only).
    pub bearer_token: Option<String>,
}

/// =============================
/// Auth
/// =============================

fn check_bearer(state: &ApiState, headers: &HeaderMap) -> crate::Result<()> {
    let Some(expected) = &state.bearer_token else {
        return Ok(());
    };

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(AgentOpsError::Unauthorized),
    }
}

fn correlation_from_headers(headers: &HeaderMap) -> CorrelationId {
    headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Uuid>().ok())
        .map(CorrelationId)
        .unwrap_or_else(CorrelationId::mint)
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Agent Invocation
/// =============================

async fn invoke_agent(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<InvokeRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if let Err(e) = check_bearer(&state, &headers) {
        return error_response(e);
    }

    info!(agent_id = %req.agent_id, "Received invocation request");

    match state
        .orchestrator
        .invoke(
            req.agent_id,
            req.owner_id,
            &req.input,
            req.context.as_ref(),
            req.requires_approval,
        )
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(ApiResponse::success(outcome))),
        Err(e) => error_response(e),
    }
}

async fn resolve_approval(
    State(state): State<ApiState>,
    Path(approval_request_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<ResolveApprovalRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if let Err(e) = check_bearer(&state, &headers) {
        return error_response(e);
    }

    info!(
        approval_request_id = %approval_request_id,
        decision = ?req.decision,
        "Resolving approval request"
    );

    match state
        .orchestrator
        .resolve_approval(approval_request_id, req.decision, req.actor_id)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(ApiResponse::success(outcome))),
        Err(e) => error_response(e),
    }
}

/// =============================
/// Transfers
/// =============================

async fn create_transfer(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<TransferBody>,
) -> (StatusCode, Json<ApiResponse>) {
    if let Err(e) = check_bearer(&state, &headers) {
        return error_response(e);
    }

    if let Some(verifier) = &state.verifier {
        let Some(token) = &body.confirmation else {
            return error_response(AgentOpsError::ConfirmationToken(
                "confirmation token required".to_string(),
            ));
        };

        if let Err(e) = verifier.verify(token, chrono::Utc::now()) {
            warn!(error = %e, "Confirmation token rejected");
            return error_response(e);
        }
    }

    let idempotency_key = headers
        .get("x-idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let correlation_id = correlation_from_headers(&headers);

    match state
        .gateway
        .transfer(body.request, idempotency_key, correlation_id)
        .await
    {
        Ok(outcome) => {
            // Insufficient funds is a successful call with a
            // remediation link, surfaced as 402.
            let status = match &outcome {
                TransferOutcome::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
                TransferOutcome::Pending { .. } => StatusCode::OK,
            };
            (status, Json(ApiResponse::success(outcome)))
        }
        Err(e) => error_response(e),
    }
}

/// =============================
/// Reconciliation
/// =============================

async fn sync_transactions(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> (StatusCode, Json<ApiResponse>) {
    if let Err(e) = check_bearer(&state, &headers) {
        return error_response(e);
    }

    match state.sweep.sync().await {
        Ok(report) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "message": "Transaction sync completed",
                "processed": report.processed,
                "updated": report.updated,
                "unchanged": report.unchanged,
                "errors": report.errors,
            }))),
        ),
        Err(e) => error_response(e),
    }
}

/// =============================
/// Balances
/// =============================

async fn get_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    axum::extract::Query(query): axum::extract::Query<BalanceQuery>,
    headers: HeaderMap,
) -> (StatusCode, Json<ApiResponse>) {
    if let Err(e) = check_bearer(&state, &headers) {
        return error_response(e);
    }

    match state.balances.balance(&address, query.token.as_deref()).await {
        Ok(balance) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "address": address,
                "token": query.token,
                "balance": balance.to_string(),
            }))),
        ),
        Err(e) => error_response(e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agents/invoke", post(invoke_agent))
        .route("/agents/approvals/:id/resolve", post(resolve_approval))
        .route("/transfers", post(create_transfer))
        .route("/transactions/sync", post(sync_transactions))
        .route("/balances/:address", get(get_balance))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub fn state_from_env(
    orchestrator: Arc<Orchestrator>,
    gateway: Arc<TransferGateway>,
    sweep: Arc<ReconciliationSweep>,
    balances: Arc<BalanceCache>,
    verifier: Option<Arc<ConfirmationVerifier>>,
) -> ApiState {
    let bearer_token = env::var("API_BEARER_TOKEN").ok().filter(|t| !t.is_empty());
    if bearer_token.is_none() {
        warn!("API_BEARER_TOKEN not set; requests will not be authenticated");
    }

    ApiState {
        orchestrator,
        gateway,
        sweep,
        balances,
        verifier,
        bearer_token,
    }
}

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_check() {
        let headers_with = |value: &str| {
            let mut headers = HeaderMap::new();
            headers.insert("authorization", value.parse().unwrap());
            headers
        };

        let state = |token: Option<&str>| ApiState {
            orchestrator: test_orchestrator(),
            gateway: test_gateway(),
            sweep: test_sweep(),
            balances: test_balances(),
            verifier: None,
            bearer_token: token.map(|t| t.to_string()),
        };

        let secured = state(Some("secret"));
        assert!(check_bearer(&secured, &headers_with("Bearer secret")).is_ok());
        assert!(check_bearer(&secured, &headers_with("Bearer wrong")).is_err());
        assert!(check_bearer(&secured, &HeaderMap::new()).is_err());

        let open = state(None);
        assert!(check_bearer(&open, &HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_correlation_header_parsing() {
        let mut headers = HeaderMap::new();
        let id = Uuid::new_v4();
        headers.insert("x-correlation-id", id.to_string().parse().unwrap());
        assert_eq!(correlation_from_headers(&headers), CorrelationId(id));

        // Missing or invalid header mints a fresh id.
        headers.insert("x-correlation-id", "garbage".parse().unwrap());
        let minted = correlation_from_headers(&headers);
        assert_ne!(minted, CorrelationId(id));
    }

    fn test_orchestrator() -> Arc<Orchestrator> {
        use crate::dispatch::StepPipeline;
        use crate::ledger::InMemoryLedger;
        use crate::planner::MockPlanner;
        use crate::state::{InMemoryAgentStore, InMemoryApprovalStore};
        use crate::tools::ToolRegistry;

        let ledger = Arc::new(InMemoryLedger::new());
        Arc::new(Orchestrator::new(
            Arc::new(InMemoryAgentStore::new()),
            Arc::new(InMemoryApprovalStore::new()),
            ledger.clone(),
            Arc::new(MockPlanner),
            Arc::new(StepPipeline::new(ToolRegistry::new(), ledger)),
        ))
    }

    fn test_gateway() -> Arc<TransferGateway> {
        use crate::idempotency::InMemoryIdempotencyStore;
        use crate::ledger::InMemoryAuditTrail;
        use crate::provider::MockPaymentProvider;
        use crate::spend::InMemorySpendTracker;
        use crate::state::InMemoryTransactionStore;

        Arc::new(TransferGateway::new(
            Arc::new(InMemoryIdempotencyStore::new()),
            Arc::new(InMemorySpendTracker::new()),
            Arc::new(InMemoryTransactionStore::new()),
            Arc::new(MockPaymentProvider::new()),
            Arc::new(InMemoryAuditTrail::new()),
        ))
    }

    fn test_sweep() -> Arc<ReconciliationSweep> {
        use crate::ledger::InMemoryAuditTrail;
        use crate::provider::MockPaymentProvider;
        use crate::state::InMemoryTransactionStore;

        Arc::new(ReconciliationSweep::new(
            Arc::new(InMemoryTransactionStore::new()),
            Arc::new(MockPaymentProvider::new()),
            Arc::new(InMemoryAuditTrail::new()),
        ))
    }

    fn test_balances() -> Arc<BalanceCache> {
        use crate::provider::MockPaymentProvider;

        Arc::new(BalanceCache::new(Arc::new(MockPaymentProvider::new())))
    }
}
