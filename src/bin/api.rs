use creator_ops_agent::{
    agent::Orchestrator,
    api::{start_server, state_from_env},
    balance::BalanceCache,
    dispatch::StepPipeline,
    idempotency::{IdempotencyStore, InMemoryIdempotencyStore},
    ledger::{ActivityLedger, AuditTrail, InMemoryAuditTrail, InMemoryLedger},
    planner::{GeminiPlanner, MockPlanner, Planner},
    provider::{HttpPaymentProvider, MockPaymentProvider, PaymentProvider},
    spend::{InMemorySpendTracker, SpendTracker},
    state::{
        postgres::PgStores, ApprovalStore, InMemoryAgentStore, InMemoryApprovalStore,
        InMemoryTransactionStore, TransactionStore,
    },
    tools::create_default_registry,
    transfer::{confirmation::ConfirmationVerifier, TransferGateway},
    reconcile::ReconciliationSweep,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Creator Operations Agent - API Server");
    info!(port = api_port, "Starting");

    // Storage: Postgres when DATABASE_URL is set, in-memory otherwise.
    let pg = PgStores::from_env().await?;

    let (idempotency, spend, transactions, approvals, ledger, audit): (
        Arc<dyn IdempotencyStore>,
        Arc<dyn SpendTracker>,
        Arc<dyn TransactionStore>,
        Arc<dyn ApprovalStore>,
        Arc<dyn ActivityLedger>,
        Arc<dyn AuditTrail>,
    ) = match pg {
        Some(pg) => {
            info!("Using Postgres storage");
            let pg = Arc::new(pg);
            (
                pg.clone(),
                pg.clone(),
                pg.clone(),
                pg.clone(),
                pg.clone(),
                pg,
            )
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory storage");
            (
                Arc::new(InMemoryIdempotencyStore::new()),
                Arc::new(InMemorySpendTracker::new()),
                Arc::new(InMemoryTransactionStore::new()),
                Arc::new(InMemoryApprovalStore::new()),
                Arc::new(InMemoryLedger::new()),
                Arc::new(InMemoryAuditTrail::new()),
            )
        }
    };

    // Payment provider: HTTP when configured, mock otherwise.
    let provider: Arc<dyn PaymentProvider> = match HttpPaymentProvider::from_env() {
        Some(provider) => Arc::new(provider),
        None => {
            warn!("PROVIDER_API_BASE_URL not set; using mock payment provider");
            Arc::new(MockPaymentProvider::new())
        }
    };

    // Planner: Gemini when a key is configured, mock otherwise.
    let planner: Arc<dyn Planner> = match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Arc::new(GeminiPlanner::new(key)),
        _ => {
            warn!("GEMINI_API_KEY not set; using mock planner");
            Arc::new(MockPlanner)
        }
    };

    let gateway = Arc::new(TransferGateway::new(
        idempotency,
        spend,
        transactions.clone(),
        provider.clone(),
        audit.clone(),
    ));

    let registry = create_default_registry(gateway.clone());
    let pipeline = Arc::new(StepPipeline::new(registry, ledger.clone()));

    let agents = Arc::new(InMemoryAgentStore::new());
    let orchestrator = Arc::new(Orchestrator::new(
        agents,
        approvals,
        ledger,
        planner,
        pipeline,
    ));

    let sweep = Arc::new(ReconciliationSweep::new(
        transactions,
        provider.clone(),
        audit,
    ));

    let balances = Arc::new(BalanceCache::new(provider));

    // Confirmation tokens require a shared secret; without one the
    // check is disabled.
    let verifier = match std::env::var("TRANSFER_CONFIRMATION_SECRET") {
        Ok(secret) if !secret.is_empty() => {
            let threshold = std::env::var("LARGE_TRANSFER_THRESHOLD")
                .ok()
                .and_then(|v| Decimal::from_str(&v).ok())
                .unwrap_or_else(|| Decimal::from(1_000));
            Some(Arc::new(ConfirmationVerifier::new(
                secret.into_bytes(),
                threshold,
            )))
        }
        _ => {
            warn!("TRANSFER_CONFIRMATION_SECRET not set; transfer confirmation disabled");
            None
        }
    };

    let state = state_from_env(orchestrator, gateway, sweep, balances, verifier);

    info!("Orchestrator initialized, starting API server");
    start_server(state, api_port).await?;

    Ok(())
}
