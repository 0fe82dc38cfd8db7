use creator_ops_agent::{
    agent::Orchestrator,
    dispatch::StepPipeline,
    idempotency::InMemoryIdempotencyStore,
    ledger::{ActivityLedger, InMemoryAuditTrail, InMemoryLedger},
    models::{Agent, AgentStatus, InvocationOutcome},
    planner::MockPlanner,
    provider::MockPaymentProvider,
    spend::InMemorySpendTracker,
    state::{AgentStore, InMemoryAgentStore, InMemoryApprovalStore, InMemoryTransactionStore},
    tools::create_default_registry,
    transfer::TransferGateway,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Creator operations agent demo starting");

    // Create components (all in-memory, mock provider, mock planner)
    let agents = Arc::new(InMemoryAgentStore::new());
    let approvals = Arc::new(InMemoryApprovalStore::new());
    let ledger = Arc::new(InMemoryLedger::new());

    let gateway = Arc::new(TransferGateway::new(
        Arc::new(InMemoryIdempotencyStore::new()),
        Arc::new(InMemorySpendTracker::new()),
        Arc::new(InMemoryTransactionStore::new()),
        Arc::new(MockPaymentProvider::new()),
        Arc::new(InMemoryAuditTrail::new()),
    ));

    let registry = create_default_registry(gateway);
    let pipeline = Arc::new(StepPipeline::new(registry, ledger.clone()));

    let orchestrator = Orchestrator::new(
        agents.clone(),
        approvals,
        ledger.clone(),
        Arc::new(MockPlanner),
        pipeline,
    );

    // Seed a sample agent
    let agent = Agent {
        agent_id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        name: "creator-ops-demo".to_string(),
        status: AgentStatus::Active,
        tools_enabled: ["wallet_transfer", "audience_report", "revenue_summary"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        requires_approval: false,
        spend_limit: None,
        created_at: Utc::now(),
    };
    agents.put(agent.clone()).await?;

    info!(
        agent_id = %agent.agent_id,
        "Running a sample invocation"
    );

    match orchestrator
        .invoke(
            agent.agent_id,
            agent.owner_id,
            "Pay 10 USDC to my video editor",
            None,
            false,
        )
        .await
    {
        Ok(InvocationOutcome::Completed {
            correlation_id,
            response,
            execution_results,
            ..
        }) => {
            info!("Invocation successful");
            println!("\n=== INVOCATION RESULT ===");
            println!("Correlation ID: {}", correlation_id);
            println!("Response: {}", response);
            println!("\nSteps:");
            for (i, result) in execution_results.iter().enumerate() {
                println!(
                    "  {}: {} [{:?}] ({} ms)",
                    i + 1,
                    result.tool,
                    result.status,
                    result.latency_ms
                );
            }

            println!("\nLedger:");
            let entries = ledger.entries_for(correlation_id).await?;
            for entry in entries {
                println!(
                    "  {:?} [{:?}] {}",
                    entry.activity_type, entry.tool_status, entry.created_at
                );
            }
            Ok(())
        }
        Ok(other) => {
            println!("Unexpected outcome: {:?}", other);
            Ok(())
        }
        Err(e) => {
            eprintln!("Invocation failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
