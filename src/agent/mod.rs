//! Task orchestrator
//!
//! One invocation: authorize, plan, gate on approval, dispatch,
//! synthesize. Every phase writes a ledger entry under the same
//! correlation id so the full lifecycle can be reconstructed later.

use crate::dispatch::StepPipeline;
use crate::error::AgentOpsError;
use crate::ledger::ActivityLedger;
use crate::models::{
    ActivityLogEntry, ActivityType, Agent, AgentStatus, ApprovalDecision, ApprovalRequest,
    ApprovalStatus, CorrelationId, InvocationOutcome, Plan, ToolStatus,
};
use crate::planner::Planner;
use crate::state::{AgentStore, ApprovalStore};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct Orchestrator {
    agents: Arc<dyn AgentStore>,
    approvals: Arc<dyn ApprovalStore>,
    ledger: Arc<dyn ActivityLedger>,
    planner: Arc<dyn Planner>,
    pipeline: Arc<StepPipeline>,
}

impl Orchestrator {
    pub fn new(
        agents: Arc<dyn AgentStore>,
        approvals: Arc<dyn ApprovalStore>,
        ledger: Arc<dyn ActivityLedger>,
        planner: Arc<dyn Planner>,
        pipeline: Arc<StepPipeline>,
    ) -> Self {
        Self {
            agents,
            approvals,
            ledger,
            planner,
            pipeline,
        }
    }

    /// Run one agent invocation end to end.
    pub async fn invoke(
        &self,
        agent_id: Uuid,
        owner_id: Uuid,
        input: &str,
        context: Option<&serde_json::Value>,
        requires_approval: bool,
    ) -> Result<InvocationOutcome> {
        if input.trim().is_empty() {
            return Err(AgentOpsError::Validation("input must not be empty".to_string()));
        }

        // Ownership is checked as existence: a caller probing someone
        // else's agent learns nothing.
        let agent = self
            .agents
            .get(agent_id)
            .await?
            .filter(|a| a.owner_id == owner_id)
            .ok_or_else(|| AgentOpsError::NotFound(format!("Agent {} not found", agent_id)))?;

        if agent.status != AgentStatus::Active {
            return Err(AgentOpsError::AgentNotActive(format!(
                "Agent {} is {}",
                agent_id, agent.status
            )));
        }

        let correlation_id = CorrelationId::mint();
        info!(agent_id = %agent_id, correlation_id = %correlation_id, "Invocation started");

        let plan = self.plan(&agent, correlation_id, input, context).await?;

        if requires_approval || agent.requires_approval {
            return self
                .request_approval(&agent, correlation_id, input, plan)
                .await;
        }

        self.run_plan(&agent, correlation_id, input, plan).await
    }

    /// Resolve a pending approval. Approval re-enters dispatch with the
    /// persisted plan snapshot under the original correlation id.
    pub async fn resolve_approval(
        &self,
        approval_request_id: Uuid,
        decision: ApprovalDecision,
        actor_id: Uuid,
    ) -> Result<InvocationOutcome> {
        let pending = self
            .approvals
            .get(approval_request_id)
            .await?
            .ok_or_else(|| {
                AgentOpsError::NotFound(format!(
                    "Approval request {} not found",
                    approval_request_id
                ))
            })?;

        // Authorize before touching state: the request is single-shot,
        // so a foreign actor must not be able to consume it. Ownership
        // is checked as existence, same as `invoke`.
        let agent = self
            .agents
            .get(pending.agent_id)
            .await?
            .filter(|a| a.owner_id == actor_id)
            .ok_or_else(|| {
                AgentOpsError::NotFound(format!(
                    "Approval request {} not found",
                    approval_request_id
                ))
            })?;

        let status = match decision {
            ApprovalDecision::Approved => ApprovalStatus::Approved,
            ApprovalDecision::Rejected => ApprovalStatus::Rejected,
        };
        let request = self.approvals.resolve(approval_request_id, status).await?;

        match decision {
            ApprovalDecision::Rejected => {
                info!(
                    approval_request_id = %approval_request_id,
                    correlation_id = %request.correlation_id,
                    "Approval rejected"
                );

                self.log(ActivityLogEntry::new(
                    agent.agent_id,
                    request.correlation_id,
                    ActivityType::Error,
                    ToolStatus::Failure,
                    serde_json::json!({
                        "approvalRequestId": approval_request_id,
                        "reason": "rejected",
                    }),
                ))
                .await;

                Ok(InvocationOutcome::Rejected {
                    correlation_id: request.correlation_id,
                    approval_request_id,
                })
            }
            ApprovalDecision::Approved => {
                info!(
                    approval_request_id = %approval_request_id,
                    correlation_id = %request.correlation_id,
                    "Approval granted, resuming dispatch"
                );

                self.run_plan(
                    &agent,
                    request.correlation_id,
                    &request.input,
                    request.plan_snapshot,
                )
                .await
            }
        }
    }

    async fn plan(
        &self,
        agent: &Agent,
        correlation_id: CorrelationId,
        input: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<Plan> {
        match self.planner.create_plan(agent, input, context).await {
            Ok(plan) => {
                self.log(ActivityLogEntry::new(
                    agent.agent_id,
                    correlation_id,
                    ActivityType::Planning,
                    ToolStatus::Success,
                    serde_json::json!({
                        "planId": plan.plan_id,
                        "plan": plan,
                    }),
                ))
                .await;

                Ok(plan)
            }
            Err(e) => {
                warn!(correlation_id = %correlation_id, error = %e, "Planning failed");

                self.log(ActivityLogEntry::new(
                    agent.agent_id,
                    correlation_id,
                    ActivityType::Planning,
                    ToolStatus::Failure,
                    serde_json::json!({ "error": e.to_string() }),
                ))
                .await;

                Err(e)
            }
        }
    }

    async fn request_approval(
        &self,
        agent: &Agent,
        correlation_id: CorrelationId,
        input: &str,
        plan: Plan,
    ) -> Result<InvocationOutcome> {
        let request = ApprovalRequest {
            approval_request_id: Uuid::new_v4(),
            agent_id: agent.agent_id,
            correlation_id,
            input: input.to_string(),
            plan_snapshot: plan.clone(),
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        };

        let approval_request_id = request.approval_request_id;
        self.approvals.insert(request).await?;

        self.log(ActivityLogEntry::new(
            agent.agent_id,
            correlation_id,
            ActivityType::ApprovalRequested,
            ToolStatus::Pending,
            serde_json::json!({
                "approvalRequestId": approval_request_id,
                "planId": plan.plan_id,
            }),
        ))
        .await;

        info!(
            correlation_id = %correlation_id,
            approval_request_id = %approval_request_id,
            "Awaiting approval, no steps executed"
        );

        Ok(InvocationOutcome::ApprovalRequired {
            correlation_id,
            approval_request_id,
            plan,
            message: "Plan requires approval before execution".to_string(),
        })
    }

    async fn run_plan(
        &self,
        agent: &Agent,
        correlation_id: CorrelationId,
        input: &str,
        plan: Plan,
    ) -> Result<InvocationOutcome> {
        let execution_results = self.pipeline.dispatch(agent, &plan, correlation_id).await?;

        let response = self.planner.synthesize(input, &execution_results).await?;

        self.log(ActivityLogEntry::new(
            agent.agent_id,
            correlation_id,
            ActivityType::Completion,
            ToolStatus::Success,
            serde_json::json!({
                "planId": plan.plan_id,
                "response": &response,
                "executionResults": &execution_results,
            }),
        ))
        .await;

        info!(correlation_id = %correlation_id, "Invocation completed");

        Ok(InvocationOutcome::Completed {
            correlation_id,
            response,
            execution_results,
            plan,
        })
    }

    async fn log(&self, entry: ActivityLogEntry) {
        if let Err(e) = self.ledger.append(entry).await {
            warn!(error = %e, "Failed to append ledger entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::models::StepStatus;
    use crate::planner::MockPlanner;
    use crate::state::{InMemoryAgentStore, InMemoryApprovalStore};
    use crate::tools::{Tool, ToolRegistry};
    use std::collections::HashSet;

    struct StubTool(&'static str);

    #[async_trait::async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> &'static str {
            "stub"
        }

        async fn execute(
            &self,
            _input: &crate::models::ToolInput,
        ) -> Result<crate::models::ToolOutput> {
            Ok(crate::models::ToolOutput {
                success: true,
                data: serde_json::json!({ "ok": true }),
                error: None,
            })
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        ledger: Arc<InMemoryLedger>,
        agents: Arc<InMemoryAgentStore>,
    }

    fn fixture() -> Fixture {
        let agents = Arc::new(InMemoryAgentStore::new());
        let approvals = Arc::new(InMemoryApprovalStore::new());
        let ledger = Arc::new(InMemoryLedger::new());

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StubTool("wallet_transfer")));
        registry.register(Arc::new(StubTool("audience_report")));

        let pipeline = Arc::new(StepPipeline::new(registry, ledger.clone()));

        let orchestrator = Orchestrator::new(
            agents.clone(),
            approvals,
            ledger.clone(),
            Arc::new(MockPlanner),
            pipeline,
        );

        Fixture {
            orchestrator,
            ledger,
            agents,
        }
    }

    async fn seed_agent(fixture: &Fixture, requires_approval: bool) -> Agent {
        let agent = Agent {
            agent_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "creator-ops".to_string(),
            status: AgentStatus::Active,
            tools_enabled: ["wallet_transfer", "audience_report"]
                .iter()
                .map(|s| s.to_string())
                .collect::<HashSet<_>>(),
            requires_approval,
            spend_limit: None,
            created_at: Utc::now(),
        };
        fixture.agents.put(agent.clone()).await.unwrap();
        agent
    }

    #[tokio::test]
    async fn test_invoke_happy_path_writes_full_ledger() {
        let fixture = fixture();
        let agent = seed_agent(&fixture, false).await;

        let outcome = fixture
            .orchestrator
            .invoke(agent.agent_id, agent.owner_id, "pay $10 to X", None, false)
            .await
            .unwrap();

        let correlation_id = match outcome {
            InvocationOutcome::Completed {
                correlation_id,
                ref execution_results,
                ..
            } => {
                assert_eq!(execution_results.len(), 1);
                assert_eq!(execution_results[0].tool, "wallet_transfer");
                assert_eq!(execution_results[0].status, StepStatus::Success);
                correlation_id
            }
            other => panic!("expected completed, got {:?}", other),
        };

        let entries = fixture.ledger.entries_for(correlation_id).await.unwrap();
        let types: Vec<ActivityType> = entries.iter().map(|e| e.activity_type).collect();
        assert_eq!(
            types,
            vec![
                ActivityType::Planning,
                ActivityType::ToolCall,
                ActivityType::Completion
            ]
        );
        assert!(entries.iter().all(|e| e.tool_status != ToolStatus::Failure));

        // The planning entry carries the raw plan, and the completion
        // entry the synthesized response and step results, so an audit
        // can reconstruct the invocation from the ledger alone.
        let planned_steps = &entries[0].payload["plan"]["steps"];
        assert_eq!(planned_steps[0]["tool"], "wallet_transfer");
        assert!(entries[2].payload["response"].is_string());
        assert_eq!(
            entries[2].payload["executionResults"][0]["status"],
            "success"
        );
    }

    #[tokio::test]
    async fn test_unknown_or_foreign_agent_is_not_found() {
        let fixture = fixture();
        let agent = seed_agent(&fixture, false).await;

        let err = fixture
            .orchestrator
            .invoke(Uuid::new_v4(), agent.owner_id, "hi", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentOpsError::NotFound(_)));

        // Same error shape for an agent owned by someone else.
        let err = fixture
            .orchestrator
            .invoke(agent.agent_id, Uuid::new_v4(), "hi", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentOpsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_inactive_agent_rejected_before_planning() {
        let fixture = fixture();
        let mut agent = seed_agent(&fixture, false).await;
        agent.status = AgentStatus::Paused;
        fixture.agents.put(agent.clone()).await.unwrap();

        let err = fixture
            .orchestrator
            .invoke(agent.agent_id, agent.owner_id, "hi", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentOpsError::AgentNotActive(_)));
    }

    #[tokio::test]
    async fn test_approval_gate_halts_before_any_step() {
        let fixture = fixture();
        let agent = seed_agent(&fixture, true).await;

        let outcome = fixture
            .orchestrator
            .invoke(agent.agent_id, agent.owner_id, "pay $10 to X", None, false)
            .await
            .unwrap();

        let correlation_id = match outcome {
            InvocationOutcome::ApprovalRequired { correlation_id, .. } => correlation_id,
            other => panic!("expected approval_required, got {:?}", other),
        };

        let entries = fixture.ledger.entries_for(correlation_id).await.unwrap();
        assert!(entries
            .iter()
            .all(|e| e.activity_type != ActivityType::ToolCall));
        assert!(entries
            .iter()
            .any(|e| e.activity_type == ActivityType::ApprovalRequested
                && e.tool_status == ToolStatus::Pending));
    }

    #[tokio::test]
    async fn test_approve_resumes_under_original_correlation_id() {
        let fixture = fixture();
        let agent = seed_agent(&fixture, true).await;

        let outcome = fixture
            .orchestrator
            .invoke(agent.agent_id, agent.owner_id, "pay $10 to X", None, false)
            .await
            .unwrap();

        let (correlation_id, approval_request_id) = match outcome {
            InvocationOutcome::ApprovalRequired {
                correlation_id,
                approval_request_id,
                ..
            } => (correlation_id, approval_request_id),
            other => panic!("expected approval_required, got {:?}", other),
        };

        let resumed = fixture
            .orchestrator
            .resolve_approval(approval_request_id, ApprovalDecision::Approved, agent.owner_id)
            .await
            .unwrap();

        match resumed {
            InvocationOutcome::Completed {
                correlation_id: resumed_id,
                execution_results,
                ..
            } => {
                assert_eq!(resumed_id, correlation_id);
                assert_eq!(execution_results.len(), 1);
            }
            other => panic!("expected completed, got {:?}", other),
        }

        // Second resolution of the same request must fail.
        assert!(fixture
            .orchestrator
            .resolve_approval(approval_request_id, ApprovalDecision::Approved, agent.owner_id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_foreign_actor_cannot_consume_pending_approval() {
        let fixture = fixture();
        let agent = seed_agent(&fixture, true).await;

        let outcome = fixture
            .orchestrator
            .invoke(agent.agent_id, agent.owner_id, "pay $10 to X", None, false)
            .await
            .unwrap();

        let approval_request_id = match outcome {
            InvocationOutcome::ApprovalRequired {
                approval_request_id, ..
            } => approval_request_id,
            other => panic!("expected approval_required, got {:?}", other),
        };

        // A caller who does not own the agent is turned away without
        // the request changing state.
        let err = fixture
            .orchestrator
            .resolve_approval(approval_request_id, ApprovalDecision::Rejected, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentOpsError::NotFound(_)));

        // The request is still pending, so the owner's resolution runs.
        let resumed = fixture
            .orchestrator
            .resolve_approval(approval_request_id, ApprovalDecision::Approved, agent.owner_id)
            .await
            .unwrap();
        assert!(matches!(resumed, InvocationOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_reject_writes_terminal_error_entry() {
        let fixture = fixture();
        let agent = seed_agent(&fixture, true).await;

        let outcome = fixture
            .orchestrator
            .invoke(agent.agent_id, agent.owner_id, "pay $10 to X", None, false)
            .await
            .unwrap();

        let approval_request_id = match outcome {
            InvocationOutcome::ApprovalRequired {
                approval_request_id, ..
            } => approval_request_id,
            other => panic!("expected approval_required, got {:?}", other),
        };

        let rejected = fixture
            .orchestrator
            .resolve_approval(approval_request_id, ApprovalDecision::Rejected, agent.owner_id)
            .await
            .unwrap();

        let correlation_id = match rejected {
            InvocationOutcome::Rejected { correlation_id, .. } => correlation_id,
            other => panic!("expected rejected, got {:?}", other),
        };

        let entries = fixture.ledger.entries_for(correlation_id).await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.activity_type == ActivityType::Error));
        assert!(entries
            .iter()
            .all(|e| e.activity_type != ActivityType::ToolCall));
    }

    #[tokio::test]
    async fn test_empty_input_is_validation_error() {
        let fixture = fixture();
        let agent = seed_agent(&fixture, false).await;

        let err = fixture
            .orchestrator
            .invoke(agent.agent_id, agent.owner_id, "   ", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentOpsError::Validation(_)));
    }
}
