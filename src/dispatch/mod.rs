//! Step pipeline for deterministic plan dispatch
//!
//! Plans become tool calls here. The LLM is not allowed in this module.
//! Disabled tools are filtered before the first step runs, and a step
//! failure never aborts the rest of the batch.

use crate::ledger::ActivityLedger;
use crate::models::{
    ActivityLogEntry, ActivityType, Agent, CorrelationId, ExecutionResult, Plan, StepStatus,
    ToolInput, ToolStatus,
};
use crate::tools::ToolRegistry;
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Maximum steps allowed per plan
const MAX_STEPS_PER_PLAN: usize = 50;

/// Context threaded from step to step. Each successful step's output
/// lands in `prior_outputs` so later steps can reference it.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub prior_outputs: Vec<serde_json::Value>,
}

impl ExecutionContext {
    fn record(&mut self, output: serde_json::Value) {
        self.prior_outputs.push(output);
    }

    fn enrich(&self, parameters: &serde_json::Value) -> serde_json::Value {
        if self.prior_outputs.is_empty() {
            return parameters.clone();
        }

        match parameters {
            serde_json::Value::Object(map) => {
                let mut map = map.clone();
                map.insert(
                    "priorOutputs".to_string(),
                    serde_json::Value::Array(self.prior_outputs.clone()),
                );
                serde_json::Value::Object(map)
            }
            other => other.clone(),
        }
    }
}

/// Dispatches plan steps in order against the tool registry.
pub struct StepPipeline {
    registry: ToolRegistry,
    ledger: Arc<dyn ActivityLedger>,
}

impl StepPipeline {
    pub fn new(registry: ToolRegistry, ledger: Arc<dyn ActivityLedger>) -> Self {
        Self { registry, ledger }
    }

    /// Run every step of the plan in order. Steps whose tool the agent
    /// has not enabled are skipped up front; a failing step is recorded
    /// and dispatch continues with the next one.
    pub async fn dispatch(
        &self,
        agent: &Agent,
        plan: &Plan,
        correlation_id: CorrelationId,
    ) -> Result<Vec<ExecutionResult>> {
        if plan.steps.len() > MAX_STEPS_PER_PLAN {
            return Err(crate::error::AgentOpsError::InvalidPlan(format!(
                "Plan exceeds maximum allowed steps ({})",
                MAX_STEPS_PER_PLAN
            )));
        }

        debug!(plan_id = %plan.plan_id, steps = plan.steps.len(), "Starting dispatch");

        // Validation pass: decide skips for the whole plan before any
        // step runs so a mid-plan disabled tool cannot strand partial
        // side effects.
        let runnable: Vec<bool> = plan
            .steps
            .iter()
            .map(|step| agent.tools_enabled.contains(&step.tool))
            .collect();

        let mut results = Vec::with_capacity(plan.steps.len());
        let mut context = ExecutionContext::default();

        for (step, runnable) in plan.steps.iter().zip(runnable) {
            if !runnable {
                warn!(tool = %step.tool, "Skipping step: tool not enabled for agent");

                let result = ExecutionResult {
                    tool: step.tool.clone(),
                    input: step.input.clone(),
                    output: serde_json::json!({
                        "error": "Tool not enabled for this agent"
                    }),
                    status: StepStatus::Skipped,
                    latency_ms: 0,
                };

                self.log_step(agent, correlation_id, &result).await;
                results.push(result);
                continue;
            }

            let start = Instant::now();

            let input = ToolInput {
                tool_name: step.tool.clone(),
                parameters: context.enrich(&step.input),
            };

            let (status, output) = match self.registry.get(&step.tool) {
                Some(tool) => match tool.execute(&input).await {
                    Ok(out) => {
                        context.record(out.data.clone());
                        (StepStatus::Success, out.data)
                    }
                    Err(e) => {
                        warn!(tool = %step.tool, error = %e, "Tool execution failed");
                        (
                            StepStatus::Failure,
                            serde_json::json!({ "error": e.to_string() }),
                        )
                    }
                },
                None => {
                    warn!(tool = %step.tool, "Tool not registered");
                    (
                        StepStatus::Skipped,
                        serde_json::json!({ "error": "Tool not registered" }),
                    )
                }
            };

            let result = ExecutionResult {
                tool: step.tool.clone(),
                input: step.input.clone(),
                output,
                status,
                latency_ms: start.elapsed().as_millis() as u64,
            };

            self.log_step(agent, correlation_id, &result).await;
            results.push(result);
        }

        debug!(
            plan_id = %plan.plan_id,
            results = results.len(),
            "Dispatch completed"
        );

        Ok(results)
    }

    async fn log_step(&self, agent: &Agent, correlation_id: CorrelationId, result: &ExecutionResult) {
        let tool_status = match result.status {
            StepStatus::Success => ToolStatus::Success,
            StepStatus::Failure | StepStatus::Skipped => ToolStatus::Failure,
        };

        let entry = ActivityLogEntry::new(
            agent.agent_id,
            correlation_id,
            ActivityType::ToolCall,
            tool_status,
            serde_json::json!({
                "input": result.input,
                "output": result.output,
                "stepStatus": result.status,
            }),
        )
        .with_tool(&result.tool, result.latency_ms);

        // A ledger write failure must not kill the batch.
        if let Err(e) = self.ledger.append(entry).await {
            warn!(error = %e, "Failed to append tool call ledger entry");
        }
    }
}
