//! Planner trait and implementations
//!
//! The planner turns a natural-language request into a structured step
//! sequence, and later synthesizes the final response from the
//! accumulated execution results. Both calls go to the LLM; neither is
//! allowed anywhere near step execution itself.

use crate::models::{Agent, ExecutionResult, Plan, PlanStep};
use crate::Result;
use async_trait::async_trait;

pub mod gemini;
pub use gemini::GeminiPlanner;

#[async_trait]
pub trait Planner: Send + Sync {
    /// Decompose the input into a plan over the agent's enabled tools.
    async fn create_plan(
        &self,
        agent: &Agent,
        input: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<Plan>;

    /// Produce the user-facing summary from the execution results.
    async fn synthesize(&self, input: &str, results: &[ExecutionResult]) -> Result<String>;
}

/// Mock planner for development & testing.
/// Keeps the system functional without an LLM dependency.
pub struct MockPlanner;

#[async_trait]
impl Planner for MockPlanner {
    async fn create_plan(
        &self,
        _agent: &Agent,
        input: &str,
        _context: Option<&serde_json::Value>,
    ) -> Result<Plan> {
        use chrono::Utc;
        use uuid::Uuid;

        let lowered = input.to_lowercase();
        let steps = if lowered.contains("pay") || lowered.contains("send") {
            vec![PlanStep {
                tool: "wallet_transfer".to_string(),
                input: serde_json::json!({
                    "fromUserId": Uuid::new_v4(),
                    "toUserId": Uuid::new_v4(),
                    "fromAddress": "0x1111111111111111111111111111111111111111",
                    "toAddress": "0x2222222222222222222222222222222222222222",
                    "amount": "10",
                    "tokenContract": "0x3333333333333333333333333333333333333333",
                    "tokenSymbol": "USDC",
                    "chainId": 8453,
                    "message": input,
                }),
                description: "Execute the requested transfer".to_string(),
            }]
        } else {
            vec![PlanStep {
                tool: "audience_report".to_string(),
                input: serde_json::json!({ "query": input }),
                description: "Gather the requested report".to_string(),
            }]
        };

        Ok(Plan {
            plan_id: Uuid::new_v4(),
            steps,
            created_at: Utc::now(),
        })
    }

    async fn synthesize(&self, input: &str, results: &[ExecutionResult]) -> Result<String> {
        Ok(format!(
            "Completed {} step(s) for: {}",
            results.len(),
            input
        ))
    }
}
