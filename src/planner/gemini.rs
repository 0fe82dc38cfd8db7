//! Gemini-powered planner and synthesizer

use crate::llm::GeminiClient;
use crate::models::{Agent, ExecutionResult, Plan, PlanStep};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

const PLANNER_SYSTEM: &str = "You are a task planning engine for creator operations agents.";
const SYNTHESIS_SYSTEM: &str =
    "You summarize agent task results for the user. Be concise and factual.";

pub struct GeminiPlanner {
    client: GeminiClient,
}

impl GeminiPlanner {
    pub fn new(api_key: String) -> Self {
        Self {
            client: GeminiClient::new(api_key),
        }
    }

    fn build_plan_prompt(agent: &Agent, input: &str, context: Option<&serde_json::Value>) -> String {
        let mut tools: Vec<&str> = agent.tools_enabled.iter().map(|s| s.as_str()).collect();
        tools.sort_unstable();

        let mut prompt = format!(
            r#"Create a step plan for the request below.

REQUEST:
{}

Available tools:
- {}

Rules:
- Each step must reference only available tools
- Steps run in order; later steps may depend on earlier output
- Return ONLY valid JSON
- No explanation text
- JSON format:

{{
  "steps": [
    {{
      "tool": "tool_name",
      "input": {{ ... }},
      "description": "what this step does"
    }}
  ]
}}
"#,
            input,
            tools.join("\n- "),
        );

        if let Some(context) = context {
            prompt.push_str(&format!("\nCONTEXT:\n{}\n", context));
        }

        prompt
    }
}

#[async_trait]
impl crate::planner::Planner for GeminiPlanner {
    async fn create_plan(
        &self,
        agent: &Agent,
        input: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<Plan> {
        let prompt = Self::build_plan_prompt(agent, input, context);
        let response = self.client.generate(PLANNER_SYSTEM, &prompt).await?;
        parse_plan_response(&response)
    }

    async fn synthesize(&self, input: &str, results: &[ExecutionResult]) -> Result<String> {
        let prompt = format!(
            "ORIGINAL REQUEST:\n{}\n\nEXECUTION RESULTS:\n{}\n\n\
             Write a short natural-language summary of what was done and the outcome.",
            input,
            serde_json::to_string_pretty(results)?,
        );

        self.client.generate(SYNTHESIS_SYSTEM, &prompt).await
    }
}

/// Parse a plan from the model output, tolerating a ```json fence.
fn parse_plan_response(response: &str) -> Result<Plan> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json: serde_json::Value = serde_json::from_str(cleaned).map_err(|e| {
        crate::error::AgentOpsError::Planning(format!(
            "Failed to parse plan response: {} | raw={}",
            e, response
        ))
    })?;

    let steps_json = json
        .get("steps")
        .ok_or_else(|| crate::error::AgentOpsError::InvalidPlan("No steps in response".to_string()))?
        .as_array()
        .ok_or_else(|| {
            crate::error::AgentOpsError::InvalidPlan("Steps is not an array".to_string())
        })?;

    let mut steps = Vec::with_capacity(steps_json.len());

    for step_json in steps_json {
        let tool = step_json
            .get("tool")
            .and_then(|v| v.as_str())
            .ok_or_else(|| crate::error::AgentOpsError::InvalidPlan("Missing tool".to_string()))?
            .to_string();

        let input = step_json
            .get("input")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        let description = step_json
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        steps.push(PlanStep {
            tool,
            input,
            description,
        });
    }

    if steps.is_empty() {
        return Err(crate::error::AgentOpsError::InvalidPlan(
            "Plan has no steps".to_string(),
        ));
    }

    Ok(Plan {
        plan_id: Uuid::new_v4(),
        steps,
        created_at: Utc::now(),
    })
}
