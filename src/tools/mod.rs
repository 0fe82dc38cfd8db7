//! Tool trait and registry
//!
//! HTTP-backed tools call the external tool-invocation service;
//! `wallet_transfer` adapts the transfer gateway as a plan step.

use crate::error::AgentOpsError;
use crate::models::{CorrelationId, ToolInput, ToolOutput, TransferRequest};
use crate::transfer::TransferGateway;
use crate::Result;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct ToolApiClient {
    client: Client,
    base_url: String,
}

impl ToolApiClient {
    fn from_env() -> Option<Self> {
        let base_url = env::var("TOOLS_API_BASE_URL").ok()?;

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .ok()?;

        Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                AgentOpsError::Tool(format!("Tool API request failed for {}: {}", path, e))
            })?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| AgentOpsError::Tool(format!("Invalid JSON response: {}", e)))?;

        if !status.is_success() {
            return Err(AgentOpsError::Tool(format!(
                "Tool API returned {} for {}: {}",
                status, path, body
            )));
        }

        Ok(body)
    }
}

fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() {
        Ok(())
    } else {
        Err(AgentOpsError::Validation(
            "tool input must be a JSON object".to_string(),
        ))
    }
}

/// Generic HTTP-backed tool. The remote service routes on tool name,
/// so a single endpoint serves every registered HttpTool.
pub struct HttpTool {
    tool_name: &'static str,
    tool_description: &'static str,
    api: Option<ToolApiClient>,
}

impl HttpTool {
    fn new(tool_name: &'static str, tool_description: &'static str, api: Option<ToolApiClient>) -> Self {
        Self {
            tool_name,
            tool_description,
            api,
        }
    }
}

#[async_trait::async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &'static str {
        self.tool_name
    }

    fn description(&self) -> &'static str {
        self.tool_description
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let api = self.api.as_ref().ok_or_else(|| {
            AgentOpsError::Tool("TOOLS_API_BASE_URL is not configured".to_string())
        })?;

        ensure_object_parameters(input)?;

        let response = api
            .post_json(
                "/api/v1/tools/invoke",
                &json!({
                    "tool": self.tool_name,
                    "input": input.parameters,
                }),
            )
            .await?;

        Ok(ToolOutput {
            success: true,
            data: response,
            error: None,
        })
    }
}

/// Adapts the transfer gateway as a plan step. The step input is a
/// `TransferRequest` plus an optional `idempotencyKey`.
pub struct WalletTransferTool {
    gateway: Arc<TransferGateway>,
}

impl WalletTransferTool {
    pub fn new(gateway: Arc<TransferGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait::async_trait]
impl Tool for WalletTransferTool {
    fn name(&self) -> &'static str {
        "wallet_transfer"
    }

    fn description(&self) -> &'static str {
        "Move funds between wallets through the payment provider"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;

        let idempotency_key = input
            .parameters
            .get("idempotencyKey")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let correlation_id = input
            .parameters
            .get("correlationId")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .map(CorrelationId)
            .unwrap_or_else(CorrelationId::mint);

        let request: TransferRequest = serde_json::from_value(input.parameters.clone())
            .map_err(|e| AgentOpsError::Validation(format!("Invalid transfer input: {}", e)))?;

        let outcome = self
            .gateway
            .transfer(request, idempotency_key, correlation_id)
            .await?;

        Ok(ToolOutput {
            success: true,
            data: serde_json::to_value(&outcome)?,
            error: None,
        })
    }
}

/// Create a registry with the HTTP-backed creator tools plus the
/// wallet transfer adapter.
pub fn create_default_registry(gateway: Arc<TransferGateway>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    let tool_api = ToolApiClient::from_env();

    registry.register(Arc::new(HttpTool::new(
        "audience_report",
        "Aggregate follower and engagement metrics across platforms",
        tool_api.clone(),
    )));
    registry.register(Arc::new(HttpTool::new(
        "content_scheduler",
        "Schedule or reschedule content posts",
        tool_api.clone(),
    )));
    registry.register(Arc::new(HttpTool::new(
        "revenue_summary",
        "Summarize earnings across revenue sources",
        tool_api,
    )));

    registry.register(Arc::new(WalletTransferTool::new(gateway)));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the input back"
        }

        async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
            Ok(ToolOutput {
                success: true,
                data: input.parameters.clone(),
                error: None,
            })
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.list(), vec!["echo"]);
    }

    #[tokio::test]
    async fn test_http_tool_requires_config() {
        let tool = HttpTool::new("audience_report", "test", None);
        let input = ToolInput {
            tool_name: "audience_report".to_string(),
            parameters: serde_json::json!({}),
        };

        let err = tool.execute(&input).await.unwrap_err();
        assert!(matches!(err, AgentOpsError::Tool(_)));
    }

    #[tokio::test]
    async fn test_object_parameters_enforced() {
        let tool = HttpTool::new("audience_report", "test", None);
        let input = ToolInput {
            tool_name: "audience_report".to_string(),
            parameters: serde_json::json!("not an object"),
        };

        assert!(tool.execute(&input).await.is_err());
    }
}
