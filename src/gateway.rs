use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// The single seam through which the orchestrator reaches database-backed
/// tools. Every failure mode folds into an `{"error": ...}` value; this
/// boundary never raises, so a dead tool server degrades into a normal
/// error turn the model can explain.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn execute(&self, tool_name: &str, parameters: &Map<String, Value>) -> Value;
}

pub const TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the tool executor's /mcp/execute endpoint. Synchronous
/// request/response, single shot, no retry.
pub struct HttpToolGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpToolGateway {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TOOL_CALL_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ToolInvoker for HttpToolGateway {
    async fn execute(&self, tool_name: &str, parameters: &Map<String, Value>) -> Value {
        tracing::info!(tool = tool_name, ?parameters, "executing tool");
        let url = format!("{}/mcp/execute", self.base_url);
        let body = json!({ "tool_name": tool_name, "parameters": parameters });
        let response = match self.client.post(url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(tool = tool_name, error = %e, "tool server unreachable");
                return json!({ "error": format!("Failed to call tool server: {}", e) });
            }
        };
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(tool = tool_name, %status, "tool server returned error");
            return json!({ "error": format!("Tool server error {}: {}", status, text) });
        }
        match response.json::<Value>().await {
            Ok(envelope) => envelope.get("result").cloned().unwrap_or_else(|| json!({})),
            Err(e) => json!({ "error": format!("Invalid tool server response: {}", e) }),
        }
    }
}
