use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ChatConfig;
use crate::session::ToolCall;
use crate::tools::ToolRegistry;

/// System instruction the model is primed with when a conversation opens.
pub const SYSTEM_PROMPT: &str = "\
You are an AI assistant augmented with tools that interact with the HRMS \
(Human Resource Management System) database.

When your session is created you already know the ID of the logged-in \
employee and you never need to ask for it. ALWAYS use that employee ID for \
any tool that takes an employee_id parameter.

Available tools: get_employee_info (profile, department, projects and \
tasks), get_employee_timekeeping (check-in/out records, optionally filtered \
by month and year), get_employee_projects (projects managed or participated \
in, with team members), get_task_details (a task with its subtasks and \
comments), describe_table (database table schema including primary and \
foreign keys), update_contact_info (the employee's own phone number, \
address or avatar URL).

VERY IMPORTANT: when a user asks for information that requires a tool, \
execute the tool immediately without asking for confirmation or announcing \
your intention first. Present results in a clear, organized manner, using \
the formatted responses the tools provide.";

/// The model's latest turn, reduced to what the orchestrator needs. When
/// the provider returns several function calls in one turn only the first
/// is kept; the rest are dropped (known constraint of this adapter).
#[derive(Debug, Clone, Default)]
pub struct ModelTurn {
    pub text: Option<String>,
    pub call: Option<ToolCall>,
}

/// One conversation with the model, owned exclusively by a session.
#[async_trait]
pub trait Conversation: Send {
    /// Send a user turn and return the model's reply.
    async fn send(&mut self, text: &str) -> anyhow::Result<ModelTurn>;

    /// Feed a tool's result back into the conversation, tagged with the
    /// originating tool name, and return the model's next turn.
    async fn send_tool_result(&mut self, tool_name: &str, result: &Value)
        -> anyhow::Result<ModelTurn>;
}

/// Opens conversations primed with the system prompt and tool schema.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn start_conversation(&self) -> anyhow::Result<Box<dyn Conversation>>;
}

/// Gemini REST binding. The generateContent API is stateless, so each
/// conversation carries its own `contents` history and replays it per call.
#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    function_declarations: Vec<Value>,
}

impl GeminiProvider {
    pub fn new(cfg: &ChatConfig, registry: &ToolRegistry) -> Self {
        let function_declarations = registry
            .specs()
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": spec.parameters,
                })
            })
            .collect();
        Self {
            client: reqwest::Client::new(),
            base_url: cfg.gemini_base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model_name.clone(),
            temperature: cfg.temperature,
            function_declarations,
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn start_conversation(&self) -> anyhow::Result<Box<dyn Conversation>> {
        Ok(Box::new(GeminiConversation {
            provider: self.clone(),
            contents: Vec::new(),
        }))
    }
}

struct GeminiConversation {
    provider: GeminiProvider,
    contents: Vec<Value>,
}

impl GeminiConversation {
    async fn generate(&mut self) -> anyhow::Result<ModelTurn> {
        let p = &self.provider;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            p.base_url, p.model
        );
        let body = json!({
            "system_instruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
            "contents": self.contents,
            "tools": [{ "function_declarations": p.function_declarations }],
            "generationConfig": { "temperature": p.temperature },
        });
        let resp = p
            .client
            .post(url)
            .header("x-goog-api-key", &p.api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("model call failed: {}", resp.status());
        }
        let v: Value = resp.json().await?;
        let content = v["candidates"][0]["content"].clone();
        if content.is_null() {
            anyhow::bail!("model returned no candidates");
        }
        // Keep the model turn (text and functionCall parts alike) in the
        // replayed history so follow-up calls see it.
        self.contents.push(content.clone());
        Ok(parse_turn(&content))
    }
}

#[async_trait]
impl Conversation for GeminiConversation {
    async fn send(&mut self, text: &str) -> anyhow::Result<ModelTurn> {
        self.contents
            .push(json!({ "role": "user", "parts": [{ "text": text }] }));
        self.generate().await
    }

    async fn send_tool_result(
        &mut self,
        tool_name: &str,
        result: &Value,
    ) -> anyhow::Result<ModelTurn> {
        self.contents.push(json!({
            "role": "user",
            "parts": [{
                "functionResponse": { "name": tool_name, "response": result }
            }]
        }));
        self.generate().await
    }
}

/// Reduce a model content object to text plus at most one function call.
fn parse_turn(content: &Value) -> ModelTurn {
    let mut turn = ModelTurn::default();
    let Some(parts) = content["parts"].as_array() else {
        return turn;
    };
    let mut text = String::new();
    for part in parts {
        if let Some(t) = part["text"].as_str() {
            text.push_str(t);
        }
        if turn.call.is_none() {
            if let Some(fc) = part.get("functionCall") {
                if let (Some(name), Some(args)) =
                    (fc["name"].as_str(), fc["args"].as_object())
                {
                    turn.call = Some(ToolCall {
                        name: name.to_string(),
                        args: args.clone(),
                    });
                }
            }
        }
    }
    if !text.is_empty() {
        turn.text = Some(text);
    }
    turn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use axum::{routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn parse_turn_text_only() {
        let content = json!({"parts": [{"text": "Hello "}, {"text": "there"}]});
        let turn = parse_turn(&content);
        assert_eq!(turn.text.as_deref(), Some("Hello there"));
        assert!(turn.call.is_none());
    }

    #[test]
    fn parse_turn_takes_first_function_call_only() {
        let content = json!({"parts": [
            {"functionCall": {"name": "get_employee_info", "args": {"employee_id": "E-1"}}},
            {"functionCall": {"name": "get_task_details", "args": {"task_id": "T-1"}}},
        ]});
        let turn = parse_turn(&content);
        let call = turn.call.unwrap();
        assert_eq!(call.name, "get_employee_info");
        assert_eq!(call.args["employee_id"], "E-1");
    }

    #[test]
    fn parse_turn_mixed_text_and_call() {
        let content = json!({"parts": [
            {"text": "Looking that up."},
            {"functionCall": {"name": "describe_table", "args": {"table": "employee"}}},
        ]});
        let turn = parse_turn(&content);
        assert_eq!(turn.text.as_deref(), Some("Looking that up."));
        assert_eq!(turn.call.unwrap().name, "describe_table");
    }

    #[test]
    fn parse_turn_empty_candidate() {
        let turn = parse_turn(&json!({}));
        assert!(turn.text.is_none());
        assert!(turn.call.is_none());
    }

    fn test_config(base_url: String) -> ChatConfig {
        ChatConfig::from_lookup(|key| match key {
            "GEMINI_API_KEY" => Some("test-key".into()),
            "GEMINI_BASE_URL" => Some(base_url.clone()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn conversation_replays_history_and_parses_turns() {
        // Scripted provider endpoint: first reply is a function call, the
        // second is plain text.
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_handler = hits.clone();
        // The generateContent path has a literal colon, which the router
        // would parse as a parameter; match the prefix with a wildcard.
        let app = Router::new().route(
            "/v1beta/models/*rest",
            post(move |Json(body): Json<Value>| {
                let hits = hits_handler.clone();
                async move {
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    let contents = body["contents"].as_array().unwrap();
                    let reply = if n == 0 {
                        assert_eq!(contents.len(), 1);
                        json!({"parts": [{"functionCall": {
                            "name": "get_employee_info",
                            "args": {"employee_id": "current_employee_id"}
                        }}]})
                    } else {
                        // user turn + model call + functionResponse
                        assert_eq!(contents.len(), 3);
                        assert!(contents[2]["parts"][0]["functionResponse"].is_object());
                        json!({"parts": [{"text": "All done."}]})
                    };
                    Json(json!({"candidates": [{"content": reply}]}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let cfg = test_config(format!("http://{}", addr));
        let provider = GeminiProvider::new(&cfg, &ToolRegistry::with_default_tools());
        let mut convo = provider.start_conversation().await.unwrap();

        let turn = convo.send("show my info").await.unwrap();
        assert_eq!(turn.call.as_ref().unwrap().name, "get_employee_info");

        let turn = convo
            .send_tool_result("get_employee_info", &json!({"employee_info": "..."}))
            .await
            .unwrap();
        assert_eq!(turn.text.as_deref(), Some("All done."));
        assert!(turn.call.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
