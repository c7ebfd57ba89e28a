use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::detector::ImplicitToolDetector;
use crate::error::ChatError;
use crate::gateway::ToolInvoker;
use crate::llm::{ChatProvider, ModelTurn};
use crate::session::{ChatMessage, ResponseEvent, Session, SessionSnapshot, SessionSummary};
use crate::store::SessionStore;
use crate::tools::ToolRegistry;

/// Sentinel the model is allowed to pass for identity-scoped tools; the
/// orchestrator swaps in the session's real employee id before execution.
const IDENTITY_PLACEHOLDER: &str = "current_employee_id";

pub struct CreatedSession {
    pub session_id: Uuid,
    pub message: String,
}

/// Coordinates sessions, the model conversation, and tool execution. One
/// instance serves all sessions; per-session state lives in the store and
/// is locked for the duration of each message.
pub struct SessionOrchestrator {
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn ChatProvider>,
    gateway: Arc<dyn ToolInvoker>,
    registry: ToolRegistry,
    detector: ImplicitToolDetector,
    max_tool_iterations: usize,
}

impl SessionOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn ChatProvider>,
        gateway: Arc<dyn ToolInvoker>,
        registry: ToolRegistry,
        max_tool_iterations: usize,
    ) -> Self {
        let detector = ImplicitToolDetector::new(&registry);
        Self {
            store,
            provider,
            gateway,
            registry,
            detector,
            max_tool_iterations,
        }
    }

    /// Open a new conversation and, when an employee id is supplied, preload
    /// that employee's profile into it. Preload failures are logged and
    /// tolerated; only a failure to open the conversation itself is fatal.
    pub async fn create_session(
        &self,
        employee_id: Option<String>,
    ) -> Result<CreatedSession, ChatError> {
        let conversation = self
            .provider
            .start_conversation()
            .await
            .map_err(ChatError::SessionCreation)?;
        let id = Uuid::new_v4();
        let mut session = Session::new(
            id,
            employee_id.filter(|s| !s.is_empty()),
            conversation,
        );

        if let Some(emp) = session.employee_id.clone() {
            let mut args = Map::new();
            args.insert("employee_id".into(), Value::String(emp.clone()));
            let result = self.gateway.execute("get_employee_info", &args).await;
            match result.get("employee_info").and_then(|v| v.as_str()) {
                Some(info) => {
                    let priming = format!(
                        "The logged-in employee's information has been loaded for this \
                         session. Keep it as context for the conversation and acknowledge \
                         briefly.\n\n{}",
                        info
                    );
                    match session.conversation.send(&priming).await {
                        Ok(_) => {
                            session.preloaded.employee = true;
                            tracing::info!(
                                session_id = %id,
                                employee_id = %emp,
                                "preloaded employee data"
                            );
                        }
                        Err(e) => tracing::warn!(
                            session_id = %id,
                            error = %e,
                            "failed to prime conversation with employee data"
                        ),
                    }
                }
                None => tracing::warn!(
                    session_id = %id,
                    employee_id = %emp,
                    "employee preload returned no data"
                ),
            }
        }

        let preloaded = session.preloaded.employee;
        self.store.insert(session).await;
        let message = if preloaded {
            "Chat session created successfully with employee data".to_string()
        } else {
            "Chat session created successfully".to_string()
        };
        tracing::info!(session_id = %id, "created chat session");
        Ok(CreatedSession {
            session_id: id,
            message,
        })
    }

    /// Process one user message and return the ordered response events.
    ///
    /// A message whose first word names a registered tool is treated as a
    /// direct command: the tool runs immediately with the rest of the line
    /// as its positional argument, and the model only interprets the
    /// result. Anything else goes to the model, whose reply may trigger
    /// tools either implicitly (detected in prose) or through structured
    /// function calls, the latter bounded by `max_tool_iterations`.
    pub async fn send_message(
        &self,
        session_id: Uuid,
        message: &str,
    ) -> Result<Vec<ResponseEvent>, ChatError> {
        let handle = self
            .store
            .get(session_id)
            .await
            .ok_or(ChatError::SessionNotFound(session_id))?;
        let mut session = handle.lock().await;
        session.messages.push(ChatMessage::user(message));
        let mut events = Vec::new();

        let trimmed = message.trim();
        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((h, r)) => (h, r.trim()),
            None => (trimmed, ""),
        };

        if let Some(spec) = self.registry.get(head) {
            tracing::info!(session_id = %session_id, tool = spec.name, "direct tool command");
            let mut args = Map::new();
            if let Some(arg) = spec.positional_arg {
                if !rest.is_empty() {
                    args.insert(arg.to_string(), Value::String(rest.to_string()));
                }
            }
            let employee = session.employee_id.clone();
            self.fill_identity(spec.name, employee.as_deref(), &mut args);
            let result = self.gateway.execute(spec.name, &args).await;
            events.push(ResponseEvent::ToolResult {
                tool_name: spec.name.to_string(),
                tool_args: args,
                result: result.clone(),
            });
            let turn = session
                .conversation
                .send_tool_result(spec.name, &result)
                .await?;
            self.run_tool_loop(&mut session, turn, &mut events).await?;
        } else {
            let mut turn = session.conversation.send(message).await?;
            if turn.call.is_none() {
                if let Some(text) = turn.text.take() {
                    let implicit = self.detector.detect(&text);
                    self.record_assistant(&mut session, &text, &mut events);
                    if let Some(call) = implicit {
                        tracing::info!(
                            session_id = %session_id,
                            tool = %call.name,
                            "implicit tool call detected in model text"
                        );
                        let mut args = call.args;
                        let employee = session.employee_id.clone();
                        self.fill_identity(&call.name, employee.as_deref(), &mut args);
                        let result = self.gateway.execute(&call.name, &args).await;
                        events.push(ResponseEvent::ToolResult {
                            tool_name: call.name.clone(),
                            tool_args: args,
                            result: result.clone(),
                        });
                        turn = session
                            .conversation
                            .send_tool_result(&call.name, &result)
                            .await?;
                    }
                }
            }
            self.run_tool_loop(&mut session, turn, &mut events).await?;
        }

        session.touch();
        Ok(events)
    }

    pub async fn session_snapshot(&self, id: Uuid) -> Result<SessionSnapshot, ChatError> {
        let handle = self
            .store
            .get(id)
            .await
            .ok_or(ChatError::SessionNotFound(id))?;
        let session = handle.lock().await;
        Ok(SessionSnapshot {
            messages: session.messages.clone(),
            last_activity: session.last_activity,
            preloaded_data: session.preloaded,
        })
    }

    pub async fn list_sessions(&self) -> HashMap<Uuid, SessionSummary> {
        self.store.summaries().await
    }

    pub async fn delete_session(&self, id: Uuid) -> Result<(), ChatError> {
        if self.store.remove(id).await {
            tracing::info!(session_id = %id, "deleted chat session");
            Ok(())
        } else {
            Err(ChatError::SessionNotFound(id))
        }
    }

    /// Execute structured function calls until the model stops asking for
    /// tools or the iteration cap is hit. The cap surfaces as an ordinary
    /// assistant message, not an error.
    async fn run_tool_loop(
        &self,
        session: &mut Session,
        mut turn: ModelTurn,
        events: &mut Vec<ResponseEvent>,
    ) -> Result<(), ChatError> {
        if let Some(text) = turn.text.take() {
            self.record_assistant(session, &text, events);
        }
        let mut iterations = 0usize;
        while let Some(call) = turn.call.take() {
            iterations += 1;
            if iterations > self.max_tool_iterations {
                let notice = format!(
                    "I stopped after {} tool calls without reaching a final answer. \
                     Please try rephrasing your request.",
                    self.max_tool_iterations
                );
                tracing::warn!(
                    session_id = %session.id,
                    limit = self.max_tool_iterations,
                    "tool loop limit reached"
                );
                self.record_assistant(session, &notice, events);
                break;
            }
            let mut args = call.args;
            let employee = session.employee_id.clone();
            self.fill_identity(&call.name, employee.as_deref(), &mut args);
            let result = self.gateway.execute(&call.name, &args).await;
            events.push(ResponseEvent::ToolResult {
                tool_name: call.name.clone(),
                tool_args: args,
                result: result.clone(),
            });
            turn = session
                .conversation
                .send_tool_result(&call.name, &result)
                .await?;
            if let Some(text) = turn.text.take() {
                self.record_assistant(session, &text, events);
            }
        }
        Ok(())
    }

    fn record_assistant(
        &self,
        session: &mut Session,
        text: &str,
        events: &mut Vec<ResponseEvent>,
    ) {
        session.messages.push(ChatMessage::assistant(text));
        events.push(ResponseEvent::AiMessage {
            content: text.to_string(),
        });
    }

    /// For identity-scoped tools, a missing employee_id or the placeholder
    /// value is replaced with the session's employee id.
    fn fill_identity(
        &self,
        tool_name: &str,
        employee_id: Option<&str>,
        args: &mut Map<String, Value>,
    ) {
        let Some(spec) = self.registry.get(tool_name) else {
            return;
        };
        if !spec.identity_scoped {
            return;
        }
        let Some(id) = employee_id else {
            return;
        };
        let needs_fill = match args.get("employee_id") {
            None => true,
            Some(v) => v.as_str() == Some(IDENTITY_PLACEHOLDER),
        };
        if needs_fill {
            args.insert("employee_id".into(), Value::String(id.to_string()));
        }
    }
}

#[cfg(test)]
pub(crate) mod test_doubles {
    use super::*;
    use crate::llm::Conversation;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Hands out conversations that pop turns from a shared script. When
    /// the script runs dry the model "replies" with an empty turn.
    pub struct ScriptedProvider {
        turns: Arc<Mutex<VecDeque<ModelTurn>>>,
    }

    impl ScriptedProvider {
        pub fn new(turns: Vec<ModelTurn>) -> Self {
            Self {
                turns: Arc::new(Mutex::new(turns.into())),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn start_conversation(&self) -> anyhow::Result<Box<dyn Conversation>> {
            Ok(Box::new(ScriptedConversation {
                turns: self.turns.clone(),
            }))
        }
    }

    struct ScriptedConversation {
        turns: Arc<Mutex<VecDeque<ModelTurn>>>,
    }

    impl ScriptedConversation {
        fn next_turn(&self) -> ModelTurn {
            self.turns.lock().unwrap().pop_front().unwrap_or_default()
        }
    }

    #[async_trait]
    impl Conversation for ScriptedConversation {
        async fn send(&mut self, _text: &str) -> anyhow::Result<ModelTurn> {
            Ok(self.next_turn())
        }
        async fn send_tool_result(
            &mut self,
            _tool_name: &str,
            _result: &Value,
        ) -> anyhow::Result<ModelTurn> {
            Ok(self.next_turn())
        }
    }

    /// A model that requests the same tool forever. Used to pin down the
    /// loop bound.
    pub struct LoopingProvider;

    #[async_trait]
    impl ChatProvider for LoopingProvider {
        async fn start_conversation(&self) -> anyhow::Result<Box<dyn Conversation>> {
            Ok(Box::new(LoopingConversation))
        }
    }

    struct LoopingConversation;

    impl LoopingConversation {
        fn call_turn() -> ModelTurn {
            ModelTurn {
                text: None,
                call: Some(crate::session::ToolCall {
                    name: "get_task_details".into(),
                    args: json!({"task_id": "T-1"}).as_object().cloned().unwrap_or_default(),
                }),
            }
        }
    }

    #[async_trait]
    impl Conversation for LoopingConversation {
        async fn send(&mut self, _text: &str) -> anyhow::Result<ModelTurn> {
            Ok(Self::call_turn())
        }
        async fn send_tool_result(
            &mut self,
            _tool_name: &str,
            _result: &Value,
        ) -> anyhow::Result<ModelTurn> {
            Ok(Self::call_turn())
        }
    }

    /// Records every tool execution and answers from a canned table.
    pub struct RecordingInvoker {
        pub calls: Mutex<Vec<(String, Map<String, Value>)>>,
        pub responses: HashMap<String, Value>,
    }

    impl RecordingInvoker {
        pub fn new() -> Self {
            let mut responses = HashMap::new();
            responses.insert(
                "get_employee_info".to_string(),
                json!({"employee_info": "--- EMPLOYEE INFORMATION ---\nName: An Nguyen"}),
            );
            Self {
                calls: Mutex::new(Vec::new()),
                responses,
            }
        }

        pub fn with_response(mut self, tool: &str, response: Value) -> Self {
            self.responses.insert(tool.to_string(), response);
            self
        }

        pub fn recorded(&self) -> Vec<(String, Map<String, Value>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolInvoker for RecordingInvoker {
        async fn execute(&self, tool_name: &str, parameters: &Map<String, Value>) -> Value {
            self.calls
                .lock()
                .unwrap()
                .push((tool_name.to_string(), parameters.clone()));
            self.responses
                .get(tool_name)
                .cloned()
                .unwrap_or_else(|| json!({"ok": true}))
        }
    }
}
