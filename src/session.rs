use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::llm::Conversation;

/// One entry in a session's turn log. Only user input and assistant text
/// land here; tool results are surfaced transiently and never logged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

/// A structured tool invocation requested by the model or parsed from a
/// direct command. Transient: lives only within one turn's processing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub args: serde_json::Map<String, Value>,
}

/// One unit of orchestrator output per user message. Order within the
/// returned sequence matches the order operations occurred in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseEvent {
    ToolResult {
        tool_name: String,
        tool_args: serde_json::Map<String, Value>,
        result: Value,
    },
    AiMessage {
        content: String,
    },
}

/// Which auxiliary data was preloaded into the conversation at creation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreloadFlags {
    pub employee: bool,
}

/// One ongoing conversation between a caller and the model. Owned by the
/// session store; mutated only while processing that session's own message.
pub struct Session {
    pub id: Uuid,
    pub employee_id: Option<String>,
    pub conversation: Box<dyn Conversation>,
    pub messages: Vec<ChatMessage>,
    pub last_activity: DateTime<Utc>,
    pub preloaded: PreloadFlags,
}

impl Session {
    pub fn new(id: Uuid, employee_id: Option<String>, conversation: Box<dyn Conversation>) -> Self {
        Self {
            id,
            employee_id,
            conversation,
            messages: Vec::new(),
            last_activity: Utc::now(),
            preloaded: PreloadFlags::default(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

/// Read-only view returned by `GET /sessions/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<ChatMessage>,
    pub last_activity: DateTime<Utc>,
    pub preloaded_data: PreloadFlags,
}

/// Per-session line in the `GET /sessions` listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
    pub preloaded_data: PreloadFlags,
}
