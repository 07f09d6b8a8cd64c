//! Claude stream-json message shapes shared by both engines

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of the Claude `stream-json` protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// System message (init, hooks, compaction notices)
    System {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Assistant message (text or tool use)
    Assistant {
        #[serde(default)]
        message: AssistantMessage,
    },

    /// User message; tool results or an echo of the prompt
    User {
        #[serde(default)]
        message: Value,
    },

    /// Terminal result of one query
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        result: Option<String>,
        #[serde(default, alias = "total_cost_usd")]
        cost_usd: Option<f64>,
        #[serde(default)]
        num_turns: Option<u64>,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        errors: Vec<String>,
    },

    /// Anything else the CLI emits (stream events, control responses, ...)
    #[serde(other)]
    Other,
}

/// Assistant message content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// Content block of an assistant message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },

    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default = "default_tool_name")]
        name: String,
        #[serde(default)]
        input: Value,
    },

    /// Thinking, images, tool results echoed back, ...
    #[serde(other)]
    Other,
}

fn default_tool_name() -> String {
    "tool".to_string()
}

impl StreamMessage {
    /// Parse one output line; blank and non-protocol lines yield `None`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    /// Backend session id carried by `system` and `result` messages
    pub fn session_id(&self) -> Option<&str> {
        match self {
            StreamMessage::System { session_id, .. } | StreamMessage::Result { session_id, .. } => {
                session_id.as_deref().filter(|id| !id.is_empty())
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::System { .. } => "system",
            StreamMessage::Assistant { .. } => "assistant",
            StreamMessage::User { .. } => "user",
            StreamMessage::Result { .. } => "result",
            StreamMessage::Other => "other",
        }
    }
}
