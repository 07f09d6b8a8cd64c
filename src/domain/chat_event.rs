use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The kind of a normalized chat event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatEventKind {
    /// The full final answer of the turn
    Text,
    /// The engine invoked a tool
    ToolCall,
    /// The turn (or part of it) failed
    Error,
    /// Terminates every turn, success or not
    Done,
}

impl ChatEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatEventKind::Text => "text",
            ChatEventKind::ToolCall => "tool_call",
            ChatEventKind::Error => "error",
            ChatEventKind::Done => "done",
        }
    }
}

impl std::fmt::Display for ChatEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized event, identical in shape for every engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: ChatEventKind,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ChatEvent {
    /// Create a new event with empty metadata
    pub fn new(kind: ChatEventKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            metadata: Map::new(),
        }
    }

    /// Create a text event
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(ChatEventKind::Text, content)
    }

    /// Create a tool call event; content is the tool name
    pub fn tool_call(name: impl Into<String>) -> Self {
        Self::new(ChatEventKind::ToolCall, name)
    }

    /// Create an error event
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(ChatEventKind::Error, content)
    }

    /// Create the terminal event
    pub fn done() -> Self {
        Self::new(ChatEventKind::Done, "")
    }

    /// Add a metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_done(&self) -> bool {
        self.kind == ChatEventKind::Done
    }

    /// Render as one Server-Sent Events frame
    pub fn to_sse_frame(&self) -> String {
        let data = serde_json::json!({
            "content": self.content,
            "metadata": self.metadata,
        });
        format!("event: {}\ndata: {}\n\n", self.kind, data)
    }
}
