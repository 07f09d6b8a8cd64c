//! MCP (Model Context Protocol) tool-server descriptors.
//!
//! Descriptors arrive as an ordered list of `{name, transport, ...}` entries and
//! are handed to the engine as the `{"mcpServers": {name: entry}}` document the
//! Claude CLI understands.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Transport of a tool server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    /// Local process speaking MCP over stdio
    #[default]
    Stdio,
    /// Remote server reached over HTTP server-sent events
    Sse,
}

/// A named tool-server descriptor as supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerSpec {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default)]
    pub transport: McpTransport,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_server_name() -> String {
    "unknown".to_string()
}

/// Engine-side entry of the `mcpServers` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerEntry {
    Process {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    Remote {
        url: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
}

impl From<&McpServerSpec> for McpServerEntry {
    fn from(spec: &McpServerSpec) -> Self {
        match spec.transport {
            McpTransport::Stdio => McpServerEntry::Process {
                command: spec.command.clone().unwrap_or_default(),
                args: spec.args.clone(),
                env: spec.env.clone(),
            },
            McpTransport::Sse => McpServerEntry::Remote {
                url: spec.url.clone().unwrap_or_default(),
                env: spec.env.clone(),
            },
        }
    }
}

/// Re-encode descriptors into the `{"mcpServers": {...}}` document.
///
/// Later entries with a duplicate name replace earlier ones.
pub fn encode_mcp_config(servers: &[McpServerSpec]) -> Value {
    let mut map = Map::new();
    for spec in servers {
        let entry = McpServerEntry::from(spec);
        map.insert(
            spec.name.clone(),
            serde_json::to_value(entry).unwrap_or(Value::Null),
        );
    }
    serde_json::json!({ "mcpServers": map })
}
