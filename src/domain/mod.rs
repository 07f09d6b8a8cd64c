//! Core domain types shared by the engines, the executor and the log.

mod chat_event;
mod mcp;
mod record;
mod session;

pub use chat_event::{ChatEvent, ChatEventKind};
pub use mcp::{McpServerEntry, McpServerSpec, McpTransport, encode_mcp_config};
pub use record::{ConversationRecord, Role, ToolCallRecord, ToolCallStatus, now_timestamp};
pub use session::{SESSION_NAMESPACE, SessionKey};
pub(crate) use session::{decode_file_stem, encode_file_stem, sanitize};
