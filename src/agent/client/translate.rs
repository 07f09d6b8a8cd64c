//! Translation of client-connection messages into normalized events

use serde_json::json;

use crate::ChatEvent;
use crate::agent::stream::{ContentBlock, StreamMessage};

/// Events produced by one native message, and whether it ended the turn
#[derive(Debug, Default)]
pub struct Translation {
    pub events: Vec<ChatEvent>,
    pub terminal: bool,
}

pub fn translate(message: StreamMessage) -> Translation {
    match message {
        StreamMessage::Assistant { message } => {
            let events = message
                .content
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(ChatEvent::text(text)),
                    ContentBlock::ToolUse { id, name, input } => Some(
                        ChatEvent::tool_call(name)
                            .with_meta("tool_id", id)
                            .with_meta("input", input),
                    ),
                    ContentBlock::Other => None,
                })
                .collect();
            Translation {
                events,
                terminal: false,
            }
        }
        StreamMessage::Result {
            subtype,
            result,
            cost_usd,
            num_turns,
            duration_ms,
            session_id,
            errors,
            ..
        } => {
            let event = if subtype == "success" {
                ChatEvent::done()
                    .with_meta("result", json!(result))
                    .with_meta("cost_usd", json!(cost_usd))
                    .with_meta("num_turns", json!(num_turns))
                    .with_meta("duration_ms", json!(duration_ms))
                    .with_meta("session_id", json!(session_id))
            } else if !errors.is_empty() {
                ChatEvent::error(errors.join("; "))
            } else if subtype.is_empty() {
                ChatEvent::error("error")
            } else {
                ChatEvent::error(subtype)
            };
            Translation {
                events: vec![event],
                terminal: true,
            }
        }
        other => {
            tracing::debug!("Client message type={} (not streamed)", other.kind());
            Translation::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatEventKind;

    fn parse(line: &str) -> StreamMessage {
        StreamMessage::parse(line).unwrap()
    }

    #[test]
    fn test_text_and_tool_blocks_in_order() {
        let t = translate(parse(
            r#"{"type":"assistant","message":{"content":[
                {"type":"text","text":"Let me look"},
                {"type":"tool_use","id":"tu_1","name":"Glob","input":{"pattern":"*.rs"}}
            ]}}"#,
        ));

        assert!(!t.terminal);
        assert_eq!(t.events.len(), 2);
        assert_eq!(t.events[0].kind, ChatEventKind::Text);
        assert_eq!(t.events[0].content, "Let me look");
        assert_eq!(t.events[1].content, "Glob");
        assert_eq!(t.events[1].metadata["tool_id"], "tu_1");
        assert_eq!(t.events[1].metadata["input"]["pattern"], "*.rs");
    }

    #[test]
    fn test_success_result_is_done_with_accounting() {
        let t = translate(parse(
            r#"{"type":"result","subtype":"success","result":"ok","total_cost_usd":0.25,"num_turns":3,"duration_ms":1200,"session_id":"abc"}"#,
        ));

        assert!(t.terminal);
        let done = &t.events[0];
        assert!(done.is_done());
        assert_eq!(done.metadata["cost_usd"], 0.25);
        assert_eq!(done.metadata["num_turns"], 3);
        assert_eq!(done.metadata["duration_ms"], 1200);
        assert_eq!(done.metadata["result"], "ok");
    }

    #[test]
    fn test_failed_result_joins_errors() {
        let t = translate(parse(
            r#"{"type":"result","subtype":"error_during_execution","is_error":true,"errors":["rate limited","retry later"]}"#,
        ));

        assert!(t.terminal);
        assert_eq!(t.events[0].kind, ChatEventKind::Error);
        assert_eq!(t.events[0].content, "rate limited; retry later");
    }

    #[test]
    fn test_failed_result_without_errors_uses_subtype() {
        let t = translate(parse(r#"{"type":"result","subtype":"error_max_turns"}"#));
        assert_eq!(t.events[0].content, "error_max_turns");
    }

    #[test]
    fn test_other_messages_are_ignored() {
        let t = translate(parse(r#"{"type":"system","subtype":"init","session_id":"x"}"#));
        assert!(t.events.is_empty());
        assert!(!t.terminal);
    }
}
