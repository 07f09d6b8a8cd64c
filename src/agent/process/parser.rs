//! Translation of one process turn's stdout into normalized events

use crate::ChatEvent;
use crate::agent::stream::{ContentBlock, StreamMessage};

/// Accumulates one turn of `stream-json` output.
///
/// Tool calls are surfaced as soon as their line is fed; the answer text is
/// only known once the process has exited.
#[derive(Debug, Default)]
pub struct ProcessTurnParser {
    text_blocks: Vec<String>,
    result_text: Option<String>,
    continuation_token: Option<String>,
}

impl ProcessTurnParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stdout line and return the events it produces right away
    pub fn feed(&mut self, line: &str) -> Vec<ChatEvent> {
        let Some(message) = StreamMessage::parse(line) else {
            if !line.trim().is_empty() {
                tracing::debug!("Skipping non-protocol line: {}", line.trim());
            }
            return Vec::new();
        };

        if let Some(id) = message.session_id() {
            self.continuation_token = Some(id.to_string());
        }

        let mut events = Vec::new();
        match message {
            StreamMessage::Assistant { message } => {
                for block in message.content {
                    match block {
                        ContentBlock::Text { text } => self.text_blocks.push(text),
                        ContentBlock::ToolUse { id, name, input } => {
                            events.push(
                                ChatEvent::tool_call(name)
                                    .with_meta("tool_id", id)
                                    .with_meta("input", input),
                            );
                        }
                        ContentBlock::Other => {}
                    }
                }
            }
            StreamMessage::Result { result, .. } => {
                if let Some(text) = result.filter(|t| !t.trim().is_empty()) {
                    self.result_text = Some(text);
                }
            }
            _ => {}
        }
        events
    }

    /// Latest backend session id seen in a `system` or `result` line
    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    /// The answer: the result payload if one arrived, else the buffered text
    pub fn final_text(&self) -> Option<String> {
        let text = match &self.result_text {
            Some(result) => result.trim().to_string(),
            None => self.text_blocks.join("\n").trim().to_string(),
        };
        (!text.is_empty()).then_some(text)
    }

    /// Closing event of the turn, excluding `done`.
    ///
    /// `exit_code` is `None` when the process was terminated by a signal.
    pub fn finish(&self, exit_code: Option<i32>, stderr: &str) -> Option<ChatEvent> {
        match exit_code {
            Some(0) => self.final_text().map(ChatEvent::text),
            code => {
                let stderr = stderr.trim();
                let message = if !stderr.is_empty() {
                    stderr.to_string()
                } else {
                    match code {
                        Some(code) => format!("process exited with code {}", code),
                        None => "process terminated by signal".to_string(),
                    }
                };
                Some(ChatEvent::error(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatEventKind;

    #[test]
    fn test_noise_lines_are_skipped() {
        let mut parser = ProcessTurnParser::new();

        assert!(parser.feed("").is_empty());
        assert!(parser.feed("warming up...").is_empty());
        assert!(parser.feed("{broken json").is_empty());
        let events = parser.feed(
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"a.txt"}}]}}"#,
        );

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChatEventKind::ToolCall);
        assert_eq!(events[0].content, "Read");
        assert_eq!(events[0].metadata["input"]["file_path"], "a.txt");
        assert_eq!(events[0].metadata["tool_id"], "t1");
    }

    #[test]
    fn test_result_payload_supersedes_buffered_text() {
        let mut parser = ProcessTurnParser::new();
        parser.feed(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"The answer is 4"}]}}"#);
        parser.feed(r#"{"type":"result","subtype":"success","result":"The answer is 4","session_id":"s-1"}"#);

        let event = parser.finish(Some(0), "").unwrap();
        assert_eq!(event.kind, ChatEventKind::Text);
        assert_eq!(event.content, "The answer is 4");
    }

    #[test]
    fn test_buffered_text_used_without_result() {
        let mut parser = ProcessTurnParser::new();
        parser.feed(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"  part one"}]}}"#);
        parser.feed(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"part two  "}]}}"#);

        assert_eq!(parser.final_text().as_deref(), Some("part one\npart two"));
    }

    #[test]
    fn test_no_text_means_no_event() {
        let parser = ProcessTurnParser::new();
        assert!(parser.finish(Some(0), "").is_none());
    }

    #[test]
    fn test_nonzero_exit_uses_stderr() {
        let mut parser = ProcessTurnParser::new();
        parser.feed(r#"{"type":"assistant","message":{"content":[{"type":"text","text":"partial"}]}}"#);

        let event = parser.finish(Some(1), "boom\n").unwrap();
        assert_eq!(event.kind, ChatEventKind::Error);
        assert_eq!(event.content, "boom");
    }

    #[test]
    fn test_nonzero_exit_without_stderr() {
        let parser = ProcessTurnParser::new();
        assert_eq!(parser.finish(Some(3), "  ").unwrap().content, "process exited with code 3");
        assert_eq!(parser.finish(None, "").unwrap().content, "process terminated by signal");
    }

    #[test]
    fn test_continuation_token_tracks_latest_id() {
        let mut parser = ProcessTurnParser::new();
        assert_eq!(parser.continuation_token(), None);

        parser.feed(r#"{"type":"system","subtype":"init","session_id":"first"}"#);
        assert_eq!(parser.continuation_token(), Some("first"));

        parser.feed(r#"{"type":"result","subtype":"error_during_execution","session_id":"second"}"#);
        assert_eq!(parser.continuation_token(), Some("second"));
    }
}
