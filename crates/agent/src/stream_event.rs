//! Events streamed to the client while a cycle runs.
//!
//! The JSON shape is what the web UI consumes:
//! - `status`        - the cycle started
//! - `thinking_step` - free text from the model
//! - `tool_call`     - a tool call, possibly one argument fragment at a time
//! - `tool_result`   - the observation text of a finished call
//! - `final_output`  - the answer shown to the user
//! - `error`         - the cycle gave up
//! - `stream_end`    - always last

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Status { message: String },

    ThinkingStep { data: String },

    ToolCall { tool_name: String, tool_input_chunk: String },

    ToolResult { tool_name: String, observation: String },

    FinalOutput { data: FinalOutput },

    Error { message: String },

    StreamEnd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalOutput {
    pub output: String,
}

impl StreamEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status { message: message.into() }
    }

    pub fn final_output(output: impl Into<String>) -> Self {
        Self::FinalOutput {
            data: FinalOutput { output: output.into() },
        }
    }

    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::ThinkingStep { .. } => "thinking_step",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::FinalOutput { .. } => "final_output",
            Self::Error { .. } => "error",
            Self::StreamEnd => "stream_end",
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Self::StreamEnd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_output_is_nested() {
        let json = serde_json::to_value(StreamEvent::final_output("done")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "final_output", "data": {"output": "done"}}));
    }

    #[test]
    fn stream_end_is_bare() {
        let json = serde_json::to_string(&StreamEvent::StreamEnd).unwrap();
        assert_eq!(json, r#"{"type":"stream_end"}"#);
    }

    #[test]
    fn tool_call_fields() {
        let event = StreamEvent::ToolCall {
            tool_name: "search_movie".into(),
            tool_input_chunk: r#"{"query":"#.into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["tool_name"], "search_movie");
        assert_eq!(json["tool_input_chunk"], r#"{"query":"#);
        assert_eq!(event.event_type(), "tool_call");
    }

    #[test]
    fn event_type_matches_serialized_tag() {
        let events = [
            StreamEvent::status("Agent is thinking..."),
            StreamEvent::ThinkingStep { data: "x".into() },
            StreamEvent::ToolResult {
                tool_name: "get_torrents".into(),
                observation: "当前没有活动的种子。".into(),
            },
            StreamEvent::final_output("ok"),
            StreamEvent::Error { message: "boom".into() },
            StreamEvent::StreamEnd,
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }

    #[test]
    fn deserializes_status() {
        let event: StreamEvent = serde_json::from_str(r#"{"type":"status","message":"hi"}"#).unwrap();
        assert_eq!(event, StreamEvent::status("hi"));
    }
}
