//! Chat messages exchanged with a model backend.
//!
//! These are the wire-level value objects a [`crate::Provider`] understands.
//! Session history is kept as typed [`crate::Turn`]s; the decision engine
//! renders turns into messages right before each backend call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chat-completions role. Serialized lowercase, as OpenAI-compatible
/// backends expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// The prompt carrying the tool catalog and answer rules
    System,
    /// An observation answering an earlier tool call
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,

    /// Set on assistant messages that request a tool. Only the first call
    /// is ever acted on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Set on [`Role::Tool`] messages: the call this observation answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// Backend-specific extras. Never rendered into prompts.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// An observation for the model, linked to the call that produced it.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// An assistant turn that requests exactly one tool call. `content` is
    /// the reasoning that came with it, possibly empty.
    pub fn assistant_tool_call(content: impl Into<String>, call: MessageToolCall) -> Self {
        Self {
            tool_calls: vec![call],
            ..Self::assistant(content)
        }
    }
}

/// One tool call as the backend reports it. `arguments` is raw JSON text
/// and may be invalid; the decision engine parses it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("search for Interstellar");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "search for Interstellar");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn tool_result_links_call_id() {
        let msg = Message::tool_result("call_search_movie", "电影: Interstellar, 年份: 2014, TMDB ID: 157336");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_search_movie"));
    }

    #[test]
    fn assistant_with_tool_call() {
        let msg = Message::assistant_tool_call(
            "",
            MessageToolCall {
                id: "call_1".into(),
                name: "search_movie".into(),
                arguments: r#"{"query":"Interstellar"}"#.into(),
            },
        );
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.tool_calls.len(), 1);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"assistant""#));
    }
}
