//! Session identifiers and the typed conversation history.
//!
//! A session's history is an append-only sequence of [`Turn`]s. Turns are
//! never edited after they are appended; the decision engine replays the
//! whole sequence on every call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, client-chosen identifier of a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// The id used when a client does not send one.
    pub const DEFAULT: &'static str = "default_session";

    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::from(Self::DEFAULT)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One immutable unit of conversation or tool history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    UserMessage {
        text: String,
    },

    /// Free-text reasoning the model produced alongside an action.
    AgentThought {
        text: String,
    },

    ToolInvocation {
        /// Correlates the invocation with its observation.
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    ToolObservation {
        call_id: String,
        tool_name: String,
        result_text: String,
    },

    FinalAnswer {
        text: String,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserMessage { text: text.into() }
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self::AgentThought { text: text.into() }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Self::FinalAnswer { text: text.into() }
    }

    pub fn invocation(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolInvocation {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn observation(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        result_text: impl Into<String>,
    ) -> Self {
        Self::ToolObservation {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            result_text: result_text.into(),
        }
    }

    /// Snake-case name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user_message",
            Self::AgentThought { .. } => "agent_thought",
            Self::ToolInvocation { .. } => "tool_invocation",
            Self::ToolObservation { .. } => "tool_observation",
            Self::FinalAnswer { .. } => "final_answer",
        }
    }
}

/// A snapshot of one session's history, as handed to API consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub session_id: SessionId,
    pub generation: u64,
    pub turns: Vec<Turn>,
    pub updated_at: DateTime<Utc>,
}
