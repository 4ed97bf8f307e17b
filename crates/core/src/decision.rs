//! The decision engine seam.
//!
//! Given the session history and the tool catalog, a [`DecisionEngine`]
//! proposes the next [`Action`]. Implementations wrap a model backend; the
//! orchestration loop only sees this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::DecisionError;
use crate::tool::ToolDescriptor;
use crate::turn::Turn;

/// What the engine wants to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Invoke {
        tool_name: String,
        arguments: serde_json::Value,
        /// Reasoning text produced together with the call, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thought: Option<String>,
    },
    Respond {
        text: String,
    },
}

impl Action {
    pub fn invoke(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::Invoke {
            tool_name: tool_name.into(),
            arguments,
            thought: None,
        }
    }

    pub fn respond(text: impl Into<String>) -> Self {
        Self::Respond { text: text.into() }
    }
}

/// A partial result observed while a decision is still being generated.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionFragment {
    /// Reasoning that precedes a tool call. Text that turns out to be the
    /// final answer is never sent as a thought.
    Thought(String),
    /// A slice of tool-call argument text, keyed by the tool being called.
    ToolCallChunk { tool_name: String, chunk: String },
}

#[async_trait]
pub trait DecisionEngine: Send + Sync {
    /// A short name for logs.
    fn name(&self) -> &str;

    /// Decide the next action from the full history.
    async fn decide(
        &self,
        history: &[Turn],
        tools: &[ToolDescriptor],
    ) -> Result<Action, DecisionError>;

    /// Decide while forwarding partial output to `fragments`.
    ///
    /// The default implementation calls [`DecisionEngine::decide`] and sends
    /// nothing. A closed `fragments` channel must not fail the decision.
    async fn decide_streaming(
        &self,
        history: &[Turn],
        tools: &[ToolDescriptor],
        fragments: mpsc::Sender<DecisionFragment>,
    ) -> Result<Action, DecisionError> {
        drop(fragments);
        self.decide(history, tools).await
    }
}
