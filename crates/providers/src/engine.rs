//! Decision engine backed by a chat-completions model.
//!
//! Renders the typed session history into chat messages, offers the tool
//! catalog as function definitions, and maps the model's reply onto an
//! [`Action`]. Unknown tool names and unparsable arguments come back as
//! [`DecisionError::MalformedOutput`] so the loop can correct the model.

use std::sync::Arc;

use async_trait::async_trait;
use mediaclaw_core::message::{Message, MessageToolCall};
use mediaclaw_core::provider::{Provider, ProviderRequest};
use mediaclaw_core::{Action, DecisionEngine, DecisionError, DecisionFragment, ToolDescriptor, Turn};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::prompt;

pub struct LlmDecisionEngine {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl LlmDecisionEngine {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, history: &[Turn], tools: &[ToolDescriptor], stream: bool) -> ProviderRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(prompt::system_prompt(tools)));
        messages.extend(render_history(history));

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: tools.iter().map(ToolDescriptor::to_definition).collect(),
            stream,
            stop: vec![],
        }
    }
}

#[async_trait]
impl DecisionEngine for LlmDecisionEngine {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn decide(
        &self,
        history: &[Turn],
        tools: &[ToolDescriptor],
    ) -> Result<Action, DecisionError> {
        let request = self.build_request(history, tools, false);
        debug!(provider = %self.provider.name(), model = %self.model, turns = history.len(), "Requesting decision");

        let response = self.provider.complete(request).await?;
        to_action(response.message.content, response.message.tool_calls, tools)
    }

    async fn decide_streaming(
        &self,
        history: &[Turn],
        tools: &[ToolDescriptor],
        fragments: mpsc::Sender<DecisionFragment>,
    ) -> Result<Action, DecisionError> {
        let request = self.build_request(history, tools, true);
        debug!(provider = %self.provider.name(), model = %self.model, turns = history.len(), "Requesting streamed decision");

        let mut rx = self.provider.stream(request).await?;
        let mut content = String::new();
        // Text stays buffered until a tool call shows up. Without one it is
        // the answer, and the answer is never streamed as a thought.
        let mut calling = false;

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;

            if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                content.push_str(&text);
                if calling {
                    // A dropped receiver only means nobody is listening
                    let _ = fragments.send(DecisionFragment::Thought(text)).await;
                }
            }

            if chunk.done {
                return to_action(content, chunk.tool_calls, tools);
            }

            for delta in chunk.tool_calls {
                if !calling {
                    calling = true;
                    if !content.trim().is_empty() {
                        let _ = fragments.send(DecisionFragment::Thought(content.clone())).await;
                    }
                }
                if delta.arguments.is_empty() || !tools.iter().any(|t| t.name == delta.name) {
                    continue;
                }
                let _ = fragments
                    .send(DecisionFragment::ToolCallChunk {
                        tool_name: delta.name,
                        chunk: delta.arguments,
                    })
                    .await;
            }
        }

        Err(DecisionError::BackendUnavailable(
            "response stream closed before completion".into(),
        ))
    }
}

/// Map a model reply onto an [`Action`]. Only the first tool call is acted on.
fn to_action(
    content: String,
    tool_calls: Vec<MessageToolCall>,
    tools: &[ToolDescriptor],
) -> Result<Action, DecisionError> {
    let content = content.trim().to_string();

    let mut calls = tool_calls.into_iter();
    let first = calls.next();
    if calls.len() > 0 {
        debug!(dropped = calls.len(), "Ignoring extra tool calls in one reply");
    }

    let Some(call) = first else {
        if content.is_empty() {
            return Err(DecisionError::BackendUnavailable(
                "model returned an empty response".into(),
            ));
        }
        return Ok(Action::respond(content));
    };

    if !tools.iter().any(|t| t.name == call.name) {
        warn!(tool = %call.name, "Model selected an unknown tool");
        return Err(DecisionError::malformed(
            &call.name,
            format!("tool '{}' does not exist", call.name),
        ));
    }

    let arguments = if call.arguments.trim().is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(&call.arguments).map_err(|e| {
            DecisionError::malformed(&call.name, format!("arguments are not valid JSON: {e}"))
        })?
    };

    Ok(Action::Invoke {
        tool_name: call.name,
        arguments,
        thought: (!content.is_empty()).then_some(content),
    })
}

/// Render typed turns as chat messages.
///
/// A thought directly followed by an invocation becomes the content of the
/// assistant message that carries the tool call.
pub fn render_history(history: &[Turn]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len());
    let mut pending_thought: Option<String> = None;

    for turn in history {
        if !matches!(turn, Turn::ToolInvocation { .. }) {
            if let Some(thought) = pending_thought.take() {
                messages.push(Message::assistant(thought));
            }
        }

        match turn {
            Turn::UserMessage { text } => messages.push(Message::user(text)),
            Turn::AgentThought { text } => pending_thought = Some(text.clone()),
            Turn::ToolInvocation {
                call_id,
                tool_name,
                arguments,
            } => {
                let content = pending_thought.take().unwrap_or_default();
                let arguments = match arguments {
                    serde_json::Value::String(raw) => raw.clone(),
                    other => other.to_string(),
                };
                messages.push(Message::assistant_tool_call(
                    content,
                    MessageToolCall {
                        id: call_id.clone(),
                        name: tool_name.clone(),
                        arguments,
                    },
                ));
            }
            Turn::ToolObservation {
                call_id,
                result_text,
                ..
            } => messages.push(Message::tool_result(call_id, result_text)),
            Turn::FinalAnswer { text } => messages.push(Message::assistant(text)),
        }
    }

    if let Some(thought) = pending_thought {
        messages.push(Message::assistant(thought));
    }

    messages
}
