//! Transport-level access to a model backend.
//!
//! A [`Provider`] turns a chat transcript into a reply, whole or chunked.
//! It knows nothing about tools beyond passing their schemas along; the
//! decision engine in `mediaclaw-providers` interprets the reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};

/// Receiving end of a chunked reply.
pub type ChunkReceiver = mpsc::Receiver<Result<StreamChunk, ProviderError>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Backend model id, e.g. `qwen2.5:7b` or `deepseek-chat`
    pub model: String,

    /// System prompt first, then the rendered session history
    pub messages: Vec<Message>,

    /// Decisions default to 0.0 so tool selection is repeatable.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// The tool catalog as function schemas
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    #[serde(default)]
    pub stream: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.0
}

/// A tool in the function-calling format backends accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,

    /// JSON Schema object for the arguments
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub message: Message,

    pub usage: Option<Usage>,

    /// The model that answered, which an alias may have resolved differently
    pub model: String,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One piece of a chunked reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// New text since the previous chunk
    #[serde(default)]
    pub content: Option<String>,

    /// Tool calls. On intermediate chunks these are deltas: `name` is the
    /// name known so far and `arguments` holds only the new fragment. On the
    /// final chunk they are the fully assembled calls.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Set on the last chunk only
    #[serde(default)]
    pub done: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A chat-completions backend (Ollama, OpenAI, DeepSeek or any compatible
/// server).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short name used in logs and config, e.g. `ollama`.
    fn name(&self) -> &str;

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Chunked reply. Backends without streaming get one final chunk built
    /// from [`Provider::complete`].
    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.message.content),
                tool_calls: response.message.tool_calls,
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}
