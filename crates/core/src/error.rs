//! Error types for the mediaclaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all mediaclaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model backend errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Decision errors ---
    #[error("Decision error: {0}")]
    Decision(#[from] DecisionError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Collaborator service errors ---
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    // --- Session errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The orchestration loop ran out of decide/invoke round trips.
    #[error("Iteration limit of {limit} exceeded")]
    IterationLimitExceeded { limit: u32 },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Transport-level failures talking to a model backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures of the decision step. All of them are recoverable inside a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionError {
    #[error("Model backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The model named a tool that does not exist or produced arguments
    /// that cannot be parsed.
    #[error("Malformed call to '{tool_name}': {reason}")]
    MalformedOutput { tool_name: String, reason: String },

    #[error("Decision timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

impl DecisionError {
    /// Short machine-readable kind, used in logs and error events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::MalformedOutput { .. } => "malformed_output",
            Self::Timeout { .. } => "decision_timeout",
        }
    }
}

impl DecisionError {
    pub fn malformed(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }
}

impl From<ProviderError> for DecisionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout(msg) => Self::BackendUnavailable(format!("timeout: {msg}")),
            other => Self::BackendUnavailable(other.to_string()),
        }
    }
}

/// Failures dispatching a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool {tool_name} failed: {reason}")]
    Collaborator { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },
}

impl ToolError {
    pub fn invalid(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised before any collaborator was contacted.
    pub fn is_pre_dispatch(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::InvalidArguments { .. })
    }
}

/// Failures talking to an external media service (Radarr, Sonarr, qBittorrent).
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("{service} returned HTTP {status}: {message}")]
    Http {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} rejected the credentials")]
    Unauthorized { service: &'static str },

    #[error("{service} unreachable: {reason}")]
    Network {
        service: &'static str,
        reason: String,
    },

    #[error("{service} returned an unexpected payload: {reason}")]
    Payload {
        service: &'static str,
        reason: String,
    },

    #[error("{service} is missing required setup: {reason}")]
    Setup {
        service: &'static str,
        reason: String,
    },
}

/// Session-level failures, surfaced to the caller before a cycle starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session {0} is busy with another request")]
    Busy(String),
}
