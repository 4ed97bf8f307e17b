//! # mediaclaw core
//!
//! Domain types, traits, and error definitions for the mediaclaw media agent.
//! This crate has **no framework dependencies**. It defines the domain model
//! that the other crates implement against:
//!
//! - [`Turn`] and [`SessionId`]: the typed, append-only session history
//! - [`DecisionEngine`] and [`Action`]: the seam over the language model
//! - [`Provider`]: the transport over a concrete model backend
//! - [`ToolDescriptor`]: tool schemas and argument validation
//! - the error taxonomy shared by every crate

pub mod decision;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use decision::{Action, DecisionEngine, DecisionFragment};
pub use error::{DecisionError, Error, ProviderError, Result, ServiceError, SessionError, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition};
pub use tool::{ParamSpec, ParamType, SeasonSelection, ToolDescriptor, ValidatedArgs};
pub use turn::{HistorySnapshot, SessionId, Turn};
