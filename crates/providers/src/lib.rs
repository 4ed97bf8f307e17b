//! Model backend providers for mediaclaw.
//!
//! All providers implement the `mediaclaw_core::Provider` trait. The router
//! selects one from configuration and [`LlmDecisionEngine`] turns it into a
//! `DecisionEngine` for the orchestration loop.

pub mod engine;
pub mod openai_compat;
pub mod prompt;
pub mod router;

pub use engine::LlmDecisionEngine;
pub use openai_compat::OpenAiCompatProvider;
pub use router::ProviderRouter;
