//! The mediaclaw agent.
//!
//! For each user message the [`Orchestrator`] runs one cycle:
//!
//! 1. **Claim** the session (a second concurrent message is rejected)
//! 2. **Decide** the next action from the full history
//! 3. **Invoke** the chosen tool and append its observation, then decide again
//! 4. **Answer** (or ask a clarifying question) and end the stream
//!
//! Progress is pushed to the caller as [`StreamEvent`]s; history lives in
//! the in-memory [`SessionStore`].

pub mod orchestrator;
pub mod publisher;
pub mod session;
pub mod stream_event;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::sync::Arc;

use mediaclaw_config::AppConfig;
use mediaclaw_core::Error;
use mediaclaw_providers::{LlmDecisionEngine, router};

pub use orchestrator::{ChatReply, Orchestrator};
pub use publisher::StreamPublisher;
pub use session::{SessionLease, SessionStore};
pub use stream_event::{FinalOutput, StreamEvent};

/// Wire the configured model backend, media services and session store
/// into an orchestrator.
pub fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator, Error> {
    let providers = router::build_from_config(config);
    let provider = providers.default_provider().ok_or_else(|| Error::Config {
        message: format!("provider '{}' is not configured", config.default_provider),
    })?;
    let model = router::model_for(config, &config.default_provider);

    let engine = LlmDecisionEngine::new(provider, model)
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens);
    let tools = Arc::new(mediaclaw_tools::registry_from_config(&config.services));
    let sessions = Arc::new(SessionStore::new(config.gateway.max_sessions));

    Ok(Orchestrator::new(Arc::new(engine), tools, sessions).with_agent_config(&config.agent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_config() {
        let mut config = AppConfig::default();
        config.agent.max_iterations = 7;

        let agent = build_orchestrator(&config).unwrap();
        assert_eq!(agent.max_iterations(), 7);
        assert_eq!(agent.engine_name(), "ollama");
        assert_eq!(agent.tools().list_descriptors().len(), 12);
    }
}
