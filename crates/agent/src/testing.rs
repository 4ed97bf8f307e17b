//! A scripted decision engine for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mediaclaw_core::{Action, DecisionEngine, DecisionError, DecisionFragment, ToolDescriptor, Turn};
use tokio::sync::{Semaphore, mpsc};

type Decision = Result<Action, DecisionError>;

/// Plays back a fixed list of decisions and records what it was shown.
///
/// Once the script runs out it answers with `"done"`, unless built with
/// [`ScriptedEngine::repeating`].
pub struct ScriptedEngine {
    script: Mutex<VecDeque<Decision>>,
    repeat: Option<Decision>,
    fragments: Mutex<Option<Vec<DecisionFragment>>>,
    histories: Mutex<Vec<Vec<Turn>>>,
    gate: Option<Arc<Semaphore>>,
}

/// Holds every decision of a gated engine until released.
pub struct Gate(Arc<Semaphore>);

impl Gate {
    pub fn release(&self) {
        self.0.close();
    }
}

impl ScriptedEngine {
    pub fn new(script: Vec<Decision>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            fragments: Mutex::new(None),
            histories: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Return the same decision forever.
    pub fn repeating(decision: Decision) -> Self {
        Self {
            repeat: Some(decision),
            ..Self::new(Vec::new())
        }
    }

    /// Stream these fragments ahead of the first decision.
    pub fn with_fragments(self, fragments: Vec<DecisionFragment>) -> Self {
        Self {
            fragments: Mutex::new(Some(fragments)),
            ..self
        }
    }

    /// Block decisions until the returned gate is released.
    pub fn gated(self) -> (Self, Gate) {
        let semaphore = Arc::new(Semaphore::new(0));
        let engine = Self {
            gate: Some(semaphore.clone()),
            ..self
        };
        (engine, Gate(semaphore))
    }

    /// Number of decisions made so far.
    pub fn calls(&self) -> usize {
        self.histories.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The history passed to each decision, in call order.
    pub fn histories(&self) -> Vec<Vec<Turn>> {
        self.histories.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next(&self) -> Decision {
        if let Some(decision) = &self.repeat {
            return decision.clone();
        }
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(Action::respond("done")))
    }
}

#[async_trait]
impl DecisionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, history: &[Turn], _tools: &[ToolDescriptor]) -> Decision {
        if let Some(gate) = &self.gate {
            // Acquire fails once the gate is closed, which is the release signal.
            let _ = gate.acquire().await;
        }
        self.histories
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(history.to_vec());
        self.next()
    }

    async fn decide_streaming(
        &self,
        history: &[Turn],
        tools: &[ToolDescriptor],
        fragments: mpsc::Sender<DecisionFragment>,
    ) -> Decision {
        let pending = self.fragments.lock().unwrap_or_else(|e| e.into_inner()).take();
        for fragment in pending.unwrap_or_default() {
            let _ = fragments.send(fragment).await;
        }
        self.decide(history, tools).await
    }
}
