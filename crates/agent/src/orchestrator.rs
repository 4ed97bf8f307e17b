//! The orchestration loop.
//!
//! One cycle handles one user message:
//!
//! 1. **Decide**: ask the [`DecisionEngine`] for the next [`Action`],
//!    forwarding partial output as stream events
//! 2. **Invoke**: validate and dispatch the tool call, append the
//!    invocation and its observation, then decide again
//! 3. **Respond** / **Clarify**: append the final answer and stop
//!
//! Tool failures, malformed model output and backend outages are fed back
//! as data and retried. The loop only gives up after `max_iterations`
//! decisions, and even then it answers the user and ends the stream.

use std::sync::Arc;
use std::time::Duration;

use mediaclaw_config::AgentConfig;
use mediaclaw_core::{Action, DecisionEngine, DecisionError, DecisionFragment, Error, SessionError, SessionId, ToolError, Turn};
use mediaclaw_tools::{ToolRegistry, ToolRequest};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::publisher::{self, StreamPublisher};
use crate::session::{SessionLease, SessionStore};
use crate::stream_event::StreamEvent;

pub const DEFAULT_MAX_ITERATIONS: u32 = 12;
pub const THINKING_STATUS: &str = "Agent is thinking...";

const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Runs cycles against a shared session store and tool registry.
///
/// Cloning is cheap; every clone drives the same sessions.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn DecisionEngine>,
    tools: Arc<ToolRegistry>,
    sessions: Arc<SessionStore>,
    max_iterations: u32,
    decision_timeout: Duration,
    tool_timeout: Duration,
    retry_backoff: Duration,
}

/// The outcome of a cycle run without streaming.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub session_id: SessionId,
    pub response: String,
    pub events: Vec<StreamEvent>,
}

/// What was already forwarded to the client during one decision.
#[derive(Default)]
struct Streamed {
    thought: bool,
    tool_call: bool,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn DecisionEngine>, tools: Arc<ToolRegistry>, sessions: Arc<SessionStore>) -> Self {
        Self {
            engine,
            tools,
            sessions,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            decision_timeout: DEFAULT_DECISION_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Set the maximum number of decisions per cycle.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_decision_timeout(mut self, timeout: Duration) -> Self {
        self.decision_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Pause before re-deciding after the backend failed.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Apply the `[agent]` config section.
    pub fn with_agent_config(self, config: &AgentConfig) -> Self {
        self.with_max_iterations(config.max_iterations)
            .with_decision_timeout(Duration::from_secs(config.decision_timeout_secs))
            .with_tool_timeout(Duration::from_secs(config.tool_timeout_secs))
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Start a cycle and return its event stream.
    ///
    /// The session is claimed before anything is spawned, so a busy
    /// session fails here and no stream is opened.
    pub async fn run_stream(
        &self,
        session_id: SessionId,
        message: impl Into<String>,
    ) -> Result<mpsc::Receiver<StreamEvent>, SessionError> {
        let lease = self.sessions.acquire(&session_id).await?;
        let (publisher, rx) = StreamPublisher::channel(publisher::DEFAULT_CAPACITY);
        let message = message.into();
        let this = self.clone();
        tokio::spawn(async move {
            this.run_cycle(lease, message, publisher).await;
        });
        Ok(rx)
    }

    /// Run a cycle to completion and collect its events.
    pub async fn run(&self, session_id: SessionId, message: impl Into<String>) -> Result<ChatReply, SessionError> {
        let mut rx = self.run_stream(session_id.clone(), message).await?;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let response = events
            .iter()
            .rev()
            .find_map(|e| match e {
                StreamEvent::FinalOutput { data } => Some(data.output.clone()),
                _ => None,
            })
            .unwrap_or_default();

        Ok(ChatReply {
            session_id,
            response,
            events,
        })
    }

    async fn run_cycle(&self, lease: SessionLease, message: String, mut publisher: StreamPublisher) {
        let session_id = lease.session_id().clone();
        info!(session_id = %session_id, engine = self.engine.name(), "Starting cycle");
        publisher.publish(StreamEvent::status(THINKING_STATUS)).await;

        let mut cycle = Cycle {
            history: lease.history().await,
            lease: &lease,
        };
        cycle.record(Turn::user(message)).await;

        let mut last_error: Option<DecisionError> = None;
        for iteration in 1..=self.max_iterations {
            debug!(session_id = %session_id, iteration, "Deciding");

            let mut streamed = Streamed::default();
            let decision = self.decide(&cycle.history, &mut publisher, &mut streamed).await;

            match decision {
                Ok(Action::Respond { text }) => {
                    info!(session_id = %session_id, iteration, "Cycle answered");
                    cycle.record(Turn::answer(text.clone())).await;
                    publisher.publish(StreamEvent::final_output(text)).await;
                    publisher.finish().await;
                    return;
                }
                Ok(Action::Invoke {
                    tool_name,
                    arguments,
                    thought,
                }) => {
                    if let Some(thought) = thought.filter(|t| !t.trim().is_empty()) {
                        if !streamed.thought {
                            publisher.publish(StreamEvent::ThinkingStep { data: thought.clone() }).await;
                        }
                        cycle.record(Turn::thought(thought)).await;
                    }

                    if self.tools.is_terminal(&tool_name) {
                        match ToolRequest::parse(&tool_name, &arguments) {
                            Ok(ToolRequest::AskUserForClarification { question }) => {
                                info!(session_id = %session_id, iteration, "Cycle asks for clarification");
                                cycle.record(Turn::answer(question.clone())).await;
                                publisher.publish(StreamEvent::final_output(question)).await;
                                publisher.finish().await;
                                return;
                            }
                            other => {
                                let reason = match other {
                                    Err(err) => err.to_string(),
                                    Ok(_) => format!("'{tool_name}' needs a question"),
                                };
                                warn!(session_id = %session_id, iteration, %reason, "Unusable clarification");
                                let call_id = new_call_id();
                                cycle
                                    .record(Turn::invocation(&call_id, &tool_name, arguments))
                                    .await;
                                cycle
                                    .record(Turn::observation(&call_id, &tool_name, format!("Error: {reason}")))
                                    .await;
                                publisher
                                    .publish(StreamEvent::status(format!("Correcting tool call: {reason}")))
                                    .await;
                                continue;
                            }
                        }
                    }

                    if !streamed.tool_call {
                        publisher
                            .publish(StreamEvent::ToolCall {
                                tool_name: tool_name.clone(),
                                tool_input_chunk: arguments.to_string(),
                            })
                            .await;
                    }

                    let call_id = new_call_id();
                    cycle
                        .record(Turn::invocation(&call_id, &tool_name, arguments.clone()))
                        .await;
                    let observation = self.dispatch(&tool_name, &arguments).await;
                    cycle
                        .record(Turn::observation(&call_id, &tool_name, &observation))
                        .await;
                    publisher
                        .publish(StreamEvent::ToolResult {
                            tool_name,
                            observation,
                        })
                        .await;
                }
                Err(DecisionError::MalformedOutput { tool_name, reason }) => {
                    warn!(session_id = %session_id, iteration, tool = %tool_name, %reason, "Malformed decision");
                    let call_id = new_call_id();
                    cycle
                        .record(Turn::invocation(&call_id, &tool_name, serde_json::json!({})))
                        .await;
                    let correction = self.correction(&reason);
                    cycle
                        .record(Turn::observation(&call_id, &tool_name, &correction))
                        .await;
                    // A call the client already saw gets its result.
                    if streamed.tool_call {
                        publisher
                            .publish(StreamEvent::ToolResult {
                                tool_name,
                                observation: correction,
                            })
                            .await;
                    }
                    publisher
                        .publish(StreamEvent::status(format!("Correcting tool call: {reason}")))
                        .await;
                }
                Err(err) => {
                    warn!(session_id = %session_id, iteration, kind = err.kind(), error = %err, "Decision failed");
                    publisher
                        .publish(StreamEvent::status(format!("Model backend problem, retrying: {err}")))
                        .await;
                    last_error = Some(err);
                    if iteration < self.max_iterations && !self.retry_backoff.is_zero() {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
            }
        }

        let limit = Error::IterationLimitExceeded {
            limit: self.max_iterations,
        };
        warn!(session_id = %session_id, limit = self.max_iterations, "Cycle aborted");
        let message = match &last_error {
            Some(err) => format!("{limit} (last error: {err})"),
            None => limit.to_string(),
        };
        publisher.publish(StreamEvent::Error { message }).await;

        let answer = format!(
            "抱歉，未能在 {} 步内完成您的请求。请换个说法或稍后再试。",
            self.max_iterations
        );
        cycle.record(Turn::answer(answer.clone())).await;
        publisher.publish(StreamEvent::final_output(answer)).await;
        publisher.finish().await;
    }

    /// One bounded decision, forwarding fragments as they arrive.
    ///
    /// The deadline covers forwarding too, so a client that stops reading
    /// cannot hold the decision open past the decision timeout.
    async fn decide(
        &self,
        history: &[Turn],
        publisher: &mut StreamPublisher,
        streamed: &mut Streamed,
    ) -> Result<Action, DecisionError> {
        let (tx, mut rx) = mpsc::channel(publisher::DEFAULT_CAPACITY);
        let decision = self
            .engine
            .decide_streaming(history, self.tools.list_descriptors(), tx);

        let pump = async {
            tokio::pin!(decision);
            loop {
                tokio::select! {
                    biased;
                    Some(fragment) = rx.recv() => self.forward(fragment, publisher, streamed).await,
                    result = &mut decision => break result,
                }
            }
        };
        let result = match tokio::time::timeout(self.decision_timeout, pump).await {
            Ok(result) => result,
            Err(_) => Err(DecisionError::Timeout {
                timeout_secs: self.decision_timeout.as_secs(),
            }),
        };

        while let Ok(fragment) = rx.try_recv() {
            self.forward(fragment, publisher, streamed).await;
        }
        result
    }

    async fn forward(&self, fragment: DecisionFragment, publisher: &mut StreamPublisher, streamed: &mut Streamed) {
        match fragment {
            DecisionFragment::Thought(data) if !data.is_empty() => {
                streamed.thought = true;
                publisher.publish(StreamEvent::ThinkingStep { data }).await;
            }
            DecisionFragment::Thought(_) => {}
            DecisionFragment::ToolCallChunk { tool_name, chunk } => {
                // Unknown tools never become a call, and the clarification
                // question is shown as the answer.
                let callable = self
                    .tools
                    .descriptor(&tool_name)
                    .is_some_and(|d| !d.terminal);
                if !callable {
                    debug!(tool = %tool_name, "Not forwarding call fragment");
                    return;
                }
                streamed.tool_call = true;
                publisher
                    .publish(StreamEvent::ToolCall {
                        tool_name,
                        tool_input_chunk: chunk,
                    })
                    .await;
            }
        }
    }

    /// Invoke a tool under the tool timeout. Every outcome is observation text.
    async fn dispatch(&self, tool_name: &str, arguments: &serde_json::Value) -> String {
        let started = std::time::Instant::now();
        let result = tokio::time::timeout(self.tool_timeout, self.tools.invoke(tool_name, arguments)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(text)) => {
                debug!(tool = %tool_name, elapsed_ms, "Tool finished");
                text
            }
            Ok(Err(err @ ToolError::NotFound(_))) => {
                warn!(tool = %tool_name, "Unknown tool");
                self.correction(&err.to_string())
            }
            Ok(Err(err)) => {
                warn!(tool = %tool_name, error = %err, "Tool call rejected");
                format!("Error: {err}. Fix the arguments and call the tool again.")
            }
            Err(_) => {
                let err = ToolError::Timeout {
                    tool_name: tool_name.to_string(),
                    timeout_secs: self.tool_timeout.as_secs(),
                };
                warn!(tool = %tool_name, elapsed_ms, "Tool timed out");
                format!("Error: {err}")
            }
        }
    }

    fn correction(&self, reason: &str) -> String {
        let names: Vec<&str> = self
            .tools
            .list_descriptors()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        format!("Error: {reason}. Available tools: {}.", names.join(", "))
    }
}

/// The working copy of a session's history during one cycle.
struct Cycle<'a> {
    history: Vec<Turn>,
    lease: &'a SessionLease,
}

impl Cycle<'_> {
    async fn record(&mut self, turn: Turn) {
        self.history.push(turn.clone());
        self.lease.append(turn).await;
    }
}

fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedEngine;
    use mediaclaw_core::SeasonSelection;
    use mediaclaw_tools::testing::{FakeLibrary, FakeTorrents};
    use serde_json::json;

    fn registry(movies: Arc<FakeLibrary>, series: Arc<FakeLibrary>) -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::new(movies, series, Arc::new(FakeTorrents::default())))
    }

    fn orchestrator(engine: Arc<ScriptedEngine>, tools: Arc<ToolRegistry>) -> Orchestrator {
        Orchestrator::new(engine, tools, Arc::new(SessionStore::default())).with_retry_backoff(Duration::ZERO)
    }

    fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::event_type).collect()
    }

    #[tokio::test]
    async fn search_then_download() {
        let movies = Arc::new(FakeLibrary::movies().with_hit("Interstellar", 2014, 157336));
        let engine = Arc::new(ScriptedEngine::new(vec![
            Ok(Action::invoke("search_movie", json!({"query": "Interstellar"}))),
            Ok(Action::invoke("download_movie", json!({"tmdb_id": 157336}))),
            Ok(Action::respond("已开始下载 Interstellar。")),
        ]));
        let agent = orchestrator(engine.clone(), registry(movies.clone(), Arc::new(FakeLibrary::series())));

        let reply = agent.run(SessionId::from("s1"), "search for Interstellar").await.unwrap();

        assert_eq!(
            kinds(&reply.events),
            vec!["status", "tool_call", "tool_result", "tool_call", "tool_result", "final_output", "stream_end"]
        );
        assert_eq!(reply.response, "已开始下载 Interstellar。");
        assert_eq!(movies.added(), vec![(157336, SeasonSelection::All)]);

        // The second decision saw the search observation.
        let seen = engine.histories();
        assert!(matches!(
            seen[1].last(),
            Some(Turn::ToolObservation { result_text, .. }) if result_text.contains("TMDB ID: 157336")
        ));
    }

    #[tokio::test]
    async fn clarification_ends_the_cycle_without_a_tool_call() {
        let engine = Arc::new(ScriptedEngine::new(vec![Ok(Action::invoke(
            "ask_user_for_clarification",
            json!({"question": "您是想搜索电影还是电视剧？"}),
        ))]));
        let agent = orchestrator(
            engine.clone(),
            registry(Arc::new(FakeLibrary::movies()), Arc::new(FakeLibrary::series())),
        );

        let reply = agent.run(SessionId::from("s1"), "搜索'阿凡达'").await.unwrap();

        assert_eq!(kinds(&reply.events), vec!["status", "final_output", "stream_end"]);
        assert_eq!(reply.response, "您是想搜索电影还是电视剧？");
        assert_eq!(engine.calls(), 1);

        let turns = agent.sessions().snapshot(&SessionId::from("s1")).await.turns;
        assert_eq!(
            turns,
            vec![Turn::user("搜索'阿凡达'"), Turn::answer("您是想搜索电影还是电视剧？")]
        );
    }

    #[tokio::test]
    async fn clarification_without_question_is_corrected_quietly() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            Ok(Action::invoke("ask_user_for_clarification", json!({}))),
            Ok(Action::respond("ok")),
        ]));
        let agent = orchestrator(
            engine.clone(),
            registry(Arc::new(FakeLibrary::movies()), Arc::new(FakeLibrary::series())),
        );

        let reply = agent.run(SessionId::from("s1"), "hm").await.unwrap();
        assert_eq!(kinds(&reply.events), vec!["status", "status", "final_output", "stream_end"]);
        assert!(matches!(
            engine.histories()[1].last(),
            Some(Turn::ToolObservation { result_text, .. }) if result_text.contains("missing parameter 'question'")
        ));
    }

    #[tokio::test]
    async fn invalid_arguments_are_corrected() {
        let series = Arc::new(FakeLibrary::series().with_hit("Breaking Bad", 2008, 81189));
        let engine = Arc::new(ScriptedEngine::new(vec![
            Ok(Action::invoke("download_series", json!({"tvdb_id": "abc", "seasons": [2]}))),
            Ok(Action::invoke("download_series", json!({"tvdb_id": 81189, "seasons": [2]}))),
            Ok(Action::respond("好的")),
        ]));
        let agent = orchestrator(engine.clone(), registry(Arc::new(FakeLibrary::movies()), series.clone()));

        let reply = agent.run(SessionId::from("s1"), "download season 2 of Breaking Bad").await.unwrap();

        assert_eq!(reply.response, "好的");
        let results: Vec<&str> = reply
            .events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolResult { observation, .. } => Some(observation.as_str()),
                _ => None,
            })
            .collect();
        assert!(results[0].starts_with("Error: Invalid arguments for download_series"), "{}", results[0]);
        assert!(results[0].contains("tvdb_id"));
        assert!(results[1].contains("第 2 季"));
        // Only the valid call reached Sonarr.
        assert_eq!(series.calls(), 1);
        assert_eq!(series.added(), vec![(81189, SeasonSelection::Only(vec![2]))]);
    }

    #[tokio::test]
    async fn unknown_tool_is_corrected_from_malformed_output() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            Err(DecisionError::malformed("download_films", "tool 'download_films' does not exist")),
            Ok(Action::respond("done")),
        ]));
        let agent = orchestrator(
            engine.clone(),
            registry(Arc::new(FakeLibrary::movies()), Arc::new(FakeLibrary::series())),
        );

        let reply = agent.run(SessionId::from("s1"), "get me a film").await.unwrap();
        assert_eq!(reply.response, "done");

        let second = &engine.histories()[1];
        let n = second.len();
        assert!(matches!(&second[n - 2], Turn::ToolInvocation { tool_name, .. } if tool_name == "download_films"));
        assert!(matches!(
            &second[n - 1],
            Turn::ToolObservation { tool_name, result_text, .. }
                if tool_name == "download_films" && result_text.contains("Available tools: search_movie")
        ));
    }

    #[tokio::test]
    async fn iteration_cap_is_exact() {
        let movies = Arc::new(FakeLibrary::movies());
        let engine = Arc::new(ScriptedEngine::repeating(Ok(Action::invoke("get_radarr_queue", json!({})))));
        let agent =
            orchestrator(engine.clone(), registry(movies.clone(), Arc::new(FakeLibrary::series()))).with_max_iterations(4);

        let reply = agent.run(SessionId::from("s1"), "loop forever").await.unwrap();

        assert_eq!(engine.calls(), 4);
        assert_eq!(movies.calls(), 4);
        let tail: Vec<_> = kinds(&reply.events).into_iter().rev().take(3).collect();
        assert_eq!(tail, vec!["stream_end", "final_output", "error"]);
        assert!(matches!(
            &reply.events[reply.events.len() - 3],
            StreamEvent::Error { message } if message.contains("Iteration limit of 4 exceeded")
        ));
        assert!(reply.response.contains("4 步"));
    }

    #[tokio::test]
    async fn backend_outage_is_retried_then_aborts() {
        let engine = Arc::new(ScriptedEngine::repeating(Err(DecisionError::BackendUnavailable(
            "connection refused".into(),
        ))));
        let agent = orchestrator(
            engine.clone(),
            registry(Arc::new(FakeLibrary::movies()), Arc::new(FakeLibrary::series())),
        )
        .with_max_iterations(3);

        let reply = agent.run(SessionId::from("s1"), "hello").await.unwrap();

        assert_eq!(engine.calls(), 3);
        let events = kinds(&reply.events);
        assert_eq!(events.iter().filter(|k| **k == "stream_end").count(), 1);
        assert_eq!(events.last(), Some(&"stream_end"));
        assert!(reply.events.iter().any(
            |e| matches!(e, StreamEvent::Error { message } if message.contains("connection refused"))
        ));
    }

    #[tokio::test]
    async fn backend_recovers_after_one_failure() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            Err(DecisionError::Timeout { timeout_secs: 90 }),
            Ok(Action::respond("back")),
        ]));
        let agent = orchestrator(
            engine,
            registry(Arc::new(FakeLibrary::movies()), Arc::new(FakeLibrary::series())),
        );
        let reply = agent.run(SessionId::from("s1"), "hi").await.unwrap();
        assert_eq!(reply.response, "back");
        assert!(!reply.events.iter().any(|e| e.event_type() == "error"));
    }

    #[tokio::test]
    async fn busy_session_is_rejected_then_history_carries_over() {
        let (engine, gate) = ScriptedEngine::new(vec![Ok(Action::respond("first")), Ok(Action::respond("second"))]).gated();
        let engine = Arc::new(engine);
        let agent = orchestrator(
            engine.clone(),
            registry(Arc::new(FakeLibrary::movies()), Arc::new(FakeLibrary::series())),
        );
        let id = SessionId::from("shared");

        let mut first = agent.run_stream(id.clone(), "one").await.unwrap();
        let err = agent.run_stream(id.clone(), "two").await.unwrap_err();
        assert_eq!(err, SessionError::Busy("shared".into()));

        gate.release();
        while first.recv().await.is_some() {}

        let reply = agent.run(id.clone(), "two").await.unwrap();
        assert_eq!(reply.response, "second");
        let seen = engine.histories();
        assert_eq!(
            seen[1],
            vec![Turn::user("one"), Turn::answer("first"), Turn::user("two")]
        );
    }

    #[tokio::test]
    async fn slow_tool_times_out_into_an_observation() {
        let movies = Arc::new(FakeLibrary::movies().with_latency(Duration::from_secs(5)));
        let engine = Arc::new(ScriptedEngine::new(vec![
            Ok(Action::invoke("list_movies", json!({}))),
            Ok(Action::respond("sorry")),
        ]));
        let agent = orchestrator(engine, registry(movies, Arc::new(FakeLibrary::series())))
            .with_tool_timeout(Duration::from_millis(20));

        let reply = agent.run(SessionId::from("s1"), "list").await.unwrap();
        assert!(reply.events.iter().any(|e| matches!(
            e,
            StreamEvent::ToolResult { observation, .. } if observation.contains("timed out")
        )));
        assert_eq!(reply.response, "sorry");
    }

    #[tokio::test]
    async fn reset_during_cycle_discards_late_turns() {
        let (engine, gate) = ScriptedEngine::new(vec![Ok(Action::respond("late answer"))]).gated();
        let agent = orchestrator(
            Arc::new(engine),
            registry(Arc::new(FakeLibrary::movies()), Arc::new(FakeLibrary::series())),
        );
        let id = SessionId::from("racy");

        let mut rx = agent.run_stream(id.clone(), "hello").await.unwrap();
        // Wait until the cycle is running.
        assert_eq!(rx.recv().await, Some(StreamEvent::status(THINKING_STATUS)));
        agent.sessions().reset(&id).await;
        gate.release();
        while rx.recv().await.is_some() {}

        let snap = agent.sessions().snapshot(&id).await;
        assert!(snap.turns.is_empty(), "{:?}", snap.turns);
        assert_eq!(snap.generation, 1);
    }

    #[tokio::test]
    async fn streamed_fragments_replace_the_whole_call_event() {
        let engine = Arc::new(
            ScriptedEngine::new(vec![
                Ok(Action::invoke("search_movie", json!({"query": "Dune"}))),
                Ok(Action::respond("ok")),
            ])
            .with_fragments(vec![
                DecisionFragment::Thought("Searching first.".into()),
                DecisionFragment::ToolCallChunk {
                    tool_name: "search_movie".into(),
                    chunk: r#"{"query":"#.into(),
                },
                DecisionFragment::ToolCallChunk {
                    tool_name: "search_movie".into(),
                    chunk: r#""Dune"}"#.into(),
                },
            ]),
        );
        let agent = orchestrator(
            engine,
            registry(Arc::new(FakeLibrary::movies()), Arc::new(FakeLibrary::series())),
        );

        let reply = agent.run(SessionId::from("s1"), "find Dune").await.unwrap();
        assert_eq!(
            kinds(&reply.events),
            vec!["status", "thinking_step", "tool_call", "tool_call", "tool_result", "final_output", "stream_end"]
        );
    }

    #[tokio::test]
    async fn malformed_call_fragments_are_not_streamed() {
        let engine = Arc::new(
            ScriptedEngine::new(vec![
                Err(DecisionError::malformed("download_films", "tool 'download_films' does not exist")),
                Ok(Action::respond("done")),
            ])
            .with_fragments(vec![DecisionFragment::ToolCallChunk {
                tool_name: "download_films".into(),
                chunk: "{}".into(),
            }]),
        );
        let agent = orchestrator(
            engine,
            registry(Arc::new(FakeLibrary::movies()), Arc::new(FakeLibrary::series())),
        );

        let reply = agent.run(SessionId::from("s1"), "get me a film").await.unwrap();
        assert_eq!(kinds(&reply.events), vec!["status", "status", "final_output", "stream_end"]);
    }

    #[tokio::test]
    async fn streamed_call_that_fails_to_parse_still_gets_a_result() {
        let engine = Arc::new(
            ScriptedEngine::new(vec![
                Err(DecisionError::malformed("search_movie", "arguments are not valid JSON")),
                Ok(Action::respond("done")),
            ])
            .with_fragments(vec![DecisionFragment::ToolCallChunk {
                tool_name: "search_movie".into(),
                chunk: r#"{"query": "#.into(),
            }]),
        );
        let agent = orchestrator(
            engine,
            registry(Arc::new(FakeLibrary::movies()), Arc::new(FakeLibrary::series())),
        );

        let reply = agent.run(SessionId::from("s1"), "find Dune").await.unwrap();
        assert_eq!(
            kinds(&reply.events),
            vec!["status", "tool_call", "tool_result", "status", "final_output", "stream_end"]
        );
        assert!(matches!(
            &reply.events[2],
            StreamEvent::ToolResult { tool_name, observation }
                if tool_name == "search_movie" && observation.contains("not valid JSON")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn client_that_stops_reading_does_not_pin_the_session() {
        let thoughts = (0..200).map(|i| DecisionFragment::Thought(format!("step {i}"))).collect();
        let engine = Arc::new(ScriptedEngine::new(vec![Ok(Action::respond("ok"))]).with_fragments(thoughts));
        let agent = orchestrator(
            engine,
            registry(Arc::new(FakeLibrary::movies()), Arc::new(FakeLibrary::series())),
        )
        .with_decision_timeout(Duration::from_millis(50));
        let id = SessionId::from("stalled");

        // Held open, never read.
        let _stalled = agent.run_stream(id.clone(), "hello").await.unwrap();

        let freed = tokio::time::timeout(Duration::from_secs(30), async {
            while agent.sessions().is_busy(&id).await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(freed.is_ok(), "session still busy");

        let turns = agent.sessions().snapshot(&id).await.turns;
        assert_eq!(turns.last(), Some(&Turn::answer("ok")));
        assert!(agent.run(id, "again").await.is_ok());
    }

    // ── Streaming through the model-backed engine ─────────────────────────

    use mediaclaw_core::{Message, MessageToolCall, Provider, ProviderError, ProviderRequest, ProviderResponse, StreamChunk};
    use mediaclaw_providers::LlmDecisionEngine;
    use std::sync::Mutex;

    /// Streams one scripted chunk sequence per request.
    struct ChunkedProvider {
        replies: Mutex<Vec<Vec<StreamChunk>>>,
    }

    impl ChunkedProvider {
        fn new(replies: Vec<Vec<StreamChunk>>) -> Self {
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait::async_trait]
    impl Provider for ChunkedProvider {
        fn name(&self) -> &str {
            "chunked"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant("done"),
                usage: None,
                model: "m".into(),
                metadata: serde_json::Map::new(),
            })
        }

        async fn stream(
            &self,
            _request: ProviderRequest,
        ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
            let chunks = {
                let mut replies = self.replies.lock().unwrap();
                if replies.is_empty() { vec![done(vec![])] } else { replies.remove(0) }
            };
            let (tx, rx) = mpsc::channel(chunks.len().max(1));
            for chunk in chunks {
                tx.send(Ok(chunk)).await.unwrap();
            }
            Ok(rx)
        }
    }

    fn text(content: &str) -> StreamChunk {
        StreamChunk {
            content: Some(content.into()),
            tool_calls: vec![],
            done: false,
            usage: None,
        }
    }

    fn delta(name: &str, arguments: &str) -> StreamChunk {
        StreamChunk {
            content: None,
            tool_calls: vec![MessageToolCall {
                id: "call_0".into(),
                name: name.into(),
                arguments: arguments.into(),
            }],
            done: false,
            usage: None,
        }
    }

    fn done(calls: Vec<(&str, &str)>) -> StreamChunk {
        StreamChunk {
            content: None,
            tool_calls: calls
                .into_iter()
                .map(|(name, arguments)| MessageToolCall {
                    id: "call_0".into(),
                    name: name.into(),
                    arguments: arguments.into(),
                })
                .collect(),
            done: true,
            usage: None,
        }
    }

    fn chunked_agent(replies: Vec<Vec<StreamChunk>>) -> Orchestrator {
        let movies = Arc::new(FakeLibrary::movies().with_hit("Dune", 2021, 438631));
        let engine = LlmDecisionEngine::new(Arc::new(ChunkedProvider::new(replies)), "m");
        Orchestrator::new(
            Arc::new(engine),
            registry(movies, Arc::new(FakeLibrary::series())),
            Arc::new(SessionStore::default()),
        )
        .with_retry_backoff(Duration::ZERO)
    }

    #[tokio::test]
    async fn chunked_answer_streams_no_thinking_steps() {
        let agent = chunked_agent(vec![vec![text("您的"), text("片库是空的。"), done(vec![])]]);

        let reply = agent.run(SessionId::from("s1"), "我有什么电影").await.unwrap();
        assert_eq!(kinds(&reply.events), vec!["status", "final_output", "stream_end"]);
        assert_eq!(reply.response, "您的片库是空的。");
    }

    #[tokio::test]
    async fn chunked_tool_call_streams_thought_then_call() {
        let agent = chunked_agent(vec![
            vec![
                text("先搜索一下。"),
                delta("search_movie", r#"{"query":"#),
                delta("search_movie", r#""Dune"}"#),
                done(vec![("search_movie", r#"{"query":"Dune"}"#)]),
            ],
            vec![text("找到了 Dune (2021)。"), done(vec![])],
        ]);

        let reply = agent.run(SessionId::from("s1"), "找 Dune").await.unwrap();
        assert_eq!(
            kinds(&reply.events),
            vec!["status", "thinking_step", "tool_call", "tool_call", "tool_result", "final_output", "stream_end"]
        );
        assert_eq!(reply.events[1], StreamEvent::ThinkingStep { data: "先搜索一下。".into() });
        assert_eq!(reply.response, "找到了 Dune (2021)。");
    }

    #[tokio::test]
    async fn chunked_unknown_tool_is_corrected_without_a_call_event() {
        let agent = chunked_agent(vec![
            vec![delta("download_films", "{}"), done(vec![("download_films", "{}")])],
            vec![text("好的。"), done(vec![])],
        ]);

        let reply = agent.run(SessionId::from("s1"), "下载 Dune").await.unwrap();
        assert_eq!(kinds(&reply.events), vec!["status", "status", "final_output", "stream_end"]);
        assert_eq!(reply.response, "好的。");
    }
}
