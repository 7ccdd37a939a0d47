// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution Dispatcher
//!
//! Failure envelope around a single `check` or `receive` call.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Invoke agent behavior, commit or discard its effects
//! - **Integration:** Scheduler / Propagator / manual runs → Dispatcher → AgentBehavior
//!
//! # Run lifecycle
//!
//! 1. Claim the per-agent in-flight slot (an agent never runs twice at once).
//! 2. Reload the agent and reject it if it is no longer runnable.
//! 3. For pending receives, select the batch against the stored cursor while
//!    holding the slot.
//! 4. Invoke the behavior with panics caught.
//! 5. On success, append emitted events, write log lines and apply a
//!    [`RunRecord`] that carries the cursor compare-and-advance.
//!    On failure, write an error log and apply a failed [`RunRecord`]; memory
//!    and emitted events are discarded and the cursor stays put.
//!
//! Batch callers use [`ExecutionDispatcher::dispatch`], which never fails and
//! reports an [`Outcome`]. Manual runs use the `*_now` methods, which return
//! the failure to the caller after it has been recorded.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::application::cursor::CursorTracker;
use crate::application::repository_factory::Repositories;
use crate::domain::agent::{Agent, AgentId, CursorAdvance, RunKind, RunRecord, RunResult};
use crate::domain::agent_log::{LogLevel, NewAgentLog};
use crate::domain::event::{Event, EventId, NewEvent};
use crate::domain::events::ExecutionEvent;
use crate::domain::registry::{AgentContext, AgentError, AgentRegistry, ContextOutcome};
use crate::domain::repository::{AgentLogRepository, AgentRepository, EventRepository, RepositoryError};
use crate::infrastructure::event_bus::EventBus;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Check,
    /// Deliver everything the agent has not received yet and advance its cursor.
    ReceivePending,
    /// Deliver an explicit set of events. The cursor is left alone.
    Receive(Vec<EventId>),
}

impl Invocation {
    pub fn kind(&self) -> RunKind {
        match self {
            Invocation::Check => RunKind::Check,
            Invocation::ReceivePending | Invocation::Receive(_) => RunKind::Receive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub agent_id: AgentId,
    pub kind: RunKind,
    pub received: usize,
    pub emitted: Vec<EventId>,
    /// Cursor after the run, when this run moved it.
    pub cursor: Option<EventId>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Busy,
    NotRunnable,
    NothingPending,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Busy => write!(f, "already running"),
            SkipReason::NotRunnable => write!(f, "disabled or deactivated"),
            SkipReason::NothingPending => write!(f, "no pending events"),
        }
    }
}

/// Result of a batch-mode dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Completed(RunSummary),
    Failed { agent_id: AgentId, error: String },
    Skipped { agent_id: AgentId, reason: SkipReason },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Agent {0} not found")]
    AgentNotFound(AgentId),

    #[error("Agent {0} is disabled or deactivated")]
    NotRunnable(AgentId),

    #[error("Agent {0} is already running")]
    Busy(AgentId),

    #[error("Agent {0} has no pending events")]
    NothingPending(AgentId),

    #[error("Unknown agent type '{0}'")]
    UnknownType(String),

    #[error("Agent {agent_id} {kind} failed: {source}")]
    Failed {
        agent_id: AgentId,
        kind: RunKind,
        #[source]
        source: AgentError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Removes the in-flight marker when the run ends, however it ends.
pub(crate) struct InFlightGuard<'a> {
    in_flight: &'a DashMap<AgentId, RunKind>,
    agent_id: AgentId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.agent_id);
    }
}

pub struct ExecutionDispatcher {
    agents: Arc<dyn AgentRepository>,
    events: Arc<dyn EventRepository>,
    logs: Arc<dyn AgentLogRepository>,
    cursor: CursorTracker,
    registry: Arc<AgentRegistry>,
    event_bus: EventBus,
    in_flight: DashMap<AgentId, RunKind>,
    emitted: Arc<Notify>,
    max_logs_per_agent: usize,
}

impl ExecutionDispatcher {
    pub fn new(
        repos: &Repositories,
        registry: Arc<AgentRegistry>,
        event_bus: EventBus,
        max_logs_per_agent: usize,
    ) -> Self {
        Self {
            agents: repos.agents.clone(),
            events: repos.events.clone(),
            logs: repos.logs.clone(),
            cursor: CursorTracker::new(repos.agents.clone(), repos.links.clone(), repos.events.clone()),
            registry,
            event_bus,
            in_flight: DashMap::new(),
            emitted: Arc::new(Notify::new()),
            max_logs_per_agent,
        }
    }

    /// Signalled whenever a run emits at least one event.
    pub fn emit_signal(&self) -> Arc<Notify> {
        self.emitted.clone()
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn cursor(&self) -> &CursorTracker {
        &self.cursor
    }

    pub fn is_running(&self, agent_id: AgentId) -> bool {
        self.in_flight.contains_key(&agent_id)
    }

    /// Batch mode: never fails, failures are recorded and reported.
    pub async fn dispatch(&self, agent_id: AgentId, invocation: Invocation) -> Outcome {
        let kind = invocation.kind();
        match self.execute(agent_id, invocation).await {
            Ok(summary) => Outcome::Completed(summary),
            Err(DispatchError::Busy(_)) => self.skipped(agent_id, kind, SkipReason::Busy),
            Err(DispatchError::NotRunnable(_)) => self.skipped(agent_id, kind, SkipReason::NotRunnable),
            Err(DispatchError::NothingPending(_)) => Outcome::Skipped {
                agent_id,
                reason: SkipReason::NothingPending,
            },
            Err(e) => Outcome::Failed {
                agent_id,
                error: e.to_string(),
            },
        }
    }

    /// Single-shot check. The failure is recorded, then returned.
    pub async fn run_check_now(&self, agent_id: AgentId) -> Result<RunSummary, DispatchError> {
        self.execute(agent_id, Invocation::Check).await
    }

    /// Single-shot delivery of the agent's pending events.
    pub async fn receive_pending_now(&self, agent_id: AgentId) -> Result<RunSummary, DispatchError> {
        self.execute(agent_id, Invocation::ReceivePending).await
    }

    /// Single-shot delivery of explicit events, without moving the cursor.
    pub async fn run_receive_now(&self, agent_id: AgentId, event_ids: Vec<EventId>) -> Result<RunSummary, DispatchError> {
        self.execute(agent_id, Invocation::Receive(event_ids)).await
    }

    fn skipped(&self, agent_id: AgentId, kind: RunKind, reason: SkipReason) -> Outcome {
        debug!(agent_id = %agent_id, %kind, %reason, "Skipping agent run");
        metrics::counter!("conduit_agent_runs_total", "kind" => kind.to_string(), "outcome" => "skipped").increment(1);
        self.event_bus.publish_execution_event(ExecutionEvent::RunSkipped {
            agent_id,
            kind,
            reason: reason.to_string(),
            skipped_at: Utc::now(),
        });
        Outcome::Skipped { agent_id, reason }
    }

    pub(crate) fn claim(&self, agent_id: AgentId, kind: RunKind) -> Result<InFlightGuard<'_>, DispatchError> {
        match self.in_flight.entry(agent_id) {
            Entry::Occupied(_) => Err(DispatchError::Busy(agent_id)),
            Entry::Vacant(slot) => {
                slot.insert(kind);
                Ok(InFlightGuard {
                    in_flight: &self.in_flight,
                    agent_id,
                })
            }
        }
    }

    async fn execute(&self, agent_id: AgentId, invocation: Invocation) -> Result<RunSummary, DispatchError> {
        let kind = invocation.kind();
        let _guard = self.claim(agent_id, kind)?;

        let agent = self
            .agents
            .find_by_id(agent_id)
            .await?
            .ok_or(DispatchError::AgentNotFound(agent_id))?;
        if !agent.is_runnable() {
            return Err(DispatchError::NotRunnable(agent_id));
        }

        let now = Utc::now();
        let (events, cursor) = match invocation {
            Invocation::Check => (Vec::new(), None),
            Invocation::ReceivePending => {
                let batch = self.cursor.unreceived_events(&agent, now).await?;
                if batch.is_empty() {
                    return Err(DispatchError::NothingPending(agent_id));
                }
                let advance = batch.cursor_advance();
                (batch.events, advance)
            }
            Invocation::Receive(ids) => (self.events.find_by_ids(&ids).await?, None),
        };
        let inbound = events.last().map(|e| e.id);

        let Some(behavior) = self.registry.get(agent.agent_type()) else {
            let message = format!("Unknown agent type '{}'", agent.agent_type());
            self.record_failure(&agent, kind, inbound, &message).await?;
            return Err(DispatchError::UnknownType(agent.agent_type().to_string()));
        };

        self.event_bus.publish_execution_event(ExecutionEvent::RunStarted {
            agent_id,
            kind,
            started_at: now,
        });
        debug!(agent_id = %agent_id, %kind, batch = events.len(), "Running agent");

        let started = Instant::now();
        let mut ctx = AgentContext::new(agent.clone(), now);
        let result = AssertUnwindSafe(async {
            match kind {
                RunKind::Check => behavior.check(&mut ctx).await,
                RunKind::Receive => behavior.receive(&mut ctx, &events).await,
            }
        })
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(AgentError::Panicked(panic_message(panic))));

        let elapsed = started.elapsed();
        metrics::histogram!("conduit_agent_run_duration_seconds", "kind" => kind.to_string())
            .record(elapsed.as_secs_f64());

        match result {
            Ok(()) => {
                let summary = self
                    .commit(&agent, kind, ctx.into_outcome(), &events, cursor)
                    .await?;
                metrics::counter!("conduit_agent_runs_total", "kind" => kind.to_string(), "outcome" => "success")
                    .increment(1);
                Ok(RunSummary {
                    duration_ms: elapsed.as_millis() as u64,
                    ..summary
                })
            }
            Err(source) => {
                let message = source.to_string();
                self.record_failure(&agent, kind, inbound, &message).await?;
                Err(DispatchError::Failed { agent_id, kind, source })
            }
        }
    }

    async fn commit(
        &self,
        agent: &Agent,
        kind: RunKind,
        outcome: ContextOutcome,
        delivered: &[Event],
        cursor: Option<CursorAdvance>,
    ) -> Result<RunSummary, RepositoryError> {
        let inbound = delivered.last().map(|e| e.id);
        let retention = agent.event_retention();

        let mut emitted = Vec::with_capacity(outcome.emitted.len());
        let mut last_event_at: Option<DateTime<Utc>> = None;
        for event in outcome.emitted {
            let created_at = Utc::now();
            let expires_at = event.expires_at.or_else(|| retention.map(|r| created_at + r));
            let stored = self
                .events
                .append(NewEvent {
                    agent_id: agent.id,
                    user_id: agent.user_id,
                    payload: event.payload,
                    created_at,
                    expires_at,
                })
                .await?;
            emitted.push(stored.id);
            last_event_at = Some(stored.created_at);
        }

        for (level, message) in outcome.logs {
            self.logs
                .append(NewAgentLog::new(agent.id, level, message).inbound(inbound))
                .await?;
        }

        let record = RunRecord {
            kind,
            finished_at: Utc::now(),
            result: RunResult::Succeeded {
                memory: outcome.memory,
                emitted: emitted.len() as u64,
                last_event_at,
                cursor,
            },
        };
        let advanced = match self.agents.record_run(agent.id, &record).await {
            Ok(advanced) => advanced,
            Err(e) => {
                warn!(
                    agent_id = %agent.id,
                    emitted = emitted.len(),
                    "Run outcome not recorded; emitted events were kept and memory changes lost: {}",
                    e
                );
                let message = format!("Failed to record run: {}", e);
                if let Err(failure) = self.record_failure(agent, kind, inbound, &message).await {
                    error!(agent_id = %agent.id, "Failed to record run failure: {}", failure);
                }
                return Err(e);
            }
        };
        if cursor.is_some() && !advanced {
            warn!(agent_id = %agent.id, "Cursor was moved concurrently; delivered batch not recorded on cursor");
        }
        self.trim_logs(agent.id).await;

        let at = record.finished_at;
        let new_cursor = cursor.filter(|_| advanced).map(|c| c.to);
        match kind {
            RunKind::Check => {
                self.event_bus.publish_execution_event(ExecutionEvent::AgentChecked {
                    agent_id: agent.id,
                    emitted: emitted.len(),
                    checked_at: at,
                });
            }
            RunKind::Receive => {
                metrics::counter!("conduit_events_delivered_total").increment(delivered.len() as u64);
                self.event_bus.publish_execution_event(ExecutionEvent::EventsReceived {
                    agent_id: agent.id,
                    count: delivered.len(),
                    cursor: new_cursor,
                    received_at: at,
                });
            }
        }
        if !emitted.is_empty() {
            metrics::counter!("conduit_events_emitted_total").increment(emitted.len() as u64);
            self.event_bus.publish_execution_event(ExecutionEvent::EventsEmitted {
                agent_id: agent.id,
                event_ids: emitted.clone(),
                emitted_at: at,
            });
            self.emitted.notify_one();
        }

        info!(
            agent_id = %agent.id,
            %kind,
            received = delivered.len(),
            emitted = emitted.len(),
            "Agent run succeeded"
        );

        Ok(RunSummary {
            agent_id: agent.id,
            kind,
            received: delivered.len(),
            emitted,
            cursor: new_cursor,
            duration_ms: 0,
        })
    }

    async fn record_failure(
        &self,
        agent: &Agent,
        kind: RunKind,
        inbound: Option<EventId>,
        message: &str,
    ) -> Result<(), RepositoryError> {
        error!(agent_id = %agent.id, %kind, "Agent run failed: {}", message);
        metrics::counter!("conduit_agent_runs_total", "kind" => kind.to_string(), "outcome" => "failure").increment(1);

        self.logs
            .append(NewAgentLog::new(agent.id, LogLevel::Error, message).inbound(inbound))
            .await?;
        let record = RunRecord {
            kind,
            finished_at: Utc::now(),
            result: RunResult::Failed,
        };
        self.agents.record_run(agent.id, &record).await?;
        self.trim_logs(agent.id).await;

        self.event_bus.publish_execution_event(ExecutionEvent::RunFailed {
            agent_id: agent.id,
            kind,
            error: message.to_string(),
            failed_at: record.finished_at,
        });
        Ok(())
    }

    async fn trim_logs(&self, agent_id: AgentId) {
        if let Err(e) = self.logs.truncate(agent_id, self.max_logs_per_agent).await {
            warn!(agent_id = %agent_id, "Failed to truncate agent logs: {}", e);
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::UserId;
    use crate::domain::document::{document, Document};
    use crate::domain::link::Link;
    use crate::domain::registry::{AgentBehavior, AgentTypeDescriptor};
    use async_trait::async_trait;
    use serde_json::json;

    struct Emitter(AgentTypeDescriptor);

    #[async_trait]
    impl AgentBehavior for Emitter {
        fn descriptor(&self) -> &AgentTypeDescriptor {
            &self.0
        }

        async fn check(&self, ctx: &mut AgentContext) -> Result<(), AgentError> {
            ctx.memory_mut().insert("checked".into(), json!(true));
            ctx.create_event(document(json!({"n": 1})));
            ctx.log("checked");
            Ok(())
        }

        async fn receive(&self, ctx: &mut AgentContext, events: &[Event]) -> Result<(), AgentError> {
            if events.iter().any(|e| e.payload.contains_key("boom")) {
                ctx.create_event(Document::new());
                return Err(AgentError::failed("cannot handle boom"));
            }
            if events.iter().any(|e| e.payload.contains_key("panic")) {
                panic!("receive blew up");
            }
            Ok(())
        }
    }

    fn setup() -> (Repositories, ExecutionDispatcher) {
        let repos = Repositories::in_memory();
        let registry = AgentRegistry::new().with(Arc::new(Emitter(AgentTypeDescriptor::new("emitter"))));
        let dispatcher = ExecutionDispatcher::new(&repos, Arc::new(registry), EventBus::new(64), 10);
        (repos, dispatcher)
    }

    async fn linked_pair(repos: &Repositories) -> (Agent, Agent) {
        let user = UserId::new();
        let source = Agent::new(user, "source", "emitter");
        let receiver = Agent::new(user, "receiver", "emitter");
        repos.agents.save(&source).await.unwrap();
        repos.agents.save(&receiver).await.unwrap();
        repos.links.create(&Link::new(source.id, receiver.id).unwrap()).await.unwrap();
        (source, receiver)
    }

    async fn append(repos: &Repositories, source: &Agent, payload: serde_json::Value) -> EventId {
        repos
            .events
            .append(NewEvent {
                agent_id: source.id,
                user_id: source.user_id,
                payload: document(payload),
                created_at: Utc::now(),
                expires_at: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_successful_check_commits_effects() {
        let (repos, dispatcher) = setup();
        let mut agent = Agent::new(UserId::new(), "a", "emitter");
        agent.keep_events_for_days = 2;
        repos.agents.save(&agent).await.unwrap();
        let signal = dispatcher.emit_signal();

        let summary = dispatcher.run_check_now(agent.id).await.unwrap();
        assert_eq!(summary.emitted.len(), 1);

        let stored = repos.agents.find_by_id(agent.id).await.unwrap().unwrap();
        assert_eq!(stored.memory.get("checked"), Some(&json!(true)));
        assert!(stored.last_check_at.is_some());
        assert_eq!(stored.events_count, 1);
        assert!(stored.last_event_at.is_some());

        let event = repos.events.find_by_id(summary.emitted[0]).await.unwrap().unwrap();
        assert_eq!(event.expires_at, Some(event.created_at + chrono::Duration::days(2)));

        let logs = repos.logs.find_by_agent(agent.id, 10).await.unwrap();
        assert_eq!(logs[0].level, LogLevel::Info);

        // The emit signal holds a permit for the next waiter.
        tokio::time::timeout(std::time::Duration::from_millis(50), signal.notified())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_receive_discards_effects_and_keeps_cursor() {
        let (repos, dispatcher) = setup();
        let (source, receiver) = linked_pair(&repos).await;
        append(&repos, &source, json!({"ok": 1})).await;
        let bad = append(&repos, &source, json!({"boom": 1})).await;

        let err = dispatcher.receive_pending_now(receiver.id).await.unwrap_err();
        assert!(matches!(err, DispatchError::Failed { kind: RunKind::Receive, .. }));

        let stored = repos.agents.find_by_id(receiver.id).await.unwrap().unwrap();
        assert_eq!(stored.last_checked_event_id, None);
        assert_eq!(stored.consecutive_failures, 1);
        assert!(stored.last_error_log_at.is_some());
        assert!(stored.last_receive_at.is_none());
        assert!(repos.events.latest_by_agent(receiver.id, 10).await.unwrap().is_empty());

        let logs = repos.logs.find_by_agent(receiver.id, 10).await.unwrap();
        assert_eq!(logs[0].level, LogLevel::Error);
        assert_eq!(logs[0].inbound_event_id, Some(bad));
    }

    #[tokio::test]
    async fn test_batch_dispatch_reports_panics_as_failures() {
        let (repos, dispatcher) = setup();
        let (source, receiver) = linked_pair(&repos).await;
        append(&repos, &source, json!({"panic": true})).await;

        let outcome = dispatcher.dispatch(receiver.id, Invocation::ReceivePending).await;
        match outcome {
            Outcome::Failed { agent_id, error } => {
                assert_eq!(agent_id, receiver.id);
                assert!(error.contains("receive blew up"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!dispatcher.is_running(receiver.id));
    }

    #[tokio::test]
    async fn test_busy_agent_is_rejected() {
        let (repos, dispatcher) = setup();
        let agent = Agent::new(UserId::new(), "a", "emitter");
        repos.agents.save(&agent).await.unwrap();

        let _held = dispatcher.claim(agent.id, RunKind::Check).unwrap();
        assert!(matches!(
            dispatcher.run_check_now(agent.id).await,
            Err(DispatchError::Busy(_))
        ));
        assert_eq!(
            dispatcher.dispatch(agent.id, Invocation::Check).await,
            Outcome::Skipped {
                agent_id: agent.id,
                reason: SkipReason::Busy
            }
        );
    }

    #[tokio::test]
    async fn test_manual_receive_leaves_cursor() {
        let (repos, dispatcher) = setup();
        let (source, receiver) = linked_pair(&repos).await;
        let id = append(&repos, &source, json!({"ok": 1})).await;

        let summary = dispatcher.run_receive_now(receiver.id, vec![id]).await.unwrap();
        assert_eq!(summary.received, 1);
        assert_eq!(summary.cursor, None);
        let stored = repos.agents.find_by_id(receiver.id).await.unwrap().unwrap();
        assert_eq!(stored.last_checked_event_id, None);
        assert!(stored.last_receive_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_type_is_recorded() {
        let (repos, dispatcher) = setup();
        let agent = Agent::new(UserId::new(), "ghost", "missing");
        repos.agents.save(&agent).await.unwrap();

        assert!(matches!(
            dispatcher.run_check_now(agent.id).await,
            Err(DispatchError::UnknownType(t)) if t == "missing"
        ));
        let stored = repos.agents.find_by_id(agent.id).await.unwrap().unwrap();
        assert_eq!(stored.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_disabled_agent_is_not_run() {
        let (repos, dispatcher) = setup();
        let mut agent = Agent::new(UserId::new(), "a", "emitter");
        agent.disabled = true;
        repos.agents.save(&agent).await.unwrap();

        assert!(matches!(
            dispatcher.run_check_now(agent.id).await,
            Err(DispatchError::NotRunnable(_))
        ));
    }

    /// Rejects successful run records and passes everything else through.
    struct RejectSuccess(Arc<dyn AgentRepository>);

    #[async_trait]
    impl AgentRepository for RejectSuccess {
        async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
            self.0.save(agent).await
        }

        async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
            self.0.find_by_id(id).await
        }

        async fn find_by_ids(&self, ids: &[AgentId]) -> Result<Vec<Agent>, RepositoryError> {
            self.0.find_by_ids(ids).await
        }

        async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Agent>, RepositoryError> {
            self.0.find_by_user(user_id).await
        }

        async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
            self.0.list_all().await
        }

        async fn find_scheduled(&self) -> Result<Vec<Agent>, RepositoryError> {
            self.0.find_scheduled().await
        }

        async fn record_run(&self, id: AgentId, record: &RunRecord) -> Result<bool, RepositoryError> {
            match record.result {
                RunResult::Succeeded { .. } => Err(RepositoryError::Database("connection reset".into())),
                RunResult::Failed => self.0.record_run(id, record).await,
            }
        }

        async fn advance_cursor(&self, id: AgentId, advance: CursorAdvance) -> Result<bool, RepositoryError> {
            self.0.advance_cursor(id, advance).await
        }

        async fn force_cursor(&self, id: AgentId, cursor: Option<EventId>) -> Result<(), RepositoryError> {
            self.0.force_cursor(id, cursor).await
        }

        async fn update_memory(&self, id: AgentId, memory: Document) -> Result<(), RepositoryError> {
            self.0.update_memory(id, memory).await
        }

        async fn set_deactivated_for_user(&self, user_id: UserId, deactivated: bool) -> Result<u64, RepositoryError> {
            self.0.set_deactivated_for_user(user_id, deactivated).await
        }

        async fn delete(&self, id: AgentId) -> Result<(), RepositoryError> {
            self.0.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_unrecorded_commit_is_logged_as_failure() {
        let base = Repositories::in_memory();
        let repos = Repositories {
            agents: Arc::new(RejectSuccess(base.agents.clone())),
            links: base.links.clone(),
            events: base.events.clone(),
            logs: base.logs.clone(),
        };
        let registry = AgentRegistry::new().with(Arc::new(Emitter(AgentTypeDescriptor::new("emitter"))));
        let dispatcher = ExecutionDispatcher::new(&repos, Arc::new(registry), EventBus::new(64), 10);
        let agent = Agent::new(UserId::new(), "a", "emitter");
        repos.agents.save(&agent).await.unwrap();

        assert!(matches!(
            dispatcher.run_check_now(agent.id).await,
            Err(DispatchError::Repository(_))
        ));

        let stored = repos.agents.find_by_id(agent.id).await.unwrap().unwrap();
        assert_eq!(stored.consecutive_failures, 1);
        assert!(stored.memory.is_empty());
        assert_eq!(repos.events.latest_by_agent(agent.id, 10).await.unwrap().len(), 1);
        let logs = repos.logs.find_by_agent(agent.id, 10).await.unwrap();
        assert!(logs
            .iter()
            .any(|l| l.level == LogLevel::Error && l.message.contains("Failed to record run")));
    }
}
