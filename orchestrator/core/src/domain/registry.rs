// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Registry
//!
//! Maps a stable agent type key (e.g. `"digest"`) to the behavior that
//! implements it. Behaviors are supplied as [`AgentBehavior`] trait objects and
//! describe themselves with an [`AgentTypeDescriptor`] (default schedule and
//! capability flags).
//!
//! Behaviors never touch repositories directly. They read and mutate an
//! [`AgentContext`]; the execution dispatcher commits the context (memory,
//! emitted events, log lines) only when the call succeeds.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::agent::{Agent, RunKind};
use crate::domain::agent_log::LogLevel;
use crate::domain::document::{days_option, Document};
use crate::domain::event::Event;
use crate::domain::schedule::Schedule;

/// Option keys the default health expectation is read from.
pub const EXPECTED_UPDATE_PERIOD: &str = "expected_update_period_in_days";
pub const EXPECTED_RECEIVE_PERIOD: &str = "expected_receive_period_in_days";

/// Static description of an agent type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTypeDescriptor {
    pub key: String,
    pub description: String,
    pub default_schedule: Schedule,
    pub can_be_scheduled: bool,
    pub can_receive_events: bool,
    pub can_create_events: bool,
}

impl AgentTypeDescriptor {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            default_schedule: Schedule::Never,
            can_be_scheduled: true,
            can_receive_events: true,
            can_create_events: true,
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_schedule(mut self, schedule: Schedule) -> Self {
        self.default_schedule = schedule;
        self
    }

    pub fn cannot_be_scheduled(mut self) -> Self {
        self.can_be_scheduled = false;
        self.default_schedule = Schedule::Never;
        self
    }

    pub fn cannot_receive_events(mut self) -> Self {
        self.can_receive_events = false;
        self
    }

    pub fn cannot_create_events(mut self) -> Self {
        self.can_create_events = false;
        self
    }
}

/// Failure raised by agent logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Agent type '{agent_type}' does not support {kind}")]
    Unsupported { agent_type: String, kind: RunKind },

    #[error("Agent logic panicked: {0}")]
    Panicked(String),
}

impl AgentError {
    pub fn failed(message: impl Into<String>) -> Self {
        AgentError::Failed(message.into())
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Failed(format!("{:#}", err))
    }
}

/// An event emitted during a run, before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub payload: Document,
    /// Explicit expiry; `None` falls back to the agent's retention.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Mutable view handed to agent logic for the duration of one run.
#[derive(Debug, Clone)]
pub struct AgentContext {
    agent: Agent,
    memory: Document,
    now: DateTime<Utc>,
    emitted: Vec<EmittedEvent>,
    logs: Vec<(LogLevel, String)>,
}

/// What a successful run leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextOutcome {
    pub memory: Document,
    pub emitted: Vec<EmittedEvent>,
    pub logs: Vec<(LogLevel, String)>,
}

impl AgentContext {
    pub fn new(agent: Agent, now: DateTime<Utc>) -> Self {
        let memory = agent.memory.clone();
        Self {
            agent,
            memory,
            now,
            emitted: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn options(&self) -> &Document {
        &self.agent.options
    }

    pub fn memory(&self) -> &Document {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Document {
        &mut self.memory
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn create_event(&mut self, payload: Document) {
        self.emitted.push(EmittedEvent {
            payload,
            expires_at: None,
        });
    }

    pub fn create_event_expiring(&mut self, payload: Document, expires_at: DateTime<Utc>) {
        self.emitted.push(EmittedEvent {
            payload,
            expires_at: Some(expires_at),
        });
    }

    pub fn emitted(&self) -> &[EmittedEvent] {
        &self.emitted
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push((LogLevel::Info, message.into()));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.logs.push((LogLevel::Warning, message.into()));
    }

    pub fn into_outcome(self) -> ContextOutcome {
        ContextOutcome {
            memory: self.memory,
            emitted: self.emitted,
            logs: self.logs,
        }
    }
}

/// Pluggable agent behavior: `{check, receive, validate}`.
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    fn descriptor(&self) -> &AgentTypeDescriptor;

    /// Validate options at the edit boundary.
    fn validate_options(&self, _options: &Document) -> Result<(), AgentError> {
        Ok(())
    }

    /// Window within which an agent of this type is expected to show activity.
    /// `None` exempts the agent from staleness checks.
    fn expected_window(&self, options: &Document) -> Option<Duration> {
        match (
            days_option(options, EXPECTED_UPDATE_PERIOD),
            days_option(options, EXPECTED_RECEIVE_PERIOD),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    async fn check(&self, _ctx: &mut AgentContext) -> Result<(), AgentError> {
        Err(AgentError::Unsupported {
            agent_type: self.descriptor().key.clone(),
            kind: RunKind::Check,
        })
    }

    async fn receive(&self, _ctx: &mut AgentContext, _events: &[Event]) -> Result<(), AgentError> {
        Err(AgentError::Unsupported {
            agent_type: self.descriptor().key.clone(),
            kind: RunKind::Receive,
        })
    }
}

/// Type key → behavior lookup.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    behaviors: BTreeMap<String, Arc<dyn AgentBehavior>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a behavior under its descriptor key, replacing any previous one.
    pub fn register(&mut self, behavior: Arc<dyn AgentBehavior>) -> &mut Self {
        let key = behavior.descriptor().key.clone();
        self.behaviors.insert(key, behavior);
        self
    }

    pub fn with(mut self, behavior: Arc<dyn AgentBehavior>) -> Self {
        self.register(behavior);
        self
    }

    pub fn get(&self, agent_type: &str) -> Option<Arc<dyn AgentBehavior>> {
        self.behaviors.get(agent_type).cloned()
    }

    pub fn contains(&self, agent_type: &str) -> bool {
        self.behaviors.contains_key(agent_type)
    }

    pub fn descriptors(&self) -> Vec<AgentTypeDescriptor> {
        self.behaviors.values().map(|b| b.descriptor().clone()).collect()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("types", &self.behaviors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::UserId;
    use crate::domain::document::document;
    use serde_json::json;

    struct Noop(AgentTypeDescriptor);

    #[async_trait]
    impl AgentBehavior for Noop {
        fn descriptor(&self) -> &AgentTypeDescriptor {
            &self.0
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = AgentRegistry::new().with(Arc::new(Noop(AgentTypeDescriptor::new("noop"))));
        assert!(registry.contains("noop"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.descriptors().len(), 1);
    }

    #[test]
    fn test_default_expected_window_takes_shorter_period() {
        let noop = Noop(AgentTypeDescriptor::new("noop"));
        let opts = document(json!({
            EXPECTED_UPDATE_PERIOD: "5",
            EXPECTED_RECEIVE_PERIOD: 2
        }));
        assert_eq!(noop.expected_window(&opts), Some(Duration::days(2)));
        assert_eq!(noop.expected_window(&Document::new()), None);
    }

    #[tokio::test]
    async fn test_default_check_is_unsupported() {
        let noop = Noop(AgentTypeDescriptor::new("noop"));
        let agent = Agent::new(UserId::new(), "n", "noop");
        let mut ctx = AgentContext::new(agent, Utc::now());
        let err = noop.check(&mut ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::Unsupported { kind: RunKind::Check, .. }));
    }

    #[test]
    fn test_context_collects_outcome() {
        let agent = Agent::new(UserId::new(), "n", "noop");
        let mut ctx = AgentContext::new(agent, Utc::now());
        ctx.memory_mut().insert("k".into(), json!(1));
        ctx.create_event(document(json!({"a": 1})));
        ctx.warn("careful");
        let outcome = ctx.into_outcome();
        assert_eq!(outcome.memory.get("k"), Some(&json!(1)));
        assert_eq!(outcome.emitted.len(), 1);
        assert_eq!(outcome.logs, vec![(LogLevel::Warning, "careful".to_string())]);
    }
}
