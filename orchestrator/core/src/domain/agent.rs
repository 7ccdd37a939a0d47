// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Aggregate
//!
//! An [`Agent`] is a configured unit that periodically checks an external
//! condition and/or reacts to incoming events, producing events of its own.
//!
//! The aggregate carries two kinds of state:
//!
//! - **Configuration** (`name`, `options`, `schedule`, `disabled`,
//!   `keep_events_for_days`) edited by operators through
//!   [`crate::application::agent::AgentLifecycleService`].
//! - **Run state** (`memory`, timestamps, cursor, failure counter) written
//!   only by the execution dispatcher through [`RunRecord`]s.
//!
//! Repositories keep the two apart so a concurrent operator edit never
//! overwrites run state and vice versa.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::document::Document;
use crate::domain::event::EventId;
use crate::domain::schedule::Schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner of agents. Accounts themselves live outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: AgentId,
    pub user_id: UserId,
    pub name: String,
    /// Registry key of the behavior. Assigned once at construction.
    pub(crate) agent_type: String,
    #[serde(default)]
    pub options: Document,
    #[serde(default)]
    pub memory: Document,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub disabled: bool,
    /// Mirrors the owner's deactivation; changed only in bulk per user.
    #[serde(default)]
    pub deactivated: bool,
    /// Retention for emitted events; 0 keeps them forever.
    #[serde(default)]
    pub keep_events_for_days: u32,
    pub last_checked_event_id: Option<EventId>,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_receive_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_error_log_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub events_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(user_id: UserId, name: impl Into<String>, agent_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            user_id,
            name: name.into(),
            agent_type: agent_type.into(),
            options: Document::new(),
            memory: Document::new(),
            schedule: Schedule::Never,
            disabled: false,
            deactivated: false,
            keep_events_for_days: 0,
            last_checked_event_id: None,
            last_check_at: None,
            last_receive_at: None,
            last_event_at: None,
            last_error_log_at: None,
            consecutive_failures: 0,
            events_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_options(mut self, options: Document) -> Self {
        self.options = options;
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    /// Effective runnable state: neither disabled by the operator nor
    /// deactivated with its owner.
    pub fn is_runnable(&self) -> bool {
        !self.disabled && !self.deactivated
    }

    /// Retention window for newly emitted events.
    pub fn event_retention(&self) -> Option<chrono::Duration> {
        if self.keep_events_for_days == 0 {
            None
        } else {
            Some(chrono::Duration::days(i64::from(self.keep_events_for_days)))
        }
    }

    /// Most recent successful check or receive.
    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_check_at.max(self.last_receive_at)
    }

    /// Most recent activity of any kind (check, receive or emitted event).
    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_check_at.max(self.last_receive_at).max(self.last_event_at)
    }

    /// Copy operator-editable fields from `other`, leaving run state untouched.
    pub fn apply_configuration(&mut self, other: &Agent) {
        self.name = other.name.clone();
        self.options = other.options.clone();
        self.schedule = other.schedule;
        self.disabled = other.disabled;
        self.keep_events_for_days = other.keep_events_for_days;
        self.updated_at = other.updated_at;
    }

    /// Apply the outcome of one dispatched run. Returns whether the cursor moved.
    pub fn apply_run(&mut self, record: &RunRecord) -> bool {
        match &record.result {
            RunResult::Succeeded {
                memory,
                emitted,
                last_event_at,
                cursor,
            } => {
                self.memory = memory.clone();
                self.consecutive_failures = 0;
                self.events_count += emitted;
                if last_event_at.is_some() {
                    self.last_event_at = self.last_event_at.max(*last_event_at);
                }
                match record.kind {
                    RunKind::Check => self.last_check_at = Some(record.finished_at),
                    RunKind::Receive => self.last_receive_at = Some(record.finished_at),
                }
                cursor.map_or(false, |advance| self.advance_cursor(advance))
            }
            RunResult::Failed => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_error_log_at = Some(record.finished_at);
                false
            }
        }
    }

    /// Compare-and-advance: moves the cursor only when it still holds the value
    /// the batch was selected against, and only forwards.
    pub fn advance_cursor(&mut self, advance: CursorAdvance) -> bool {
        if self.last_checked_event_id != advance.expected {
            return false;
        }
        if self.last_checked_event_id.map_or(false, |current| current >= advance.to) {
            return false;
        }
        self.last_checked_event_id = Some(advance.to);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Check,
    Receive,
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunKind::Check => write!(f, "check"),
            RunKind::Receive => write!(f, "receive"),
        }
    }
}

/// Cursor transition requested after a successful receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorAdvance {
    /// Cursor value the batch was selected against.
    pub expected: Option<EventId>,
    /// Highest event id contained in the delivered batch.
    pub to: EventId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunResult {
    Succeeded {
        memory: Document,
        emitted: u64,
        last_event_at: Option<DateTime<Utc>>,
        cursor: Option<CursorAdvance>,
    },
    Failed,
}

/// Run-state mutation produced by the dispatcher for a single invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub kind: RunKind,
    pub finished_at: DateTime<Utc>,
    pub result: RunResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succeeded(cursor: Option<CursorAdvance>) -> RunRecord {
        RunRecord {
            kind: RunKind::Receive,
            finished_at: Utc::now(),
            result: RunResult::Succeeded {
                memory: Document::new(),
                emitted: 0,
                last_event_at: None,
                cursor,
            },
        }
    }

    #[test]
    fn test_runnable_requires_enabled_and_active_owner() {
        let mut agent = Agent::new(UserId::new(), "a", "digest");
        assert!(agent.is_runnable());
        agent.disabled = true;
        assert!(!agent.is_runnable());
        agent.disabled = false;
        agent.deactivated = true;
        assert!(!agent.is_runnable());
    }

    #[test]
    fn test_cursor_advances_only_from_expected_value() {
        let mut agent = Agent::new(UserId::new(), "a", "digest");
        agent.last_checked_event_id = Some(EventId(9));

        let advanced = agent.apply_run(&succeeded(Some(CursorAdvance {
            expected: Some(EventId(9)),
            to: EventId(12),
        })));
        assert!(advanced);
        assert_eq!(agent.last_checked_event_id, Some(EventId(12)));

        // Stale expectation: an operator moved the cursor meanwhile.
        let advanced = agent.apply_run(&succeeded(Some(CursorAdvance {
            expected: Some(EventId(9)),
            to: EventId(15),
        })));
        assert!(!advanced);
        assert_eq!(agent.last_checked_event_id, Some(EventId(12)));
    }

    #[test]
    fn test_cursor_never_moves_backwards() {
        let mut agent = Agent::new(UserId::new(), "a", "digest");
        agent.last_checked_event_id = Some(EventId(20));
        assert!(!agent.advance_cursor(CursorAdvance {
            expected: Some(EventId(20)),
            to: EventId(5),
        }));
        assert_eq!(agent.last_checked_event_id, Some(EventId(20)));
    }

    #[test]
    fn test_failure_increments_counter_and_keeps_memory() {
        let mut agent = Agent::new(UserId::new(), "a", "digest");
        agent.memory.insert("kept".into(), serde_json::json!(true));
        let at = Utc::now();
        agent.apply_run(&RunRecord {
            kind: RunKind::Check,
            finished_at: at,
            result: RunResult::Failed,
        });
        agent.apply_run(&RunRecord {
            kind: RunKind::Check,
            finished_at: at,
            result: RunResult::Failed,
        });
        assert_eq!(agent.consecutive_failures, 2);
        assert_eq!(agent.last_error_log_at, Some(at));
        assert_eq!(agent.last_check_at, None);
        assert!(agent.memory.contains_key("kept"));

        agent.apply_run(&RunRecord {
            kind: RunKind::Check,
            finished_at: at,
            result: RunResult::Succeeded {
                memory: Document::new(),
                emitted: 2,
                last_event_at: Some(at),
                cursor: None,
            },
        });
        assert_eq!(agent.consecutive_failures, 0);
        assert_eq!(agent.events_count, 2);
        assert_eq!(agent.last_check_at, Some(at));
    }

    #[test]
    fn test_apply_configuration_leaves_run_state() {
        let mut stored = Agent::new(UserId::new(), "a", "digest");
        stored.last_checked_event_id = Some(EventId(3));
        stored.consecutive_failures = 4;

        let mut edited = stored.clone();
        edited.name = "renamed".into();
        edited.disabled = true;
        edited.last_checked_event_id = None;
        edited.consecutive_failures = 0;

        stored.apply_configuration(&edited);
        assert_eq!(stored.name, "renamed");
        assert!(stored.disabled);
        assert_eq!(stored.last_checked_event_id, Some(EventId(3)));
        assert_eq!(stored.consecutive_failures, 4);
    }
}
