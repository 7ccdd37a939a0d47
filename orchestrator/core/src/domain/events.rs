// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Engine Domain Events
//!
//! Notifications published on the in-process event bus. These are
//! observability signals about the engine itself and are distinct from the
//! agent-produced [`crate::domain::event::Event`]s that flow along links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentId, RunKind, UserId};
use crate::domain::event::EventId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentLifecycleEvent {
    AgentCreated {
        agent_id: AgentId,
        agent_type: String,
        created_at: DateTime<Utc>,
    },
    AgentUpdated {
        agent_id: AgentId,
        updated_at: DateTime<Utc>,
    },
    AgentRemoved {
        agent_id: AgentId,
        events_removed: u64,
        removed_at: DateTime<Utc>,
    },
    AgentsLinked {
        source_id: AgentId,
        receiver_id: AgentId,
        linked_at: DateTime<Utc>,
    },
    AgentsUnlinked {
        source_id: AgentId,
        receiver_id: AgentId,
        unlinked_at: DateTime<Utc>,
    },
    PendingEventsDropped {
        agent_id: AgentId,
        cursor: Option<EventId>,
        dropped_at: DateTime<Utc>,
    },
    UserDeactivated {
        user_id: UserId,
        agents: u64,
        deactivated_at: DateTime<Utc>,
    },
    UserActivated {
        user_id: UserId,
        agents: u64,
        activated_at: DateTime<Utc>,
    },
    EventsRemoved {
        agent_id: AgentId,
        count: u64,
        removed_at: DateTime<Utc>,
    },
    ExpiredEventsCleaned {
        count: u64,
        cleaned_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
    RunStarted {
        agent_id: AgentId,
        kind: RunKind,
        started_at: DateTime<Utc>,
    },
    AgentChecked {
        agent_id: AgentId,
        emitted: usize,
        checked_at: DateTime<Utc>,
    },
    EventsReceived {
        agent_id: AgentId,
        count: usize,
        cursor: Option<EventId>,
        received_at: DateTime<Utc>,
    },
    EventsEmitted {
        agent_id: AgentId,
        event_ids: Vec<EventId>,
        emitted_at: DateTime<Utc>,
    },
    RunFailed {
        agent_id: AgentId,
        kind: RunKind,
        error: String,
        failed_at: DateTime<Utc>,
    },
    RunSkipped {
        agent_id: AgentId,
        kind: RunKind,
        reason: String,
        skipped_at: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn agent_id(&self) -> AgentId {
        match self {
            ExecutionEvent::RunStarted { agent_id, .. }
            | ExecutionEvent::AgentChecked { agent_id, .. }
            | ExecutionEvent::EventsReceived { agent_id, .. }
            | ExecutionEvent::EventsEmitted { agent_id, .. }
            | ExecutionEvent::RunFailed { agent_id, .. }
            | ExecutionEvent::RunSkipped { agent_id, .. } => *agent_id,
        }
    }
}
