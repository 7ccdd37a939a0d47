// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent lifecycle contract: graph edits and operator-side maintenance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::{Agent, AgentId, UserId};
use crate::domain::agent_log::AgentLog;
use crate::domain::document::Document;
use crate::domain::event::{Event, EventId};
use crate::domain::link::{GraphError, Link};
use crate::domain::registry::AgentError;
use crate::domain::repository::RepositoryError;
use crate::domain::schedule::Schedule;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAgentRequest {
    pub user_id: UserId,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(default)]
    pub options: Document,
    /// Falls back to the type's default schedule.
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub keep_events_for_days: u32,
    #[serde(default)]
    pub source_ids: Vec<AgentId>,
    #[serde(default)]
    pub receiver_ids: Vec<AgentId>,
}

impl CreateAgentRequest {
    pub fn new(user_id: UserId, name: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
            agent_type: agent_type.into(),
            options: Document::new(),
            schedule: None,
            disabled: false,
            keep_events_for_days: 0,
            source_ids: Vec::new(),
            receiver_ids: Vec::new(),
        }
    }
}

/// Partial update; `None` leaves the field unchanged. The agent type cannot change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAgentRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: Option<Document>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default)]
    pub disabled: Option<bool>,
    #[serde(default)]
    pub keep_events_for_days: Option<u32>,
    /// Skip everything emitted so far instead of delivering the backlog.
    #[serde(default)]
    pub drop_pending_events: bool,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Agent {0} not found")]
    AgentNotFound(AgentId),

    #[error("Unknown agent type '{0}'")]
    UnknownType(String),

    #[error("Invalid options for '{agent_type}': {source}")]
    InvalidOptions {
        agent_type: String,
        #[source]
        source: AgentError,
    },

    #[error("Agent type '{agent_type}' cannot be scheduled ({schedule})")]
    NotSchedulable { agent_type: String, schedule: Schedule },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[async_trait]
pub trait AgentLifecycleService: Send + Sync {
    async fn create_agent(&self, request: CreateAgentRequest) -> Result<Agent, LifecycleError>;
    async fn get_agent(&self, id: AgentId) -> Result<Agent, LifecycleError>;
    async fn list_agents(&self, user_id: Option<UserId>) -> Result<Vec<Agent>, LifecycleError>;
    async fn update_agent(&self, id: AgentId, request: UpdateAgentRequest) -> Result<Agent, LifecycleError>;
    /// Removes the agent with its links and logs; its events only when `delete_events`.
    async fn delete_agent(&self, id: AgentId, delete_events: bool) -> Result<(), LifecycleError>;

    /// Returns false when the link already existed.
    async fn connect(&self, source_id: AgentId, receiver_id: AgentId) -> Result<bool, LifecycleError>;
    async fn disconnect(&self, source_id: AgentId, receiver_id: AgentId) -> Result<bool, LifecycleError>;
    async fn list_links(&self) -> Result<Vec<Link>, LifecycleError>;

    async fn remove_events(&self, id: AgentId) -> Result<u64, LifecycleError>;
    async fn clear_memory(&self, id: AgentId) -> Result<(), LifecycleError>;
    async fn drop_pending_events(&self, id: AgentId) -> Result<Option<EventId>, LifecycleError>;

    async fn deactivate_user(&self, user_id: UserId) -> Result<u64, LifecycleError>;
    async fn activate_user(&self, user_id: UserId) -> Result<u64, LifecycleError>;

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, LifecycleError>;

    /// Newest first.
    async fn recent_events(&self, id: AgentId, limit: usize) -> Result<Vec<Event>, LifecycleError>;
    /// Newest first.
    async fn logs(&self, id: AgentId, limit: usize) -> Result<Vec<AgentLog>, LifecycleError>;
}
