// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the engine's aggregates. Interfaces live in the
//! domain layer and are implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `AgentRepository` | `Agent` | `InMemoryAgentRepository`, `PostgresAgentRepository` |
//! | `LinkRepository` | `Link` | `InMemoryLinkRepository`, `PostgresLinkRepository` |
//! | `EventRepository` | `Event` | `InMemoryEventRepository`, `PostgresEventRepository` |
//! | `AgentLogRepository` | `AgentLog` | `InMemoryAgentLogRepository`, `PostgresAgentLogRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! Concrete implementations are selected at startup from the `storage`
//! section of `conduit-config.yaml`. In-memory implementations serve
//! development and tests; PostgreSQL serves production.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::agent::{Agent, AgentId, CursorAdvance, RunRecord, UserId};
use crate::domain::agent_log::{AgentLog, NewAgentLog};
use crate::domain::event::{Event, EventId, NewEvent};
use crate::domain::link::Link;

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Insert a new agent, or update the configuration fields of an existing
    /// one. Run state (memory, cursor, timestamps, counters) and the
    /// `deactivated` flag of an existing agent are never overwritten.
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError>;

    async fn find_by_ids(&self, ids: &[AgentId]) -> Result<Vec<Agent>, RepositoryError>;

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Agent>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError>;

    /// Runnable agents whose schedule is not `never`.
    async fn find_scheduled(&self) -> Result<Vec<Agent>, RepositoryError>;

    /// Atomically apply a run record. Returns whether the cursor advanced.
    async fn record_run(&self, id: AgentId, record: &RunRecord) -> Result<bool, RepositoryError>;

    /// Compare-and-advance the cursor without touching any other run state.
    async fn advance_cursor(&self, id: AgentId, advance: CursorAdvance) -> Result<bool, RepositoryError>;

    /// Force the cursor to `cursor`, unless the stored cursor is already further.
    async fn force_cursor(&self, id: AgentId, cursor: Option<EventId>) -> Result<(), RepositoryError>;

    async fn update_memory(&self, id: AgentId, memory: crate::domain::document::Document) -> Result<(), RepositoryError>;

    /// Flip `deactivated` on every agent owned by `user_id` in one transaction.
    async fn set_deactivated_for_user(&self, user_id: UserId, deactivated: bool) -> Result<u64, RepositoryError>;

    async fn delete(&self, id: AgentId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Create a link; returns `false` if it already existed.
    async fn create(&self, link: &Link) -> Result<bool, RepositoryError>;

    async fn delete(&self, source_id: AgentId, receiver_id: AgentId) -> Result<bool, RepositoryError>;

    async fn sources_of(&self, receiver_id: AgentId) -> Result<Vec<AgentId>, RepositoryError>;

    async fn receivers_of(&self, source_id: AgentId) -> Result<Vec<AgentId>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Link>, RepositoryError>;

    /// Delete every link the agent takes part in, in either direction.
    async fn delete_for_agent(&self, agent_id: AgentId) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Append an event, assigning the next id.
    async fn append(&self, event: NewEvent) -> Result<Event, RepositoryError>;

    async fn find_by_id(&self, id: EventId) -> Result<Option<Event>, RepositoryError>;

    async fn find_by_ids(&self, ids: &[EventId]) -> Result<Vec<Event>, RepositoryError>;

    /// Events from `sources` with id greater than `after` that are not expired
    /// at `now`, in delivery order.
    async fn find_after(
        &self,
        sources: &[AgentId],
        after: Option<EventId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, RepositoryError>;

    /// Most recent events of one agent, newest first.
    async fn latest_by_agent(&self, agent_id: AgentId, limit: usize) -> Result<Vec<Event>, RepositoryError>;

    /// Highest event id ever assigned that is still stored.
    async fn max_id(&self) -> Result<Option<EventId>, RepositoryError>;

    async fn delete_by_agent(&self, agent_id: AgentId) -> Result<u64, RepositoryError>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;

    /// Recompute `expires_at = created_at + retention` for every event of an
    /// agent (`None` clears expiry).
    async fn update_expiration(&self, agent_id: AgentId, retention: Option<Duration>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait AgentLogRepository: Send + Sync {
    async fn append(&self, log: NewAgentLog) -> Result<AgentLog, RepositoryError>;

    /// Logs of one agent, newest first.
    async fn find_by_agent(&self, agent_id: AgentId, limit: usize) -> Result<Vec<AgentLog>, RepositoryError>;

    /// Keep only the newest `keep` entries for an agent.
    async fn truncate(&self, agent_id: AgentId, keep: usize) -> Result<u64, RepositoryError>;

    async fn delete_for_agent(&self, agent_id: AgentId) -> Result<u64, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
