// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository abstractions defined in
//! `crate::domain::repository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresAgentRepository** - agents, configuration and run state
//! - **PostgresLinkRepository** - the link graph
//! - **PostgresEventRepository** - append-only event log
//! - **PostgresAgentLogRepository** - per-agent logs
//!
//! ## In-Memory Repositories
//!
//! Lock-protected maps for tests and single-process development. Every
//! mutation happens under one write lock, which gives the same atomicity the
//! PostgreSQL implementations get from single statements or transactions.

pub mod postgres_agent;
pub mod postgres_agent_log;
pub mod postgres_event;
pub mod postgres_link;

pub use postgres_agent::PostgresAgentRepository;
pub use postgres_agent_log::PostgresAgentLogRepository;
pub use postgres_event::PostgresEventRepository;
pub use postgres_link::PostgresLinkRepository;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::agent::{Agent, AgentId, CursorAdvance, RunRecord, UserId};
use crate::domain::agent_log::{AgentLog, NewAgentLog};
use crate::domain::document::Document;
use crate::domain::event::{into_delivery_batch, Event, EventId, NewEvent};
use crate::domain::link::Link;
use crate::domain::repository::{
    AgentLogRepository, AgentRepository, EventRepository, LinkRepository, RepositoryError,
};

fn not_found(id: AgentId) -> RepositoryError {
    RepositoryError::NotFound(format!("agent {}", id))
}

#[derive(Clone, Default)]
pub struct InMemoryAgentRepository {
    agents: Arc<RwLock<HashMap<AgentId, Agent>>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
        let mut agents = self.agents.write();
        match agents.get_mut(&agent.id) {
            Some(stored) => stored.apply_configuration(agent),
            None => {
                agents.insert(agent.id, agent.clone());
            }
        }
        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.agents.read().get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[AgentId]) -> Result<Vec<Agent>, RepositoryError> {
        let agents = self.agents.read();
        Ok(ids.iter().filter_map(|id| agents.get(id).cloned()).collect())
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Agent>, RepositoryError> {
        let agents = self.agents.read();
        let mut owned: Vec<Agent> = agents.values().filter(|a| a.user_id == user_id).cloned().collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
        let mut all: Vec<Agent> = self.agents.read().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn find_scheduled(&self) -> Result<Vec<Agent>, RepositoryError> {
        let agents = self.agents.read();
        Ok(agents
            .values()
            .filter(|a| a.is_runnable() && !a.schedule.is_never())
            .cloned()
            .collect())
    }

    async fn record_run(&self, id: AgentId, record: &RunRecord) -> Result<bool, RepositoryError> {
        let mut agents = self.agents.write();
        let agent = agents.get_mut(&id).ok_or_else(|| not_found(id))?;
        Ok(agent.apply_run(record))
    }

    async fn advance_cursor(&self, id: AgentId, advance: CursorAdvance) -> Result<bool, RepositoryError> {
        let mut agents = self.agents.write();
        let agent = agents.get_mut(&id).ok_or_else(|| not_found(id))?;
        Ok(agent.advance_cursor(advance))
    }

    async fn force_cursor(&self, id: AgentId, cursor: Option<EventId>) -> Result<(), RepositoryError> {
        let mut agents = self.agents.write();
        let agent = agents.get_mut(&id).ok_or_else(|| not_found(id))?;
        agent.last_checked_event_id = agent.last_checked_event_id.max(cursor);
        Ok(())
    }

    async fn update_memory(&self, id: AgentId, memory: Document) -> Result<(), RepositoryError> {
        let mut agents = self.agents.write();
        let agent = agents.get_mut(&id).ok_or_else(|| not_found(id))?;
        agent.memory = memory;
        Ok(())
    }

    async fn set_deactivated_for_user(&self, user_id: UserId, deactivated: bool) -> Result<u64, RepositoryError> {
        let mut agents = self.agents.write();
        let mut changed = 0;
        for agent in agents.values_mut().filter(|a| a.user_id == user_id) {
            agent.deactivated = deactivated;
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete(&self, id: AgentId) -> Result<(), RepositoryError> {
        self.agents.write().remove(&id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryLinkRepository {
    links: Arc<RwLock<BTreeMap<(AgentId, AgentId), Link>>>,
}

impl InMemoryLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkRepository for InMemoryLinkRepository {
    async fn create(&self, link: &Link) -> Result<bool, RepositoryError> {
        let mut links = self.links.write();
        let key = (link.source_id, link.receiver_id);
        if links.contains_key(&key) {
            return Ok(false);
        }
        links.insert(key, link.clone());
        Ok(true)
    }

    async fn delete(&self, source_id: AgentId, receiver_id: AgentId) -> Result<bool, RepositoryError> {
        Ok(self.links.write().remove(&(source_id, receiver_id)).is_some())
    }

    async fn sources_of(&self, receiver_id: AgentId) -> Result<Vec<AgentId>, RepositoryError> {
        let links = self.links.read();
        Ok(links
            .values()
            .filter(|l| l.receiver_id == receiver_id)
            .map(|l| l.source_id)
            .collect())
    }

    async fn receivers_of(&self, source_id: AgentId) -> Result<Vec<AgentId>, RepositoryError> {
        let links = self.links.read();
        Ok(links
            .range((source_id, AgentId(uuid::Uuid::nil()))..)
            .take_while(|((source, _), _)| *source == source_id)
            .map(|(_, l)| l.receiver_id)
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Link>, RepositoryError> {
        Ok(self.links.read().values().cloned().collect())
    }

    async fn delete_for_agent(&self, agent_id: AgentId) -> Result<u64, RepositoryError> {
        let mut links = self.links.write();
        let before = links.len();
        links.retain(|_, l| !l.touches(agent_id));
        Ok((before - links.len()) as u64)
    }
}

#[derive(Default)]
struct EventLog {
    events: BTreeMap<EventId, Event>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct InMemoryEventRepository {
    inner: Arc<RwLock<EventLog>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start id assignment after `last_id` (useful to mirror an existing log).
    pub fn starting_after(last_id: u64) -> Self {
        let repo = Self::default();
        repo.inner.write().next_id = last_id;
        repo
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn append(&self, event: NewEvent) -> Result<Event, RepositoryError> {
        let mut log = self.inner.write();
        log.next_id += 1;
        let event = event.into_event(EventId(log.next_id));
        log.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn find_by_id(&self, id: EventId) -> Result<Option<Event>, RepositoryError> {
        Ok(self.inner.read().events.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[EventId]) -> Result<Vec<Event>, RepositoryError> {
        let log = self.inner.read();
        let found = ids.iter().filter_map(|id| log.events.get(id).cloned()).collect();
        Ok(into_delivery_batch(found))
    }

    async fn find_after(
        &self,
        sources: &[AgentId],
        after: Option<EventId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, RepositoryError> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let log = self.inner.read();
        let start = after.map_or(EventId(0), |id| EventId(id.0 + 1));
        let pending = log
            .events
            .range(start..)
            .map(|(_, e)| e)
            .filter(|e| sources.contains(&e.agent_id) && !e.is_expired(now))
            .cloned()
            .collect();
        Ok(into_delivery_batch(pending))
    }

    async fn latest_by_agent(&self, agent_id: AgentId, limit: usize) -> Result<Vec<Event>, RepositoryError> {
        let log = self.inner.read();
        let mut events: Vec<Event> = log.events.values().filter(|e| e.agent_id == agent_id).cloned().collect();
        events.sort_by(|a, b| Event::delivery_order(b, a));
        events.truncate(limit);
        Ok(events)
    }

    async fn max_id(&self) -> Result<Option<EventId>, RepositoryError> {
        Ok(self.inner.read().events.keys().next_back().copied())
    }

    async fn delete_by_agent(&self, agent_id: AgentId) -> Result<u64, RepositoryError> {
        let mut log = self.inner.write();
        let before = log.events.len();
        log.events.retain(|_, e| e.agent_id != agent_id);
        Ok((before - log.events.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut log = self.inner.write();
        let before = log.events.len();
        log.events.retain(|_, e| !e.is_expired(now));
        Ok((before - log.events.len()) as u64)
    }

    async fn update_expiration(&self, agent_id: AgentId, retention: Option<Duration>) -> Result<u64, RepositoryError> {
        let mut log = self.inner.write();
        let mut updated = 0;
        for event in log.events.values_mut().filter(|e| e.agent_id == agent_id) {
            event.expires_at = retention.map(|r| event.created_at + r);
            updated += 1;
        }
        Ok(updated)
    }
}

#[derive(Default)]
struct LogBook {
    logs: Vec<AgentLog>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct InMemoryAgentLogRepository {
    inner: Arc<RwLock<LogBook>>,
}

impl InMemoryAgentLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentLogRepository for InMemoryAgentLogRepository {
    async fn append(&self, log: NewAgentLog) -> Result<AgentLog, RepositoryError> {
        let mut book = self.inner.write();
        book.next_id += 1;
        let log = log.into_log(book.next_id);
        book.logs.push(log.clone());
        Ok(log)
    }

    async fn find_by_agent(&self, agent_id: AgentId, limit: usize) -> Result<Vec<AgentLog>, RepositoryError> {
        let book = self.inner.read();
        Ok(book
            .logs
            .iter()
            .rev()
            .filter(|l| l.agent_id == agent_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn truncate(&self, agent_id: AgentId, keep: usize) -> Result<u64, RepositoryError> {
        let mut book = self.inner.write();
        let total = book.logs.iter().filter(|l| l.agent_id == agent_id).count();
        if total <= keep {
            return Ok(0);
        }
        let mut to_drop = total - keep;
        let dropped = to_drop as u64;
        // logs are in insertion order, so the oldest come first
        book.logs.retain(|l| {
            if to_drop > 0 && l.agent_id == agent_id {
                to_drop -= 1;
                false
            } else {
                true
            }
        });
        Ok(dropped)
    }

    async fn delete_for_agent(&self, agent_id: AgentId) -> Result<u64, RepositoryError> {
        let mut book = self.inner.write();
        let before = book.logs.len();
        book.logs.retain(|l| l.agent_id != agent_id);
        Ok((before - book.logs.len()) as u64)
    }
}
