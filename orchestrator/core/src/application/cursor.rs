// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cursor Tracker
//!
//! Answers "which events has this agent not received yet" and moves the
//! per-agent `last_checked_event_id`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Cursor reads and forced moves over the agent/link/event stores
//!
//! Ordinary advances after a delivery are applied by the dispatcher as part
//! of the run record (compare-and-advance inside `AgentRepository::record_run`).
//! This service covers the reads and the explicit operator moves.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::domain::agent::{Agent, AgentId, CursorAdvance};
use crate::domain::event::{Event, EventId};
use crate::domain::repository::{AgentRepository, EventRepository, LinkRepository, RepositoryError};

/// A batch selected for one receiver, with the cursor it was selected against.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBatch {
    pub receiver_id: AgentId,
    pub expected_cursor: Option<EventId>,
    pub events: Vec<Event>,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Highest id in the batch; the cursor moves here, never to the global max.
    pub fn max_id(&self) -> Option<EventId> {
        self.events.iter().map(|e| e.id).max()
    }

    pub fn cursor_advance(&self) -> Option<CursorAdvance> {
        self.max_id().map(|to| CursorAdvance {
            expected: self.expected_cursor,
            to,
        })
    }
}

#[derive(Clone)]
pub struct CursorTracker {
    agents: Arc<dyn AgentRepository>,
    links: Arc<dyn LinkRepository>,
    events: Arc<dyn EventRepository>,
}

impl CursorTracker {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        links: Arc<dyn LinkRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self { agents, links, events }
    }

    /// Unreceived, unexpired events from all of the agent's sources, in delivery order.
    pub async fn unreceived_events(&self, agent: &Agent, now: DateTime<Utc>) -> Result<PendingBatch, RepositoryError> {
        let sources = self.links.sources_of(agent.id).await?;
        let events = self
            .events
            .find_after(&sources, agent.last_checked_event_id, now)
            .await?;

        Ok(PendingBatch {
            receiver_id: agent.id,
            expected_cursor: agent.last_checked_event_id,
            events,
        })
    }

    /// Compare-and-advance outside a run. Returns whether the cursor moved.
    pub async fn advance(
        &self,
        agent_id: AgentId,
        expected: Option<EventId>,
        batch_max: EventId,
    ) -> Result<bool, RepositoryError> {
        self.agents
            .advance_cursor(
                agent_id,
                CursorAdvance {
                    expected,
                    to: batch_max,
                },
            )
            .await
    }

    /// Skip the backlog: move the cursor to the current global maximum event id.
    pub async fn drop_pending(&self, agent_id: AgentId) -> Result<Option<EventId>, RepositoryError> {
        let max = self.events.max_id().await?;
        self.agents.force_cursor(agent_id, max).await?;
        debug!(agent_id = %agent_id, cursor = ?max, "Dropped pending events");
        Ok(max)
    }

    /// Cursor for an agent that is about to be created.
    pub async fn initial_cursor(&self) -> Result<Option<EventId>, RepositoryError> {
        self.events.max_id().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::UserId;
    use crate::domain::document::Document;
    use crate::domain::event::NewEvent;
    use crate::domain::link::Link;
    use crate::infrastructure::repositories::{
        InMemoryAgentRepository, InMemoryEventRepository, InMemoryLinkRepository,
    };

    struct Fixture {
        agents: Arc<InMemoryAgentRepository>,
        links: Arc<InMemoryLinkRepository>,
        events: Arc<InMemoryEventRepository>,
        tracker: CursorTracker,
    }

    fn fixture() -> Fixture {
        let agents = Arc::new(InMemoryAgentRepository::new());
        let links = Arc::new(InMemoryLinkRepository::new());
        let events = Arc::new(InMemoryEventRepository::new());
        let tracker = CursorTracker::new(agents.clone(), links.clone(), events.clone());
        Fixture {
            agents,
            links,
            events,
            tracker,
        }
    }

    async fn emit(events: &InMemoryEventRepository, agent: &Agent) -> EventId {
        events
            .append(NewEvent {
                agent_id: agent.id,
                user_id: agent.user_id,
                payload: Document::new(),
                created_at: Utc::now(),
                expires_at: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_unreceived_events_merge_sources_above_cursor() {
        let f = fixture();
        let user = UserId::new();
        let a = Agent::new(user, "a", "heartbeat");
        let b = Agent::new(user, "b", "heartbeat");
        let unrelated = Agent::new(user, "c", "heartbeat");
        let mut receiver = Agent::new(user, "r", "digest");

        let first = emit(&f.events, &a).await;
        receiver.last_checked_event_id = Some(first);
        for agent in [&a, &b, &unrelated, &receiver] {
            f.agents.save(agent).await.unwrap();
        }
        f.links.create(&Link::new(a.id, receiver.id).unwrap()).await.unwrap();
        f.links.create(&Link::new(b.id, receiver.id).unwrap()).await.unwrap();

        let e2 = emit(&f.events, &b).await;
        emit(&f.events, &unrelated).await;
        let e4 = emit(&f.events, &a).await;

        let batch = f.tracker.unreceived_events(&receiver, Utc::now()).await.unwrap();
        let ids: Vec<EventId> = batch.events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![e2, e4]);
        assert_eq!(
            batch.cursor_advance(),
            Some(CursorAdvance {
                expected: Some(first),
                to: e4
            })
        );
    }

    #[tokio::test]
    async fn test_advance_is_compare_and_set() {
        let f = fixture();
        let mut agent = Agent::new(UserId::new(), "r", "digest");
        agent.last_checked_event_id = Some(EventId(9));
        f.agents.save(&agent).await.unwrap();

        assert!(!f.tracker.advance(agent.id, Some(EventId(5)), EventId(12)).await.unwrap());
        assert!(f.tracker.advance(agent.id, Some(EventId(9)), EventId(12)).await.unwrap());
        let stored = f.agents.find_by_id(agent.id).await.unwrap().unwrap();
        assert_eq!(stored.last_checked_event_id, Some(EventId(12)));
    }

    #[tokio::test]
    async fn test_drop_pending_jumps_to_global_max() {
        let f = fixture();
        let source = Agent::new(UserId::new(), "s", "heartbeat");
        let receiver = Agent::new(source.user_id, "r", "digest");
        f.agents.save(&receiver).await.unwrap();
        for _ in 0..3 {
            emit(&f.events, &source).await;
        }

        let cursor = f.tracker.drop_pending(receiver.id).await.unwrap();
        assert_eq!(cursor, Some(EventId(3)));
        let stored = f.agents.find_by_id(receiver.id).await.unwrap().unwrap();
        assert_eq!(stored.last_checked_event_id, Some(EventId(3)));
    }
}
