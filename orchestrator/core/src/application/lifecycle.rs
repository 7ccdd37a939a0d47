// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Standard agent lifecycle service
//!
//! Owns every operator-side edit of the graph. Integrity rules are enforced
//! here rather than in the repositories: both ends of a link exist and share
//! an owner, no self-loops, and the capability flags of the agent types allow
//! the edge.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::application::agent::{AgentLifecycleService, CreateAgentRequest, LifecycleError, UpdateAgentRequest};
use crate::application::cursor::CursorTracker;
use crate::application::repository_factory::Repositories;
use crate::domain::agent::{Agent, AgentId, UserId};
use crate::domain::agent_log::AgentLog;
use crate::domain::document::Document;
use crate::domain::event::{Event, EventId};
use crate::domain::events::AgentLifecycleEvent;
use crate::domain::link::{GraphError, Link};
use crate::domain::registry::{AgentBehavior, AgentRegistry};
use crate::domain::repository::{AgentLogRepository, AgentRepository, EventRepository, LinkRepository};
use crate::domain::schedule::Schedule;
use crate::infrastructure::event_bus::EventBus;

pub struct StandardAgentLifecycleService {
    agents: Arc<dyn AgentRepository>,
    links: Arc<dyn LinkRepository>,
    events: Arc<dyn EventRepository>,
    logs: Arc<dyn AgentLogRepository>,
    cursor: CursorTracker,
    registry: Arc<AgentRegistry>,
    event_bus: EventBus,
}

impl StandardAgentLifecycleService {
    pub fn new(repos: &Repositories, registry: Arc<AgentRegistry>, event_bus: EventBus) -> Self {
        Self {
            agents: repos.agents.clone(),
            links: repos.links.clone(),
            events: repos.events.clone(),
            logs: repos.logs.clone(),
            cursor: CursorTracker::new(repos.agents.clone(), repos.links.clone(), repos.events.clone()),
            registry,
            event_bus,
        }
    }

    fn behavior(&self, agent_type: &str) -> Result<Arc<dyn AgentBehavior>, LifecycleError> {
        self.registry
            .get(agent_type)
            .ok_or_else(|| LifecycleError::UnknownType(agent_type.to_string()))
    }

    async fn load(&self, id: AgentId) -> Result<Agent, LifecycleError> {
        self.agents.find_by_id(id).await?.ok_or(LifecycleError::AgentNotFound(id))
    }

    async fn load_for_link(&self, id: AgentId) -> Result<Agent, LifecycleError> {
        self.agents
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::Graph(GraphError::UnknownAgent(id)))
    }

    fn check_configuration(
        behavior: &dyn AgentBehavior,
        options: &Document,
        schedule: Schedule,
    ) -> Result<(), LifecycleError> {
        let descriptor = behavior.descriptor();
        behavior
            .validate_options(options)
            .map_err(|source| LifecycleError::InvalidOptions {
                agent_type: descriptor.key.clone(),
                source,
            })?;
        if !descriptor.can_be_scheduled && !schedule.is_never() {
            return Err(LifecycleError::NotSchedulable {
                agent_type: descriptor.key.clone(),
                schedule,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AgentLifecycleService for StandardAgentLifecycleService {
    async fn create_agent(&self, request: CreateAgentRequest) -> Result<Agent, LifecycleError> {
        let behavior = self.behavior(&request.agent_type)?;
        let schedule = request.schedule.unwrap_or(behavior.descriptor().default_schedule);
        Self::check_configuration(behavior.as_ref(), &request.options, schedule)?;

        let mut agent = Agent::new(request.user_id, request.name, request.agent_type)
            .with_options(request.options)
            .with_schedule(schedule);
        agent.disabled = request.disabled;
        agent.keep_events_for_days = request.keep_events_for_days;
        // No backlog: a new agent only sees events emitted after it exists.
        agent.last_checked_event_id = self.cursor.initial_cursor().await?;
        self.agents.save(&agent).await?;

        info!(agent_id = %agent.id, agent_type = %agent.agent_type(), "Agent created");
        self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentCreated {
            agent_id: agent.id,
            agent_type: agent.agent_type().to_string(),
            created_at: agent.created_at,
        });

        for source_id in request.source_ids {
            self.connect(source_id, agent.id).await?;
        }
        for receiver_id in request.receiver_ids {
            self.connect(agent.id, receiver_id).await?;
        }
        Ok(agent)
    }

    async fn get_agent(&self, id: AgentId) -> Result<Agent, LifecycleError> {
        self.load(id).await
    }

    async fn list_agents(&self, user_id: Option<UserId>) -> Result<Vec<Agent>, LifecycleError> {
        let agents = match user_id {
            Some(user_id) => self.agents.find_by_user(user_id).await?,
            None => self.agents.list_all().await?,
        };
        Ok(agents)
    }

    async fn update_agent(&self, id: AgentId, request: UpdateAgentRequest) -> Result<Agent, LifecycleError> {
        let mut agent = self.load(id).await?;
        let previous_retention = agent.event_retention();

        if let Some(name) = request.name {
            agent.name = name;
        }
        if let Some(options) = request.options {
            agent.options = options;
        }
        if let Some(schedule) = request.schedule {
            agent.schedule = schedule;
        }
        if let Some(disabled) = request.disabled {
            agent.disabled = disabled;
        }
        if let Some(days) = request.keep_events_for_days {
            agent.keep_events_for_days = days;
        }

        let behavior = self.behavior(agent.agent_type())?;
        Self::check_configuration(behavior.as_ref(), &agent.options, agent.schedule)?;

        // The cursor must be past the backlog before a re-enabled agent becomes visible.
        if request.drop_pending_events {
            self.drop_pending_events(id).await?;
        }

        agent.updated_at = Utc::now();
        self.agents.save(&agent).await?;

        let retention = agent.event_retention();
        if retention != previous_retention {
            let rewritten = self.events.update_expiration(id, retention).await?;
            info!(agent_id = %id, rewritten, "Event retention changed");
        }

        self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentUpdated {
            agent_id: id,
            updated_at: agent.updated_at,
        });
        self.load(id).await
    }

    async fn delete_agent(&self, id: AgentId, delete_events: bool) -> Result<(), LifecycleError> {
        self.load(id).await?;

        let links = self.links.delete_for_agent(id).await?;
        let logs = self.logs.delete_for_agent(id).await?;
        let events_removed = if delete_events {
            self.events.delete_by_agent(id).await?
        } else {
            0
        };
        self.agents.delete(id).await?;

        info!(agent_id = %id, links, logs, events_removed, "Agent deleted");
        self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentRemoved {
            agent_id: id,
            events_removed,
            removed_at: Utc::now(),
        });
        Ok(())
    }

    async fn connect(&self, source_id: AgentId, receiver_id: AgentId) -> Result<bool, LifecycleError> {
        let link = Link::new(source_id, receiver_id)?;
        let source = self.load_for_link(source_id).await?;
        let receiver = self.load_for_link(receiver_id).await?;

        if source.user_id != receiver.user_id {
            return Err(GraphError::ForeignAgent {
                agent_id: receiver_id,
                user_id: source.user_id,
            }
            .into());
        }
        if !self.behavior(source.agent_type())?.descriptor().can_create_events {
            return Err(GraphError::CannotCreate(source_id).into());
        }
        if !self.behavior(receiver.agent_type())?.descriptor().can_receive_events {
            return Err(GraphError::CannotReceive(receiver_id).into());
        }

        let created = self.links.create(&link).await?;
        if created {
            info!(source_id = %source_id, receiver_id = %receiver_id, "Agents linked");
            self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentsLinked {
                source_id,
                receiver_id,
                linked_at: link.created_at,
            });
        }
        Ok(created)
    }

    async fn disconnect(&self, source_id: AgentId, receiver_id: AgentId) -> Result<bool, LifecycleError> {
        let removed = self.links.delete(source_id, receiver_id).await?;
        if removed {
            self.event_bus.publish_agent_event(AgentLifecycleEvent::AgentsUnlinked {
                source_id,
                receiver_id,
                unlinked_at: Utc::now(),
            });
        }
        Ok(removed)
    }

    async fn list_links(&self) -> Result<Vec<Link>, LifecycleError> {
        Ok(self.links.list_all().await?)
    }

    async fn remove_events(&self, id: AgentId) -> Result<u64, LifecycleError> {
        self.load(id).await?;
        let count = self.events.delete_by_agent(id).await?;
        info!(agent_id = %id, count, "Agent events removed");
        self.event_bus.publish_agent_event(AgentLifecycleEvent::EventsRemoved {
            agent_id: id,
            count,
            removed_at: Utc::now(),
        });
        Ok(count)
    }

    async fn clear_memory(&self, id: AgentId) -> Result<(), LifecycleError> {
        self.load(id).await?;
        self.agents.update_memory(id, Document::new()).await?;
        Ok(())
    }

    async fn drop_pending_events(&self, id: AgentId) -> Result<Option<EventId>, LifecycleError> {
        self.load(id).await?;
        let cursor = self.cursor.drop_pending(id).await?;
        self.event_bus.publish_agent_event(AgentLifecycleEvent::PendingEventsDropped {
            agent_id: id,
            cursor,
            dropped_at: Utc::now(),
        });
        Ok(cursor)
    }

    async fn deactivate_user(&self, user_id: UserId) -> Result<u64, LifecycleError> {
        let agents = self.agents.set_deactivated_for_user(user_id, true).await?;
        info!(user_id = %user_id, agents, "User deactivated");
        self.event_bus.publish_agent_event(AgentLifecycleEvent::UserDeactivated {
            user_id,
            agents,
            deactivated_at: Utc::now(),
        });
        Ok(agents)
    }

    async fn activate_user(&self, user_id: UserId) -> Result<u64, LifecycleError> {
        let agents = self.agents.set_deactivated_for_user(user_id, false).await?;
        info!(user_id = %user_id, agents, "User activated");
        self.event_bus.publish_agent_event(AgentLifecycleEvent::UserActivated {
            user_id,
            agents,
            activated_at: Utc::now(),
        });
        Ok(agents)
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, LifecycleError> {
        let count = self.events.delete_expired(now).await?;
        if count > 0 {
            info!(count, "Expired events removed");
        }
        metrics::counter!("conduit_events_expired_total").increment(count);
        self.event_bus.publish_agent_event(AgentLifecycleEvent::ExpiredEventsCleaned {
            count,
            cleaned_at: now,
        });
        Ok(count)
    }

    async fn recent_events(&self, id: AgentId, limit: usize) -> Result<Vec<Event>, LifecycleError> {
        self.load(id).await?;
        Ok(self.events.latest_by_agent(id, limit).await?)
    }

    async fn logs(&self, id: AgentId, limit: usize) -> Result<Vec<AgentLog>, LifecycleError> {
        self.load(id).await?;
        Ok(self.logs.find_by_agent(id, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::document;
    use crate::domain::event::NewEvent;
    use crate::domain::agent::{CursorAdvance, RunRecord};
    use crate::domain::repository::RepositoryError;
    use crate::infrastructure::agents::builtin_registry;
    use parking_lot::Mutex;
    use serde_json::json;

    fn service(repos: &Repositories) -> StandardAgentLifecycleService {
        StandardAgentLifecycleService::new(repos, Arc::new(builtin_registry()), EventBus::new(64))
    }

    async fn emit(repos: &Repositories, agent: &Agent, created_at: DateTime<Utc>) -> Event {
        repos
            .events
            .append(NewEvent {
                agent_id: agent.id,
                user_id: agent.user_id,
                payload: Document::new(),
                created_at,
                expires_at: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_uses_default_schedule_and_seeds_cursor() {
        let repos = Repositories::in_memory();
        let service = service(&repos);
        let user = UserId::new();
        let heartbeat = service
            .create_agent(CreateAgentRequest::new(user, "beat", "heartbeat"))
            .await
            .unwrap();
        assert_eq!(heartbeat.schedule, Schedule::Every { minutes: 60 });
        assert_eq!(heartbeat.last_checked_event_id, None);

        let old = emit(&repos, &heartbeat, Utc::now()).await;
        let digest = service
            .create_agent(CreateAgentRequest::new(user, "digest", "digest"))
            .await
            .unwrap();
        assert_eq!(digest.last_checked_event_id, Some(old.id));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_type_and_bad_options() {
        let repos = Repositories::in_memory();
        let service = service(&repos);
        let user = UserId::new();

        let err = service
            .create_agent(CreateAgentRequest::new(user, "x", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownType(_)));

        let mut request = CreateAgentRequest::new(user, "r", "relay");
        request.options = document(json!({"merge": "not an object"}));
        let err = service.create_agent(request).await.unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidOptions { .. }));

        let mut request = CreateAgentRequest::new(user, "r", "relay");
        request.schedule = Some(Schedule::Every { minutes: 5 });
        let err = service.create_agent(request).await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotSchedulable { .. }));
    }

    #[tokio::test]
    async fn test_connect_enforces_graph_rules() {
        let repos = Repositories::in_memory();
        let service = service(&repos);
        let user = UserId::new();
        let beat = service.create_agent(CreateAgentRequest::new(user, "b", "heartbeat")).await.unwrap();
        let digest = service.create_agent(CreateAgentRequest::new(user, "d", "digest")).await.unwrap();
        let foreign = service
            .create_agent(CreateAgentRequest::new(UserId::new(), "f", "digest"))
            .await
            .unwrap();

        assert!(service.connect(beat.id, digest.id).await.unwrap());
        assert!(!service.connect(beat.id, digest.id).await.unwrap());

        let err = service.connect(digest.id, digest.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Graph(GraphError::SelfLoop(_))));

        let err = service.connect(digest.id, beat.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Graph(GraphError::CannotReceive(_))));

        let err = service.connect(beat.id, foreign.id).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Graph(GraphError::ForeignAgent { .. })));

        let err = service.connect(beat.id, AgentId::new()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Graph(GraphError::UnknownAgent(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades_links_and_optionally_events() {
        let repos = Repositories::in_memory();
        let service = service(&repos);
        let user = UserId::new();
        let beat = service.create_agent(CreateAgentRequest::new(user, "b", "heartbeat")).await.unwrap();
        let mut request = CreateAgentRequest::new(user, "d", "digest");
        request.source_ids = vec![beat.id];
        let digest = service.create_agent(request).await.unwrap();
        emit(&repos, &beat, Utc::now()).await;

        service.delete_agent(beat.id, false).await.unwrap();
        assert!(repos.links.sources_of(digest.id).await.unwrap().is_empty());
        assert_eq!(repos.events.latest_by_agent(beat.id, 10).await.unwrap().len(), 1);

        emit(&repos, &digest, Utc::now()).await;
        service.delete_agent(digest.id, true).await.unwrap();
        assert!(repos.events.latest_by_agent(digest.id, 10).await.unwrap().is_empty());
        assert!(matches!(
            service.get_agent(digest.id).await,
            Err(LifecycleError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_retention_change_rewrites_expiry() {
        let repos = Repositories::in_memory();
        let service = service(&repos);
        let beat = service
            .create_agent(CreateAgentRequest::new(UserId::new(), "b", "heartbeat"))
            .await
            .unwrap();
        let created_at = Utc::now();
        let event = emit(&repos, &beat, created_at).await;

        service
            .update_agent(
                beat.id,
                UpdateAgentRequest {
                    keep_events_for_days: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let stored = repos.events.find_by_id(event.id).await.unwrap().unwrap();
        assert_eq!(stored.expires_at, Some(created_at + chrono::Duration::days(2)));

        let removed = service
            .cleanup_expired(created_at + chrono::Duration::days(3))
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_update_drops_pending_events() {
        let repos = Repositories::in_memory();
        let service = service(&repos);
        let user = UserId::new();
        let beat = service.create_agent(CreateAgentRequest::new(user, "b", "heartbeat")).await.unwrap();
        let mut request = CreateAgentRequest::new(user, "d", "digest");
        request.source_ids = vec![beat.id];
        let digest = service.create_agent(request).await.unwrap();
        let latest = emit(&repos, &beat, Utc::now()).await;

        let updated = service
            .update_agent(
                digest.id,
                UpdateAgentRequest {
                    drop_pending_events: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.last_checked_event_id, Some(latest.id));
    }

    #[tokio::test]
    async fn test_user_deactivation_is_bulk() {
        let repos = Repositories::in_memory();
        let service = service(&repos);
        let user = UserId::new();
        let a = service.create_agent(CreateAgentRequest::new(user, "a", "digest")).await.unwrap();
        service.create_agent(CreateAgentRequest::new(user, "b", "digest")).await.unwrap();
        service.create_agent(CreateAgentRequest::new(UserId::new(), "c", "digest")).await.unwrap();

        assert_eq!(service.deactivate_user(user).await.unwrap(), 2);
        assert!(!service.get_agent(a.id).await.unwrap().is_runnable());
        assert_eq!(service.activate_user(user).await.unwrap(), 2);
        assert!(service.get_agent(a.id).await.unwrap().is_runnable());
    }

    #[tokio::test]
    async fn test_clear_memory() {
        let repos = Repositories::in_memory();
        let service = service(&repos);
        let digest = service
            .create_agent(CreateAgentRequest::new(UserId::new(), "d", "digest"))
            .await
            .unwrap();
        repos
            .agents
            .update_memory(digest.id, document(json!({"queue": [1, 2]})))
            .await
            .unwrap();

        service.clear_memory(digest.id).await.unwrap();
        assert!(service.get_agent(digest.id).await.unwrap().memory.is_empty());
    }

    /// Records the stored cursor whenever a save flips `disabled` off.
    struct ReenableWatch {
        inner: Arc<dyn AgentRepository>,
        cursor_at_reenable: Mutex<Vec<Option<EventId>>>,
    }

    #[async_trait]
    impl AgentRepository for ReenableWatch {
        async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
            if let Some(stored) = self.inner.find_by_id(agent.id).await? {
                if stored.disabled && !agent.disabled {
                    self.cursor_at_reenable.lock().push(stored.last_checked_event_id);
                }
            }
            self.inner.save(agent).await
        }

        async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_ids(&self, ids: &[AgentId]) -> Result<Vec<Agent>, RepositoryError> {
            self.inner.find_by_ids(ids).await
        }

        async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Agent>, RepositoryError> {
            self.inner.find_by_user(user_id).await
        }

        async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
            self.inner.list_all().await
        }

        async fn find_scheduled(&self) -> Result<Vec<Agent>, RepositoryError> {
            self.inner.find_scheduled().await
        }

        async fn record_run(&self, id: AgentId, record: &RunRecord) -> Result<bool, RepositoryError> {
            self.inner.record_run(id, record).await
        }

        async fn advance_cursor(&self, id: AgentId, advance: CursorAdvance) -> Result<bool, RepositoryError> {
            self.inner.advance_cursor(id, advance).await
        }

        async fn force_cursor(&self, id: AgentId, cursor: Option<EventId>) -> Result<(), RepositoryError> {
            self.inner.force_cursor(id, cursor).await
        }

        async fn update_memory(&self, id: AgentId, memory: Document) -> Result<(), RepositoryError> {
            self.inner.update_memory(id, memory).await
        }

        async fn set_deactivated_for_user(&self, user_id: UserId, deactivated: bool) -> Result<u64, RepositoryError> {
            self.inner.set_deactivated_for_user(user_id, deactivated).await
        }

        async fn delete(&self, id: AgentId) -> Result<(), RepositoryError> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_reenable_moves_cursor_before_agent_is_visible() {
        let base = Repositories::in_memory();
        let watch = Arc::new(ReenableWatch {
            inner: base.agents.clone(),
            cursor_at_reenable: Mutex::new(Vec::new()),
        });
        let repos = Repositories {
            agents: watch.clone(),
            links: base.links.clone(),
            events: base.events.clone(),
            logs: base.logs.clone(),
        };
        let service = service(&repos);
        let user = UserId::new();
        let beat = service.create_agent(CreateAgentRequest::new(user, "b", "heartbeat")).await.unwrap();
        let mut request = CreateAgentRequest::new(user, "d", "digest");
        request.source_ids = vec![beat.id];
        request.disabled = true;
        let digest = service.create_agent(request).await.unwrap();
        emit(&repos, &beat, Utc::now()).await;
        let latest = emit(&repos, &beat, Utc::now()).await;

        service
            .update_agent(
                digest.id,
                UpdateAgentRequest {
                    disabled: Some(false),
                    drop_pending_events: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(*watch.cursor_at_reenable.lock(), vec![Some(latest.id)]);
    }
}
