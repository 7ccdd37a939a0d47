// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Engine - wires the application services for one node
//!
//! Built once from an [`EngineConfigManifest`] and an [`AgentRegistry`]; the
//! HTTP API, the daemon and the one-shot CLI commands all go through it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::agent::{AgentLifecycleService, LifecycleError};
use crate::application::dispatcher::{DispatchError, ExecutionDispatcher, RunSummary};
use crate::application::health::{HealthMonitor, HealthReport};
use crate::application::housekeeping::EventHousekeeper;
use crate::application::lifecycle::StandardAgentLifecycleService;
use crate::application::propagator::{PropagationReport, Propagator};
use crate::application::repository_factory::{create_repositories, Repositories};
use crate::application::scheduler::{ScheduleReport, Scheduler};
use crate::application::worker_pool::WorkerPool;
use crate::domain::agent::{AgentId, RunKind};
use crate::domain::engine_config::EngineConfigManifest;
use crate::domain::event::EventId;
use crate::domain::registry::AgentRegistry;
use crate::domain::repository::RepositoryError;
use crate::infrastructure::event_bus::EventBus;

pub struct Engine {
    pub repositories: Repositories,
    pub registry: Arc<AgentRegistry>,
    pub event_bus: EventBus,
    pub dispatcher: Arc<ExecutionDispatcher>,
    pub scheduler: Arc<Scheduler>,
    pub propagator: Arc<Propagator>,
    pub housekeeper: Arc<EventHousekeeper>,
    pub lifecycle: Arc<dyn AgentLifecycleService>,
    pub health: HealthMonitor,
    pub started_at: DateTime<Utc>,
}

impl Engine {
    pub fn new(config: &EngineConfigManifest, repositories: Repositories, registry: AgentRegistry) -> Result<Self> {
        let spec = &config.spec;
        let offset = config.utc_offset()?;
        let registry = Arc::new(registry);
        let event_bus = EventBus::with_default_capacity();
        let pool = WorkerPool::new(spec.dispatcher.max_concurrency);

        let dispatcher = Arc::new(ExecutionDispatcher::new(
            &repositories,
            registry.clone(),
            event_bus.clone(),
            spec.logs.max_per_agent,
        ));
        let scheduler = Arc::new(Scheduler::new(
            repositories.agents.clone(),
            dispatcher.clone(),
            pool.clone(),
            spec.scheduler.clone(),
            offset,
        ));
        let propagator = Arc::new(Propagator::new(
            repositories.agents.clone(),
            repositories.links.clone(),
            dispatcher.clone(),
            pool,
            spec.propagation.clone(),
        ));
        let lifecycle: Arc<dyn AgentLifecycleService> = Arc::new(StandardAgentLifecycleService::new(
            &repositories,
            registry.clone(),
            event_bus.clone(),
        ));
        let housekeeper = Arc::new(EventHousekeeper::new(lifecycle.clone(), spec.cleanup.clone()));
        let health = HealthMonitor::new(registry.clone());

        Ok(Self {
            repositories,
            registry,
            event_bus,
            dispatcher,
            scheduler,
            propagator,
            housekeeper,
            lifecycle,
            health,
            started_at: Utc::now(),
        })
    }

    /// Connect to the configured storage backend and build the engine.
    pub async fn from_config(config: &EngineConfigManifest, registry: AgentRegistry) -> Result<Self> {
        let backend = config.storage_backend()?;
        let repositories = create_repositories(&backend).await?;
        Self::new(config, repositories, registry)
    }

    pub async fn run_schedule(&self, at: DateTime<Utc>) -> Result<ScheduleReport, RepositoryError> {
        self.scheduler.run_schedule(at).await
    }

    pub async fn propagate(&self) -> Result<PropagationReport, RepositoryError> {
        self.propagator.receive_all().await
    }

    /// Manual run. A receive without explicit ids delivers the pending batch.
    pub async fn run_agent(
        &self,
        agent_id: AgentId,
        kind: RunKind,
        event_ids: Option<Vec<EventId>>,
    ) -> Result<RunSummary, DispatchError> {
        match (kind, event_ids) {
            (RunKind::Check, _) => self.dispatcher.run_check_now(agent_id).await,
            (RunKind::Receive, Some(ids)) => self.dispatcher.run_receive_now(agent_id, ids).await,
            (RunKind::Receive, None) => self.dispatcher.receive_pending_now(agent_id).await,
        }
    }

    pub async fn health(&self, agent_id: AgentId, now: DateTime<Utc>) -> Result<HealthReport, LifecycleError> {
        let agent = self.lifecycle.get_agent(agent_id).await?;
        Ok(self.health.report(&agent, now))
    }

    /// Spawn the scheduler, propagator and cleanup loops.
    pub fn start_background(&self) -> BackgroundTasks {
        info!("Starting engine background tasks");
        BackgroundTasks {
            tokens: vec![
                self.scheduler.shutdown_token(),
                self.propagator.shutdown_token(),
                self.housekeeper.shutdown_token(),
            ],
            handles: vec![
                self.scheduler.clone().start(),
                self.propagator.clone().start(),
                self.housekeeper.clone().start(),
            ],
        }
    }
}

pub struct BackgroundTasks {
    tokens: Vec<CancellationToken>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Cancel every loop and wait for them to finish their current pass.
    pub async fn shutdown(self) {
        for token in &self.tokens {
            token.cancel();
        }
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("Background task ended abnormally: {}", e);
            }
        }
        info!("Engine background tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::agent::CreateAgentRequest;
    use crate::domain::agent::UserId;
    use crate::infrastructure::agents::builtin_registry;

    #[tokio::test]
    async fn test_builds_from_default_config() {
        let config = EngineConfigManifest::default();
        let engine = Engine::from_config(&config, builtin_registry()).await.unwrap();
        let beat = engine
            .lifecycle
            .create_agent(CreateAgentRequest::new(UserId::new(), "beat", "heartbeat"))
            .await
            .unwrap();

        let summary = engine.run_agent(beat.id, RunKind::Check, None).await.unwrap();
        assert_eq!(summary.emitted.len(), 1);
        assert!(engine.health(beat.id, Utc::now()).await.unwrap().working);
    }

    #[tokio::test]
    async fn test_background_tasks_shut_down() {
        let engine = Engine::new(&EngineConfigManifest::default(), Repositories::in_memory(), builtin_registry()).unwrap();
        let tasks = engine.start_background();
        tokio::time::timeout(std::time::Duration::from_secs(2), tasks.shutdown())
            .await
            .unwrap();
    }
}
