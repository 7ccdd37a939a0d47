// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Propagator - delivers pending events along links
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** One propagation cycle = at most one batched `receive` per
//!   receiver, covering every event it has not received yet
//!
//! The background loop runs a cycle every `propagation.interval_seconds`, and
//! immediately after any run emits events when `propagate_on_emit` is set.
//! Cycles in the link graph are allowed: a receiver only ever sees events
//! strictly newer than its cursor, so each cycle delivers a finite batch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::dispatcher::{ExecutionDispatcher, Invocation, Outcome};
use crate::application::worker_pool::WorkerPool;
use crate::domain::agent::{Agent, AgentId};
use crate::domain::engine_config::PropagationConfig;
use crate::domain::repository::{AgentRepository, LinkRepository, RepositoryError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropagationReport {
    pub started_at: DateTime<Utc>,
    /// Receivers that had pending events at the start of the cycle.
    pub receivers: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub events_delivered: usize,
    pub outcomes: Vec<Outcome>,
}

impl PropagationReport {
    fn tally(started_at: DateTime<Utc>, outcomes: Vec<Outcome>) -> Self {
        let mut report = Self {
            started_at,
            receivers: outcomes.len(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            events_delivered: 0,
            outcomes: Vec::new(),
        };
        for outcome in &outcomes {
            match outcome {
                Outcome::Completed(summary) => {
                    report.succeeded += 1;
                    report.events_delivered += summary.received;
                }
                Outcome::Failed { .. } => report.failed += 1,
                Outcome::Skipped { .. } => report.skipped += 1,
            }
        }
        report.outcomes = outcomes;
        report
    }
}

pub struct Propagator {
    agents: Arc<dyn AgentRepository>,
    links: Arc<dyn LinkRepository>,
    dispatcher: Arc<ExecutionDispatcher>,
    pool: WorkerPool,
    config: PropagationConfig,
    wake: Arc<Notify>,
    shutdown_token: CancellationToken,
}

impl Propagator {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        links: Arc<dyn LinkRepository>,
        dispatcher: Arc<ExecutionDispatcher>,
        pool: WorkerPool,
        config: PropagationConfig,
    ) -> Self {
        let wake = dispatcher.emit_signal();
        Self {
            agents,
            links,
            dispatcher,
            pool,
            config,
            wake,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    fn can_receive(&self, agent: &Agent) -> bool {
        self.dispatcher
            .registry()
            .get(agent.agent_type())
            .map_or(true, |behavior| behavior.descriptor().can_receive_events)
    }

    /// Runnable receivers of at least one link that currently have pending events.
    pub async fn receivers_with_pending(&self, now: DateTime<Utc>) -> Result<Vec<AgentId>, RepositoryError> {
        let receiver_ids: Vec<AgentId> = self
            .links
            .list_all()
            .await?
            .into_iter()
            .map(|link| link.receiver_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut pending = Vec::new();
        for agent in self.agents.find_by_ids(&receiver_ids).await? {
            if !agent.is_runnable() || !self.can_receive(&agent) {
                continue;
            }
            let batch = self.dispatcher.cursor().unreceived_events(&agent, now).await?;
            if !batch.is_empty() {
                pending.push(agent.id);
            }
        }
        Ok(pending)
    }

    /// Run one propagation cycle.
    pub async fn receive_all(&self) -> Result<PropagationReport, RepositoryError> {
        let started_at = Utc::now();
        let receivers = self.receivers_with_pending(started_at).await?;
        debug!(receivers = receivers.len(), "Propagation cycle");

        let dispatcher = self.dispatcher.clone();
        let outcomes = self
            .pool
            .run_all(receivers, move |agent_id| {
                let dispatcher = dispatcher.clone();
                async move { dispatcher.dispatch(agent_id, Invocation::ReceivePending).await }
            })
            .await;

        let report = PropagationReport::tally(started_at, outcomes);
        if report.receivers > 0 {
            info!(
                receivers = report.receivers,
                delivered = report.events_delivered,
                failed = report.failed,
                skipped = report.skipped,
                "Propagation cycle completed"
            );
        }
        Ok(report)
    }

    /// Start the propagation background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Propagator is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            propagate_on_emit = self.config.propagate_on_emit,
            "Starting propagator background task"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds.max(1)));
        let on_emit = self.config.propagate_on_emit;

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = self.wake.notified(), if on_emit => {
                    debug!("Propagator woken by emitted events");
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping propagator");
                    break;
                }
            }

            if let Err(e) = self.receive_all().await {
                warn!("Propagation cycle failed: {}", e);
            }
        }

        info!("Propagator background task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repository_factory::Repositories;
    use crate::domain::agent::{RunKind, UserId};
    use crate::domain::document::Document;
    use crate::domain::event::{Event, EventId, NewEvent};
    use crate::domain::link::Link;
    use crate::domain::registry::{AgentBehavior, AgentContext, AgentError, AgentRegistry, AgentTypeDescriptor};
    use crate::infrastructure::event_bus::EventBus;
    use async_trait::async_trait;

    struct Sink(AgentTypeDescriptor);

    #[async_trait]
    impl AgentBehavior for Sink {
        fn descriptor(&self) -> &AgentTypeDescriptor {
            &self.0
        }

        async fn receive(&self, _ctx: &mut AgentContext, _events: &[Event]) -> Result<(), AgentError> {
            Ok(())
        }
    }

    fn propagator(repos: &Repositories) -> Propagator {
        let registry = AgentRegistry::new()
            .with(Arc::new(Sink(AgentTypeDescriptor::new("sink"))))
            .with(Arc::new(Sink(AgentTypeDescriptor::new("deaf").cannot_receive_events())));
        let dispatcher = Arc::new(ExecutionDispatcher::new(repos, Arc::new(registry), EventBus::new(64), 50));
        Propagator::new(
            repos.agents.clone(),
            repos.links.clone(),
            dispatcher,
            WorkerPool::new(4),
            PropagationConfig::default(),
        )
    }

    async fn emit(repos: &Repositories, agent: &Agent) -> EventId {
        repos
            .events
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
    async fn test_source_without_links_is_noop() {
        let repos = Repositories::in_memory();
        let propagator = propagator(&repos);
        let lonely = Agent::new(UserId::new(), "x", "sink");
        repos.agents.save(&lonely).await.unwrap();
        emit(&repos, &lonely).await;

        let report = propagator.receive_all().await.unwrap();
        assert_eq!(report.receivers, 0);
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_receivers_that_cannot_receive_are_ignored() {
        let repos = Repositories::in_memory();
        let propagator = propagator(&repos);
        let user = UserId::new();
        let source = Agent::new(user, "s", "sink");
        let deaf = Agent::new(user, "d", "deaf");
        repos.agents.save(&source).await.unwrap();
        repos.agents.save(&deaf).await.unwrap();
        repos.links.create(&Link::new(source.id, deaf.id).unwrap()).await.unwrap();
        emit(&repos, &source).await;

        assert!(propagator.receivers_with_pending(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_emit_signal_wakes_loop() {
        let repos = Repositories::in_memory();
        let mut propagator = propagator(&repos);
        propagator.config.interval_seconds = 3600;
        let propagator = Arc::new(propagator);
        let user = UserId::new();
        let source = Agent::new(user, "s", "sink");
        let receiver = Agent::new(user, "r", "sink");
        repos.agents.save(&source).await.unwrap();
        repos.agents.save(&receiver).await.unwrap();
        repos.links.create(&Link::new(source.id, receiver.id).unwrap()).await.unwrap();

        let token = propagator.shutdown_token();
        let wake = propagator.wake.clone();
        let handle = propagator.clone().start();

        // Let the immediate first tick pass, then emit and wake.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let id = emit(&repos, &source).await;
        wake.notify_one();

        let mut delivered = false;
        for _ in 0..50 {
            let stored = repos.agents.find_by_id(receiver.id).await.unwrap().unwrap();
            if stored.last_checked_event_id == Some(id) {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        token.cancel();
        handle.await.unwrap();
        assert!(delivered);
    }

    #[tokio::test]
    async fn test_busy_receiver_is_retried_next_cycle() {
        let repos = Repositories::in_memory();
        let propagator = propagator(&repos);
        let user = UserId::new();
        let source = Agent::new(user, "s", "sink");
        let receiver = Agent::new(user, "r", "sink");
        repos.agents.save(&source).await.unwrap();
        repos.agents.save(&receiver).await.unwrap();
        repos.links.create(&Link::new(source.id, receiver.id).unwrap()).await.unwrap();
        emit(&repos, &source).await;
        emit(&repos, &source).await;
        let last = emit(&repos, &source).await;

        let held = propagator.dispatcher.claim(receiver.id, RunKind::Check).unwrap();
        let report = propagator.receive_all().await.unwrap();
        assert_eq!(report.receivers, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.events_delivered, 0);
        let stored = repos.agents.find_by_id(receiver.id).await.unwrap().unwrap();
        assert_eq!(stored.last_checked_event_id, None);
        drop(held);

        let report = propagator.receive_all().await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.events_delivered, 3);
        let stored = repos.agents.find_by_id(receiver.id).await.unwrap().unwrap();
        assert_eq!(stored.last_checked_event_id, Some(last));
    }
}
