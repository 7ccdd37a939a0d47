// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Scheduler - background task that runs due agents' `check`
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select agents whose schedule is due and fan them out to the
//!   dispatcher through the worker pool
//!
//! The loop wakes every `scheduler.tick_seconds` and runs each wall-clock
//! minute at most once, so the tick only bounds how late a minute can start.

use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::dispatcher::{ExecutionDispatcher, Invocation, Outcome};
use crate::application::worker_pool::WorkerPool;
use crate::domain::agent::{Agent, AgentId};
use crate::domain::engine_config::SchedulerConfig;
use crate::domain::repository::{AgentRepository, RepositoryError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleReport {
    pub at: DateTime<Utc>,
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<Outcome>,
}

impl ScheduleReport {
    fn tally(at: DateTime<Utc>, outcomes: Vec<Outcome>) -> Self {
        let mut report = Self {
            at,
            due: outcomes.len(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            outcomes: Vec::new(),
        };
        for outcome in &outcomes {
            match outcome {
                Outcome::Completed(_) => report.succeeded += 1,
                Outcome::Failed { .. } => report.failed += 1,
                Outcome::Skipped { .. } => report.skipped += 1,
            }
        }
        report.outcomes = outcomes;
        report
    }
}

pub struct Scheduler {
    agents: Arc<dyn AgentRepository>,
    dispatcher: Arc<ExecutionDispatcher>,
    pool: WorkerPool,
    config: SchedulerConfig,
    offset: FixedOffset,
    last_minute: Mutex<Option<i64>>,
    shutdown_token: CancellationToken,
}

impl Scheduler {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        dispatcher: Arc<ExecutionDispatcher>,
        pool: WorkerPool,
        config: SchedulerConfig,
        offset: FixedOffset,
    ) -> Self {
        Self {
            agents,
            dispatcher,
            pool,
            config,
            offset,
            last_minute: Mutex::new(None),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    fn schedulable(&self, agent: &Agent) -> bool {
        // Unknown types still go through the dispatcher so the failure is recorded.
        self.dispatcher
            .registry()
            .get(agent.agent_type())
            .map_or(true, |behavior| behavior.descriptor().can_be_scheduled)
    }

    /// Agents due in the minute containing `at`.
    pub async fn due_agents(&self, at: DateTime<Utc>) -> Result<Vec<AgentId>, RepositoryError> {
        let local = at.with_timezone(&self.offset);
        let candidates = self.agents.find_scheduled().await?;
        Ok(candidates
            .into_iter()
            .filter(|agent| agent.is_runnable() && agent.schedule.is_due(local) && self.schedulable(agent))
            .map(|agent| agent.id)
            .collect())
    }

    /// Run one scheduler tick for the minute containing `at`.
    pub async fn run_schedule(&self, at: DateTime<Utc>) -> Result<ScheduleReport, RepositoryError> {
        let due = self.due_agents(at).await?;
        debug!(due = due.len(), at = %at, "Scheduler tick");

        let dispatcher = self.dispatcher.clone();
        let outcomes = self
            .pool
            .run_all(due, move |agent_id| {
                let dispatcher = dispatcher.clone();
                async move { dispatcher.dispatch(agent_id, Invocation::Check).await }
            })
            .await;

        let report = ScheduleReport::tally(at, outcomes);
        if report.due > 0 {
            info!(
                due = report.due,
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped,
                "Scheduler tick completed"
            );
        }
        Ok(report)
    }

    /// Whether the minute containing `at` has not been run yet; marks it as run.
    fn claim_minute(&self, at: DateTime<Utc>) -> bool {
        let minute = at.timestamp().div_euclid(60);
        let mut last = self.last_minute.lock();
        if *last == Some(minute) {
            return false;
        }
        *last = Some(minute);
        true
    }

    /// Start the scheduler background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Scheduler is disabled");
            return;
        }

        info!(
            tick_seconds = self.config.tick_seconds,
            utc_offset = %self.offset,
            "Starting scheduler background task"
        );

        let mut tick = interval(Duration::from_secs(self.config.tick_seconds.max(1)));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let now = Utc::now();
                    if !self.claim_minute(now) {
                        continue;
                    }
                    if let Err(e) = self.run_schedule(now).await {
                        warn!("Scheduler tick failed: {}", e);
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }

        info!("Scheduler background task stopped");
    }
}
