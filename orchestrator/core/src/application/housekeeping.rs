// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Event Housekeeper - background task that deletes expired events
//!
//! Expired events are already invisible to propagation; this loop only
//! reclaims their storage.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::agent::AgentLifecycleService;
use crate::domain::engine_config::CleanupConfig;

pub struct EventHousekeeper {
    lifecycle: Arc<dyn AgentLifecycleService>,
    config: CleanupConfig,
    shutdown_token: CancellationToken,
}

impl EventHousekeeper {
    pub fn new(lifecycle: Arc<dyn AgentLifecycleService>, config: CleanupConfig) -> Self {
        Self {
            lifecycle,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the housekeeping background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Event cleanup is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            "Starting event cleanup background task"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds.max(1)));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.lifecycle.cleanup_expired(Utc::now()).await {
                        Ok(count) => debug!(count, "Cleanup pass finished"),
                        Err(e) => warn!("Event cleanup failed: {}", e),
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping event cleanup");
                    break;
                }
            }
        }

        info!("Event cleanup background task stopped");
    }
}
