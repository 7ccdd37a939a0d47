// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Embedded mode execution (when daemon is not running)
//!
//! Builds the engine in-process from the discovered configuration and runs
//! commands against it directly. No background loops are started; every
//! command is a single pass.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use conduit_core::application::agent::{CreateAgentRequest, UpdateAgentRequest};
use conduit_core::application::engine::Engine;
use conduit_core::domain::agent::{AgentId, RunKind, UserId};
use conduit_core::domain::engine_config::{EngineConfigManifest, StorageKind};
use conduit_core::domain::event::EventId;
use conduit_core::infrastructure::agents::builtin_registry;

pub struct EmbeddedExecutor {
    engine: Arc<Engine>,
}

fn to_json<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to encode result")
}

impl EmbeddedExecutor {
    pub async fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = EngineConfigManifest::load_or_default(config_path)
            .context("Failed to load configuration")?;

        config
            .validate()
            .context("Configuration validation failed")?;

        if config.spec.storage.backend == StorageKind::Memory {
            warn!("Embedded mode with in-memory storage: state is discarded when the command exits");
        }

        let engine = Engine::from_config(&config, builtin_registry())
            .await
            .context("Failed to initialize engine")?;

        Ok(Self {
            engine: Arc::new(engine),
        })
    }

    pub fn from_engine(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub async fn run_schedule(&self, at: Option<chrono::DateTime<Utc>>) -> Result<Value> {
        to_json(self.engine.run_schedule(at.unwrap_or_else(Utc::now)).await?)
    }

    pub async fn propagate(&self) -> Result<Value> {
        to_json(self.engine.propagate().await?)
    }

    pub async fn cleanup_events(&self) -> Result<Value> {
        let removed = self.engine.lifecycle.cleanup_expired(Utc::now()).await?;
        Ok(json!({ "removed": removed }))
    }

    pub async fn list_agents(&self, user_id: Option<Uuid>) -> Result<Value> {
        to_json(self.engine.lifecycle.list_agents(user_id.map(UserId)).await?)
    }

    pub async fn get_agent(&self, agent_id: Uuid) -> Result<Value> {
        to_json(self.engine.lifecycle.get_agent(AgentId(agent_id)).await?)
    }

    pub async fn create_agent(&self, request: CreateAgentRequest) -> Result<Value> {
        to_json(self.engine.lifecycle.create_agent(request).await?)
    }

    pub async fn update_agent(&self, agent_id: Uuid, request: UpdateAgentRequest) -> Result<Value> {
        to_json(self.engine.lifecycle.update_agent(AgentId(agent_id), request).await?)
    }

    pub async fn delete_agent(&self, agent_id: Uuid, delete_events: bool) -> Result<()> {
        self.engine
            .lifecycle
            .delete_agent(AgentId(agent_id), delete_events)
            .await?;
        Ok(())
    }

    pub async fn run_agent(&self, agent_id: Uuid, kind: RunKind, event_ids: Option<Vec<u64>>) -> Result<Value> {
        let event_ids = event_ids.map(|ids| ids.into_iter().map(EventId).collect());
        to_json(self.engine.run_agent(AgentId(agent_id), kind, event_ids).await?)
    }

    pub async fn agent_health(&self, agent_id: Uuid) -> Result<Value> {
        to_json(self.engine.health(AgentId(agent_id), Utc::now()).await?)
    }

    pub async fn agent_events(&self, agent_id: Uuid, limit: usize) -> Result<Value> {
        to_json(self.engine.lifecycle.recent_events(AgentId(agent_id), limit).await?)
    }

    pub async fn remove_agent_events(&self, agent_id: Uuid) -> Result<Value> {
        let removed = self.engine.lifecycle.remove_events(AgentId(agent_id)).await?;
        Ok(json!({ "removed": removed }))
    }

    pub async fn agent_logs(&self, agent_id: Uuid, limit: usize) -> Result<Value> {
        to_json(self.engine.lifecycle.logs(AgentId(agent_id), limit).await?)
    }

    pub async fn clear_memory(&self, agent_id: Uuid) -> Result<()> {
        self.engine.lifecycle.clear_memory(AgentId(agent_id)).await?;
        Ok(())
    }

    pub async fn drop_pending(&self, agent_id: Uuid) -> Result<Value> {
        let cursor = self.engine.lifecycle.drop_pending_events(AgentId(agent_id)).await?;
        Ok(json!({ "cursor": cursor }))
    }

    pub async fn list_links(&self) -> Result<Value> {
        to_json(self.engine.lifecycle.list_links().await?)
    }

    pub async fn create_link(&self, source_id: Uuid, receiver_id: Uuid) -> Result<Value> {
        let created = self
            .engine
            .lifecycle
            .connect(AgentId(source_id), AgentId(receiver_id))
            .await?;
        Ok(json!({ "created": created }))
    }

    pub async fn delete_link(&self, source_id: Uuid, receiver_id: Uuid) -> Result<()> {
        let removed = self
            .engine
            .lifecycle
            .disconnect(AgentId(source_id), AgentId(receiver_id))
            .await?;
        if !removed {
            anyhow::bail!("Link {} -> {} not found", source_id, receiver_id);
        }
        Ok(())
    }

    pub async fn deactivate_user(&self, user_id: Uuid) -> Result<Value> {
        let agents = self.engine.lifecycle.deactivate_user(UserId(user_id)).await?;
        Ok(json!({ "agents": agents }))
    }

    pub async fn activate_user(&self, user_id: Uuid) -> Result<Value> {
        let agents = self.engine.lifecycle.activate_user(UserId(user_id)).await?;
        Ok(json!({ "agents": agents }))
    }
}
