// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Conduit CLI
//!
//! Engine commands delegate to the daemon when it is running and otherwise
//! build an embedded engine for the duration of the command.

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

use conduit_core::application::agent::{CreateAgentRequest, UpdateAgentRequest};
use conduit_core::domain::agent::RunKind;

use crate::daemon::{check_daemon_running, DaemonClient, DaemonStatus};
use crate::embedded::EmbeddedExecutor;

pub mod agent;
pub mod config;
pub mod daemon;
pub mod events;
pub mod propagate;
pub mod schedule;
pub mod update;
pub mod user;

pub use self::agent::AgentCommand;
pub use self::config::ConfigCommand;
pub use self::daemon::DaemonCommand;
pub use self::events::EventsCommand;
pub use self::propagate::PropagateCommand;
pub use self::schedule::ScheduleCommand;
pub use self::update::UpdateCommand;
pub use self::user::UserCommand;

/// Where engine commands are executed.
pub enum Backend {
    Daemon(DaemonClient),
    Embedded(EmbeddedExecutor),
}

impl Backend {
    pub async fn connect(config_path: Option<PathBuf>, host: &str, port: u16) -> Result<Self> {
        match check_daemon_running(host, port).await {
            Ok(DaemonStatus::Running { .. }) => {
                info!("Delegating to daemon API");
                Ok(Backend::Daemon(DaemonClient::new(host, port)?))
            }
            Ok(DaemonStatus::Unhealthy { pid, error }) => {
                anyhow::bail!(
                    "Daemon is running (PID: {}) but unhealthy: {}. Run 'conduit daemon status' for more info.",
                    pid,
                    error
                )
            }
            _ => {
                info!("Daemon not running, using embedded mode");
                Ok(Backend::Embedded(EmbeddedExecutor::new(config_path).await?))
            }
        }
    }

    pub async fn run_schedule(&self, at: Option<DateTime<Utc>>) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.run_schedule(at).await,
            Backend::Embedded(executor) => executor.run_schedule(at).await,
        }
    }

    pub async fn propagate(&self) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.propagate().await,
            Backend::Embedded(executor) => executor.propagate().await,
        }
    }

    pub async fn cleanup_events(&self) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.cleanup_events().await,
            Backend::Embedded(executor) => executor.cleanup_events().await,
        }
    }

    pub async fn list_agents(&self, user_id: Option<Uuid>) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.list_agents(user_id).await,
            Backend::Embedded(executor) => executor.list_agents(user_id).await,
        }
    }

    pub async fn get_agent(&self, agent_id: Uuid) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.get_agent(agent_id).await,
            Backend::Embedded(executor) => executor.get_agent(agent_id).await,
        }
    }

    pub async fn create_agent(&self, request: CreateAgentRequest) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.create_agent(&request).await,
            Backend::Embedded(executor) => executor.create_agent(request).await,
        }
    }

    pub async fn update_agent(&self, agent_id: Uuid, request: UpdateAgentRequest) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.update_agent(agent_id, &request).await,
            Backend::Embedded(executor) => executor.update_agent(agent_id, request).await,
        }
    }

    pub async fn delete_agent(&self, agent_id: Uuid, delete_events: bool) -> Result<()> {
        match self {
            Backend::Daemon(client) => client.delete_agent(agent_id, delete_events).await,
            Backend::Embedded(executor) => executor.delete_agent(agent_id, delete_events).await,
        }
    }

    pub async fn run_agent(&self, agent_id: Uuid, kind: RunKind, event_ids: Option<Vec<u64>>) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.run_agent(agent_id, kind, event_ids).await,
            Backend::Embedded(executor) => executor.run_agent(agent_id, kind, event_ids).await,
        }
    }

    pub async fn agent_health(&self, agent_id: Uuid) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.agent_health(agent_id).await,
            Backend::Embedded(executor) => executor.agent_health(agent_id).await,
        }
    }

    pub async fn agent_events(&self, agent_id: Uuid, limit: usize) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.agent_events(agent_id, limit).await,
            Backend::Embedded(executor) => executor.agent_events(agent_id, limit).await,
        }
    }

    pub async fn remove_agent_events(&self, agent_id: Uuid) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.remove_agent_events(agent_id).await,
            Backend::Embedded(executor) => executor.remove_agent_events(agent_id).await,
        }
    }

    pub async fn agent_logs(&self, agent_id: Uuid, limit: usize) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.agent_logs(agent_id, limit).await,
            Backend::Embedded(executor) => executor.agent_logs(agent_id, limit).await,
        }
    }

    pub async fn clear_memory(&self, agent_id: Uuid) -> Result<()> {
        match self {
            Backend::Daemon(client) => client.clear_memory(agent_id).await,
            Backend::Embedded(executor) => executor.clear_memory(agent_id).await,
        }
    }

    pub async fn drop_pending(&self, agent_id: Uuid) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.drop_pending(agent_id).await,
            Backend::Embedded(executor) => executor.drop_pending(agent_id).await,
        }
    }

    pub async fn list_links(&self) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.list_links().await,
            Backend::Embedded(executor) => executor.list_links().await,
        }
    }

    pub async fn create_link(&self, source_id: Uuid, receiver_id: Uuid) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.create_link(source_id, receiver_id).await,
            Backend::Embedded(executor) => executor.create_link(source_id, receiver_id).await,
        }
    }

    pub async fn delete_link(&self, source_id: Uuid, receiver_id: Uuid) -> Result<()> {
        match self {
            Backend::Daemon(client) => client.delete_link(source_id, receiver_id).await,
            Backend::Embedded(executor) => executor.delete_link(source_id, receiver_id).await,
        }
    }

    pub async fn deactivate_user(&self, user_id: Uuid) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.deactivate_user(user_id).await,
            Backend::Embedded(executor) => executor.deactivate_user(user_id).await,
        }
    }

    pub async fn activate_user(&self, user_id: Uuid) -> Result<Value> {
        match self {
            Backend::Daemon(client) => client.activate_user(user_id).await,
            Backend::Embedded(executor) => executor.activate_user(user_id).await,
        }
    }
}

/// Pretty-print a response body.
pub fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a one-line summary of a skipped/failed/succeeded tally.
pub fn print_tally(label: &str, report: &Value) {
    let succeeded = report["succeeded"].as_u64().unwrap_or(0);
    let failed = report["failed"].as_u64().unwrap_or(0);
    let skipped = report["skipped"].as_u64().unwrap_or(0);
    let line = format!(
        "{}: {} succeeded, {} failed, {} skipped",
        label, succeeded, failed, skipped
    );
    if failed > 0 {
        println!("{}", format!("⚠ {}", line).yellow());
    } else {
        println!("{}", format!("✓ {}", line).green());
    }
}
