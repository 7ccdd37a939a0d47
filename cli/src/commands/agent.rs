// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent management commands
//!
//! Commands: list, show, create, update, delete, run, health, events, logs,
//! link, unlink, links, clear-memory, drop-pending

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

use conduit_core::application::agent::{CreateAgentRequest, UpdateAgentRequest};
use conduit_core::domain::agent::{AgentId, RunKind, UserId};
use conduit_core::domain::document::{document, Document};
use conduit_core::domain::schedule::Schedule;

use super::{print_json, Backend};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RunKindArg {
    Check,
    Receive,
}

impl From<RunKindArg> for RunKind {
    fn from(kind: RunKindArg) -> Self {
        match kind {
            RunKindArg::Check => RunKind::Check,
            RunKindArg::Receive => RunKind::Receive,
        }
    }
}

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List agents
    List {
        /// Only agents owned by this user
        #[arg(long)]
        user_id: Option<Uuid>,
    },

    /// Show an agent as JSON
    Show {
        #[arg(value_name = "AGENT_ID")]
        agent_id: Uuid,
    },

    /// Create an agent
    Create {
        /// Display name
        #[arg(value_name = "NAME")]
        name: String,

        /// Agent type (digest, heartbeat, relay, ...)
        #[arg(short = 't', long = "type", value_name = "TYPE")]
        agent_type: String,

        /// Owning user
        #[arg(long)]
        user_id: Uuid,

        /// Options document (JSON string or @file.json)
        #[arg(short, long, value_name = "OPTIONS")]
        options: Option<String>,

        /// Schedule (never, every_5m, 6am, midnight, ...); default depends on the type
        #[arg(short, long)]
        schedule: Option<Schedule>,

        /// Create disabled
        #[arg(long)]
        disabled: bool,

        /// Event retention in days (0 keeps events forever)
        #[arg(long, default_value = "0")]
        keep_events_for_days: u32,

        /// Agents this one receives from (repeatable)
        #[arg(long = "source", value_name = "AGENT_ID")]
        sources: Vec<Uuid>,

        /// Agents this one emits to (repeatable)
        #[arg(long = "receiver", value_name = "AGENT_ID")]
        receivers: Vec<Uuid>,
    },

    /// Update an agent's configuration
    Update {
        #[arg(value_name = "AGENT_ID")]
        agent_id: Uuid,

        #[arg(long)]
        name: Option<String>,

        /// Replacement options document (JSON string or @file.json)
        #[arg(short, long, value_name = "OPTIONS")]
        options: Option<String>,

        #[arg(short, long)]
        schedule: Option<Schedule>,

        #[arg(long, conflicts_with = "enable")]
        disable: bool,

        #[arg(long)]
        enable: bool,

        #[arg(long)]
        keep_events_for_days: Option<u32>,

        /// Skip the current backlog instead of delivering it
        #[arg(long)]
        drop_pending_events: bool,
    },

    /// Delete an agent and its links and logs
    Delete {
        #[arg(value_name = "AGENT_ID")]
        agent_id: Uuid,

        /// Delete the agent's events as well
        #[arg(long)]
        delete_events: bool,
    },

    /// Run an agent once, outside its schedule
    Run {
        #[arg(value_name = "AGENT_ID")]
        agent_id: Uuid,

        #[arg(short, long, value_enum, default_value = "check")]
        kind: RunKindArg,

        /// Explicit event ids to receive (repeatable); default is the pending batch
        #[arg(long = "event", value_name = "EVENT_ID")]
        events: Vec<u64>,
    },

    /// Show whether an agent is working
    Health {
        #[arg(value_name = "AGENT_ID")]
        agent_id: Uuid,
    },

    /// Show an agent's most recent events
    Events {
        #[arg(value_name = "AGENT_ID")]
        agent_id: Uuid,

        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Delete all of the agent's events instead of listing them
        #[arg(long)]
        remove: bool,
    },

    /// Show an agent's run log
    Logs {
        #[arg(value_name = "AGENT_ID")]
        agent_id: Uuid,

        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Show errors only
        #[arg(short, long)]
        errors: bool,
    },

    /// Link a source agent to a receiver
    Link {
        #[arg(value_name = "SOURCE_ID")]
        source_id: Uuid,

        #[arg(value_name = "RECEIVER_ID")]
        receiver_id: Uuid,
    },

    /// Remove a link
    Unlink {
        #[arg(value_name = "SOURCE_ID")]
        source_id: Uuid,

        #[arg(value_name = "RECEIVER_ID")]
        receiver_id: Uuid,
    },

    /// List all links
    Links,

    /// Reset an agent's memory
    ClearMemory {
        #[arg(value_name = "AGENT_ID")]
        agent_id: Uuid,
    },

    /// Move an agent's cursor past every existing event
    DropPending {
        #[arg(value_name = "AGENT_ID")]
        agent_id: Uuid,
    },
}

pub async fn handle_command(
    command: AgentCommand,
    config_path: Option<PathBuf>,
    host: &str,
    port: u16,
) -> Result<()> {
    let backend = Backend::connect(config_path, host, port).await?;

    match command {
        AgentCommand::List { user_id } => list(&backend, user_id).await,
        AgentCommand::Show { agent_id } => print_json(&backend.get_agent(agent_id).await?),
        AgentCommand::Create {
            name,
            agent_type,
            user_id,
            options,
            schedule,
            disabled,
            keep_events_for_days,
            sources,
            receivers,
        } => {
            let request = CreateAgentRequest {
                options: options.as_deref().map(parse_document).transpose()?.unwrap_or_default(),
                schedule,
                disabled,
                keep_events_for_days,
                source_ids: sources.into_iter().map(AgentId).collect(),
                receiver_ids: receivers.into_iter().map(AgentId).collect(),
                ..CreateAgentRequest::new(UserId(user_id), name, agent_type)
            };
            let agent = backend.create_agent(request).await?;
            println!(
                "{}",
                format!("✓ Agent created: {} ({})", agent["name"].as_str().unwrap_or(""), agent["id"].as_str().unwrap_or("")).green()
            );
            println!("  Schedule: {}", agent["schedule"].as_str().unwrap_or("never"));
            Ok(())
        }
        AgentCommand::Update {
            agent_id,
            name,
            options,
            schedule,
            disable,
            enable,
            keep_events_for_days,
            drop_pending_events,
        } => {
            let disabled = match (disable, enable) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let request = UpdateAgentRequest {
                name,
                options: options.as_deref().map(parse_document).transpose()?,
                schedule,
                disabled,
                keep_events_for_days,
                drop_pending_events,
            };
            backend.update_agent(agent_id, request).await?;
            println!("{}", format!("✓ Agent {} updated", agent_id).green());
            Ok(())
        }
        AgentCommand::Delete { agent_id, delete_events } => {
            backend.delete_agent(agent_id, delete_events).await?;
            println!("{}", format!("✓ Agent {} deleted", agent_id).green());
            Ok(())
        }
        AgentCommand::Run { agent_id, kind, events } => {
            let event_ids = if events.is_empty() { None } else { Some(events) };
            let summary = backend.run_agent(agent_id, kind.into(), event_ids).await?;
            let emitted = summary["emitted"].as_array().map(Vec::len).unwrap_or(0);
            println!(
                "{}",
                format!(
                    "✓ Run finished in {}ms: received {}, emitted {}",
                    summary["duration_ms"], summary["received"], emitted
                )
                .green()
            );
            Ok(())
        }
        AgentCommand::Health { agent_id } => health(&backend, agent_id).await,
        AgentCommand::Events { agent_id, limit, remove } => {
            if remove {
                let body = backend.remove_agent_events(agent_id).await?;
                println!("{}", format!("✓ Removed {} event(s)", body["removed"]).green());
                return Ok(());
            }
            print_json(&backend.agent_events(agent_id, limit).await?)
        }
        AgentCommand::Logs { agent_id, limit, errors } => logs(&backend, agent_id, limit, errors).await,
        AgentCommand::Link { source_id, receiver_id } => {
            let body = backend.create_link(source_id, receiver_id).await?;
            if body["created"].as_bool().unwrap_or(false) {
                println!("{}", format!("✓ Linked {} -> {}", source_id, receiver_id).green());
            } else {
                println!("{}", format!("ℹ Link {} -> {} already exists", source_id, receiver_id).yellow());
            }
            Ok(())
        }
        AgentCommand::Unlink { source_id, receiver_id } => {
            backend.delete_link(source_id, receiver_id).await?;
            println!("{}", format!("✓ Unlinked {} -> {}", source_id, receiver_id).green());
            Ok(())
        }
        AgentCommand::Links => print_json(&backend.list_links().await?),
        AgentCommand::ClearMemory { agent_id } => {
            backend.clear_memory(agent_id).await?;
            println!("{}", format!("✓ Memory of agent {} cleared", agent_id).green());
            Ok(())
        }
        AgentCommand::DropPending { agent_id } => {
            let body = backend.drop_pending(agent_id).await?;
            println!("{}", format!("✓ Cursor moved to {}", body["cursor"]).green());
            Ok(())
        }
    }
}

async fn list(backend: &Backend, user_id: Option<Uuid>) -> Result<()> {
    let agents = backend.list_agents(user_id).await?;
    let agents = agents.as_array().cloned().unwrap_or_default();

    if agents.is_empty() {
        println!("{}", "No agents found".dimmed());
        return Ok(());
    }

    println!(
        "{:<38} {:<20} {:<12} {:<12} {}",
        "ID".bold(),
        "NAME".bold(),
        "TYPE".bold(),
        "SCHEDULE".bold(),
        "STATE".bold()
    );
    for agent in agents {
        let state = if agent["deactivated"].as_bool().unwrap_or(false) {
            "deactivated".red()
        } else if agent["disabled"].as_bool().unwrap_or(false) {
            "disabled".yellow()
        } else {
            "enabled".green()
        };
        println!(
            "{:<38} {:<20} {:<12} {:<12} {}",
            agent["id"].as_str().unwrap_or(""),
            agent["name"].as_str().unwrap_or(""),
            agent["agent_type"].as_str().unwrap_or(""),
            agent["schedule"].as_str().unwrap_or(""),
            state
        );
    }
    Ok(())
}

async fn health(backend: &Backend, agent_id: Uuid) -> Result<()> {
    let report = backend.agent_health(agent_id).await?;
    if report["working"].as_bool().unwrap_or(false) {
        println!("{}", "✓ Agent is working".green());
    } else {
        println!("{}", "✗ Agent is not working".red());
    }
    println!("  Consecutive failures: {}", report["consecutive_failures"]);
    if let Some(window) = report["expected_window_seconds"].as_i64() {
        println!("  Expected update window: {}s", window);
    }
    if let Some(at) = report["last_activity_at"].as_str() {
        println!("  Last activity: {}", at);
    }
    if let Some(at) = report["last_error_log_at"].as_str() {
        println!("  Last error: {}", at);
    }
    Ok(())
}

async fn logs(backend: &Backend, agent_id: Uuid, limit: usize, errors: bool) -> Result<()> {
    let logs = backend.agent_logs(agent_id, limit).await?;
    for log in logs.as_array().cloned().unwrap_or_default() {
        let level = log["level"].as_str().unwrap_or("info");
        if errors && level != "error" {
            continue;
        }
        let level = match level {
            "error" => level.red(),
            "warning" => level.yellow(),
            _ => level.normal(),
        };
        println!(
            "{} [{}] {}",
            log["created_at"].as_str().unwrap_or("").dimmed(),
            level,
            log["message"].as_str().unwrap_or("")
        );
    }
    Ok(())
}

/// Parse a JSON object given inline or as `@path`.
pub fn parse_document(raw: &str) -> Result<Document> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read options file {}", path))?,
        None => raw.to_string(),
    };
    let value: Value = serde_json::from_str(&text).context("Options must be valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("Options must be a JSON object");
    }
    Ok(document(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_document_inline() {
        let doc = parse_document(r#"{"message": "hi", "n": 2}"#).unwrap();
        assert_eq!(doc.get("message"), Some(&Value::from("hi")));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_parse_document_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"merge": {{"source": "cli"}}}}"#).unwrap();
        let doc = parse_document(&format!("@{}", file.path().display())).unwrap();
        assert!(doc.get("merge").is_some());
    }

    #[test]
    fn test_parse_document_rejects_non_objects() {
        assert!(parse_document("[1, 2]").is_err());
        assert!(parse_document("not json").is_err());
    }
}
