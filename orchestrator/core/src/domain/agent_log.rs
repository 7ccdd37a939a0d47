// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Logs
//!
//! Append-only per-agent records written by the execution dispatcher on every
//! notable occurrence. Error-level entries drive the agent's
//! `last_error_log_at`, which the health monitor consults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;
use crate::domain::event::EventId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(LogLevel::Info),
            "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLog {
    pub id: u64,
    pub agent_id: AgentId,
    pub level: LogLevel,
    pub message: String,
    pub inbound_event_id: Option<EventId>,
    pub outbound_event_id: Option<EventId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAgentLog {
    pub agent_id: AgentId,
    pub level: LogLevel,
    pub message: String,
    pub inbound_event_id: Option<EventId>,
    pub outbound_event_id: Option<EventId>,
    pub created_at: DateTime<Utc>,
}

impl NewAgentLog {
    pub fn new(agent_id: AgentId, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            agent_id,
            level,
            message: message.into(),
            inbound_event_id: None,
            outbound_event_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn inbound(mut self, event_id: Option<EventId>) -> Self {
        self.inbound_event_id = event_id;
        self
    }

    pub fn outbound(mut self, event_id: Option<EventId>) -> Self {
        self.outbound_event_id = event_id;
        self
    }

    pub fn into_log(self, id: u64) -> AgentLog {
        AgentLog {
            id,
            agent_id: self.agent_id,
            level: self.level,
            message: self.message,
            inbound_event_id: self.inbound_event_id,
            outbound_event_id: self.outbound_event_id,
            created_at: self.created_at,
        }
    }
}
