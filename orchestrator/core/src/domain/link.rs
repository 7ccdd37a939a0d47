// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Links
//!
//! Directed edges declaring that a source agent's events are delivered to a
//! receiver agent. Cycles across two or more agents are allowed; delivery is
//! bounded by each receiver's cursor rather than by cycle detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::{AgentId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub source_id: AgentId,
    pub receiver_id: AgentId,
    pub created_at: DateTime<Utc>,
}

impl Link {
    pub fn new(source_id: AgentId, receiver_id: AgentId) -> Result<Self, GraphError> {
        if source_id == receiver_id {
            return Err(GraphError::SelfLoop(source_id));
        }
        Ok(Self {
            source_id,
            receiver_id,
            created_at: Utc::now(),
        })
    }

    pub fn touches(&self, agent_id: AgentId) -> bool {
        self.source_id == agent_id || self.receiver_id == agent_id
    }
}

/// Graph integrity errors, raised when the graph is edited.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Agent {0} cannot be linked to itself")]
    SelfLoop(AgentId),

    #[error("Agent {0} does not exist")]
    UnknownAgent(AgentId),

    #[error("Agent {agent_id} is not owned by user {user_id}")]
    ForeignAgent { agent_id: AgentId, user_id: UserId },

    #[error("Agent {0} cannot receive events")]
    CannotReceive(AgentId),

    #[error("Agent {0} cannot create events")]
    CannotCreate(AgentId),
}
