// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Heartbeat Agent
//
// Emits a numbered beat on every check. Useful as a graph source and as a
// liveness probe for the scheduler itself.

use async_trait::async_trait;
use serde_json::json;

use crate::domain::document::Document;
use crate::domain::registry::{AgentBehavior, AgentContext, AgentError, AgentTypeDescriptor};
use crate::domain::schedule::Schedule;

pub struct HeartbeatAgent {
    descriptor: AgentTypeDescriptor,
}

impl HeartbeatAgent {
    pub fn new() -> Self {
        Self {
            descriptor: AgentTypeDescriptor::new("heartbeat")
                .described("Emits a numbered beat every time it is checked")
                .default_schedule(Schedule::Every { minutes: 60 })
                .cannot_receive_events(),
        }
    }
}

impl Default for HeartbeatAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentBehavior for HeartbeatAgent {
    fn descriptor(&self) -> &AgentTypeDescriptor {
        &self.descriptor
    }

    async fn check(&self, ctx: &mut AgentContext) -> Result<(), AgentError> {
        let beat = ctx.memory().get("beat").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
        let at = ctx.now();
        ctx.memory_mut().insert("beat".into(), json!(beat));

        let mut payload = Document::new();
        payload.insert("beat".into(), json!(beat));
        payload.insert("at".into(), json!(at.to_rfc3339()));
        ctx.create_event(payload);
        Ok(())
    }
}
