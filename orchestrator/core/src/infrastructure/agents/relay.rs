// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Relay Agent
//
// Re-emits every received payload, optionally merging the keys of
// `options.merge` over it. Relays never run on a schedule.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::document::Document;
use crate::domain::event::Event;
use crate::domain::registry::{AgentBehavior, AgentContext, AgentError, AgentTypeDescriptor};

pub struct RelayAgent {
    descriptor: AgentTypeDescriptor,
}

impl RelayAgent {
    pub fn new() -> Self {
        Self {
            descriptor: AgentTypeDescriptor::new("relay")
                .described("Re-emits received events, optionally merging extra keys")
                .cannot_be_scheduled(),
        }
    }
}

impl Default for RelayAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentBehavior for RelayAgent {
    fn descriptor(&self) -> &AgentTypeDescriptor {
        &self.descriptor
    }

    fn validate_options(&self, options: &Document) -> Result<(), AgentError> {
        match options.get("merge") {
            None | Some(Value::Object(_)) => Ok(()),
            Some(_) => Err(AgentError::InvalidOptions("merge must be an object".into())),
        }
    }

    async fn receive(&self, ctx: &mut AgentContext, events: &[Event]) -> Result<(), AgentError> {
        let merge = match ctx.options().get("merge") {
            Some(Value::Object(merge)) => merge.clone(),
            _ => Document::new(),
        };

        for event in events {
            let mut payload = event.payload.clone();
            for (key, value) in &merge {
                payload.insert(key.clone(), value.clone());
            }
            ctx.create_event(payload);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{Agent, AgentId, UserId};
    use crate::domain::document::document;
    use crate::domain::event::EventId;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_relay_merges_options_over_payload() {
        let relay = RelayAgent::new();
        let agent = Agent::new(UserId::new(), "r", "relay")
            .with_options(document(json!({"merge": {"via": "relay", "n": 0}})));
        let event = Event {
            id: EventId(7),
            agent_id: AgentId::new(),
            user_id: agent.user_id,
            payload: document(json!({"n": 1, "body": "x"})),
            created_at: Utc::now(),
            expires_at: None,
        };

        let mut ctx = AgentContext::new(agent, Utc::now());
        relay.receive(&mut ctx, &[event]).await.unwrap();
        assert_eq!(
            Value::Object(ctx.emitted()[0].payload.clone()),
            json!({"n": 0, "body": "x", "via": "relay"})
        );
    }

    #[test]
    fn test_relay_is_not_schedulable() {
        let relay = RelayAgent::new();
        assert!(!relay.descriptor().can_be_scheduled);
        assert!(relay.validate_options(&document(json!({"merge": [1]}))).is_err());
    }
}
