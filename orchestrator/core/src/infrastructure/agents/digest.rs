// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Digest Agent
//
// Collects the payloads of every received event in `memory.queue` and, on
// its schedule, emits a single event bundling them.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::document::Document;
use crate::domain::event::Event;
use crate::domain::registry::{AgentBehavior, AgentContext, AgentError, AgentTypeDescriptor};
use crate::domain::schedule::Schedule;

const QUEUE: &str = "queue";

pub struct DigestAgent {
    descriptor: AgentTypeDescriptor,
}

impl DigestAgent {
    pub fn new() -> Self {
        Self {
            descriptor: AgentTypeDescriptor::new("digest")
                .described("Queues received events and emits them as one digest on schedule")
                .default_schedule(Schedule::DailyAt { hour: 6 }),
        }
    }
}

impl Default for DigestAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// Take the queued payloads, leaving an empty queue behind.
fn take_queue(memory: &mut Document) -> Vec<Value> {
    match memory.insert(QUEUE.into(), Value::Array(Vec::new())) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

#[async_trait]
impl AgentBehavior for DigestAgent {
    fn descriptor(&self) -> &AgentTypeDescriptor {
        &self.descriptor
    }

    fn validate_options(&self, options: &Document) -> Result<(), AgentError> {
        match options.get("message") {
            None | Some(Value::String(_)) => Ok(()),
            Some(_) => Err(AgentError::InvalidOptions("message must be a string".into())),
        }
    }

    async fn check(&self, ctx: &mut AgentContext) -> Result<(), AgentError> {
        let queued = take_queue(ctx.memory_mut());
        if queued.is_empty() {
            return Ok(());
        }

        let message = match ctx.options().get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => format!("{} events received", queued.len()),
        };
        let count = queued.len();

        let mut payload = Document::new();
        payload.insert("events".into(), Value::Array(queued));
        payload.insert("message".into(), json!(message));
        ctx.create_event(payload);
        ctx.log(format!("Emitted digest of {} events", count));
        Ok(())
    }

    async fn receive(&self, ctx: &mut AgentContext, events: &[Event]) -> Result<(), AgentError> {
        let mut queue = take_queue(ctx.memory_mut());
        queue.extend(events.iter().map(|e| Value::Object(e.payload.clone())));
        ctx.memory_mut().insert(QUEUE.into(), Value::Array(queue));
        Ok(())
    }
}
