// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Events
//!
//! Immutable, timestamped payloads produced by exactly one agent. Event ids
//! are assigned by the event store in insertion order, which together with
//! `created_at` gives the total order used for cursor semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::domain::agent::{AgentId, UserId};
use crate::domain::document::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub payload: Document,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }

    /// Delivery order: creation time ascending, ties broken by id.
    pub fn delivery_order(a: &Event, b: &Event) -> Ordering {
        a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
    }
}

/// An event that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub payload: Document,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewEvent {
    pub fn into_event(self, id: EventId) -> Event {
        Event {
            id,
            agent_id: self.agent_id,
            user_id: self.user_id,
            payload: self.payload,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// Sort events into delivery order and drop duplicate ids.
pub fn into_delivery_batch(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by(Event::delivery_order);
    let mut seen = std::collections::HashSet::with_capacity(events.len());
    events.retain(|e| seen.insert(e.id));
    events
}
