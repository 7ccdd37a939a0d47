// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Health Monitor
//!
//! Derived `working?` status. Nothing here is stored; every call recomputes
//! from the agent's timestamps.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::domain::agent::{Agent, AgentId};
use crate::domain::registry::AgentRegistry;

/// An agent is working unless an error was logged after its latest activity,
/// or it has an expectation window and no activity inside it.
pub fn is_working(agent: &Agent, window: Option<Duration>, now: DateTime<Utc>) -> bool {
    let latest = agent.last_activity_at();

    if let Some(error_at) = agent.last_error_log_at {
        if latest.map_or(true, |at| error_at > at) {
            return false;
        }
    }

    match window {
        None => true,
        Some(window) => latest.map_or(false, |at| now - at <= window),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub agent_id: AgentId,
    pub working: bool,
    /// Window in seconds, when the agent type declares one.
    pub expected_window_seconds: Option<i64>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub last_error_log_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

#[derive(Clone)]
pub struct HealthMonitor {
    registry: Arc<AgentRegistry>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Expectation window for this agent, as declared by its type. Agents of
    /// an unknown type fall back to no window.
    pub fn window(&self, agent: &Agent) -> Option<Duration> {
        self.registry
            .get(agent.agent_type())
            .and_then(|behavior| behavior.expected_window(&agent.options))
    }

    pub fn is_working(&self, agent: &Agent, now: DateTime<Utc>) -> bool {
        is_working(agent, self.window(agent), now)
    }

    pub fn report(&self, agent: &Agent, now: DateTime<Utc>) -> HealthReport {
        let window = self.window(agent);
        HealthReport {
            agent_id: agent.id,
            working: is_working(agent, window, now),
            expected_window_seconds: window.map(|w| w.num_seconds()),
            last_activity_at: agent.last_activity_at(),
            last_error_log_at: agent.last_error_log_at,
            consecutive_failures: agent.consecutive_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::UserId;

    fn agent() -> Agent {
        Agent::new(UserId::new(), "a", "digest")
    }

    #[test]
    fn test_fresh_agent_with_window_is_not_working() {
        let now = Utc::now();
        assert!(!is_working(&agent(), Some(Duration::days(2)), now));
        assert!(is_working(&agent(), None, now));
    }

    #[test]
    fn test_activity_within_window_then_stale() {
        let now = Utc::now();
        let mut a = agent();
        a.last_receive_at = Some(now);
        assert!(is_working(&a, Some(Duration::days(2)), now));
        assert!(is_working(&a, Some(Duration::days(2)), now + Duration::days(2)));
        assert!(!is_working(&a, Some(Duration::days(2)), now + Duration::days(3)));
    }

    #[test]
    fn test_last_event_counts_as_activity() {
        let now = Utc::now();
        let mut a = agent();
        a.last_check_at = Some(now - Duration::days(10));
        a.last_event_at = Some(now - Duration::hours(1));
        assert!(is_working(&a, Some(Duration::days(1)), now));
    }

    #[test]
    fn test_error_after_activity_is_not_working() {
        let now = Utc::now();
        let mut a = agent();
        a.last_check_at = Some(now - Duration::minutes(5));
        a.last_error_log_at = Some(now);
        assert!(!is_working(&a, None, now));

        // A later success resolves the error.
        a.last_check_at = Some(now + Duration::seconds(1));
        assert!(is_working(&a, None, now + Duration::seconds(1)));
    }

    #[test]
    fn test_error_without_any_activity_is_not_working() {
        let mut a = agent();
        a.last_error_log_at = Some(Utc::now());
        assert!(!is_working(&a, None, Utc::now()));
    }
}
