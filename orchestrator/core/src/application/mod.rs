// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent;
pub mod lifecycle;

pub mod cursor;
pub mod dispatcher;
pub mod worker_pool;
pub mod scheduler;
pub mod propagator;
pub mod health;
pub mod housekeeping;

pub mod engine;
pub mod repository_factory;

// Re-export the services for convenience
pub use agent::{AgentLifecycleService, CreateAgentRequest, LifecycleError, UpdateAgentRequest};
pub use dispatcher::{DispatchError, ExecutionDispatcher, Invocation, Outcome, RunSummary, SkipReason};
pub use engine::{BackgroundTasks, Engine};
pub use health::{HealthMonitor, HealthReport};
pub use lifecycle::StandardAgentLifecycleService;
pub use propagator::{PropagationReport, Propagator};
pub use scheduler::{ScheduleReport, Scheduler};
