// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer
//!
//! Pure engine types: agents, links, events, logs, schedules, the agent
//! registry, repository contracts and configuration.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Aggregates and persistence contracts, no I/O

pub mod agent;
pub mod agent_log;
pub mod document;
pub mod engine_config;
pub mod event;
pub mod events;
pub mod link;
pub mod registry;
pub mod repository;
pub mod schedule;
