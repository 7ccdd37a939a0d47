// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Conduit core
//!
//! Scheduled execution and event propagation for graphs of agents.
//!
//! # Architecture
//!
//! - **Domain:** agents, links, events, schedules, the agent registry and
//!   repository contracts
//! - **Application:** scheduler, propagator, dispatcher, health and lifecycle
//!   services, wired together by [`application::Engine`]
//! - **Infrastructure:** in-memory and PostgreSQL repositories, the event bus
//!   and the built-in agent types
//! - **Presentation:** the HTTP API

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
