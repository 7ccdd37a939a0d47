// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agents;
pub mod db;
pub mod event_bus;
pub mod repositories;

pub use agents::builtin_registry;
pub use event_bus::{DomainEvent, EventBus};
