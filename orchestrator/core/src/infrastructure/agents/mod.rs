// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Built-in Agent Types
//
// Behaviors shipped with the engine. Additional types are registered by the
// embedding application through `AgentRegistry::register`.

pub mod digest;
pub mod heartbeat;
pub mod relay;

use std::sync::Arc;

use crate::domain::registry::AgentRegistry;

pub use digest::DigestAgent;
pub use heartbeat::HeartbeatAgent;
pub use relay::RelayAgent;

/// Registry pre-populated with every built-in type.
pub fn builtin_registry() -> AgentRegistry {
    AgentRegistry::new()
        .with(Arc::new(DigestAgent::new()))
        .with(Arc::new(HeartbeatAgent::new()))
        .with(Arc::new(RelayAgent::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_keys() {
        let registry = builtin_registry();
        let keys: Vec<String> = registry.descriptors().into_iter().map(|d| d.key).collect();
        assert_eq!(keys, vec!["digest", "heartbeat", "relay"]);
    }
}
