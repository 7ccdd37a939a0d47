// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use conduit_core::application::agent::CreateAgentRequest;
use conduit_core::application::engine::Engine;
use conduit_core::application::repository_factory::Repositories;
use conduit_core::domain::agent::{AgentId, RunKind, UserId};
use conduit_core::domain::engine_config::EngineConfigManifest;
use conduit_core::infrastructure::agents::builtin_registry;
use conduit_orchestrator::embedded::EmbeddedExecutor;
use uuid::Uuid;

fn executor() -> EmbeddedExecutor {
    let engine = Engine::new(&EngineConfigManifest::default(), Repositories::in_memory(), builtin_registry()).unwrap();
    EmbeddedExecutor::from_engine(Arc::new(engine))
}

fn id_of(value: &serde_json::Value) -> Uuid {
    value["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_embedded_pipeline() {
    let executor = executor();
    let user = UserId::new();

    let beat = executor
        .create_agent(CreateAgentRequest::new(user, "beat", "heartbeat"))
        .await
        .unwrap();
    let digest = executor
        .create_agent(CreateAgentRequest::new(user, "digest", "digest"))
        .await
        .unwrap();
    let (beat_id, digest_id) = (id_of(&beat), id_of(&digest));

    let link = executor.create_link(beat_id, digest_id).await.unwrap();
    assert_eq!(link["created"], true);
    let again = executor.create_link(beat_id, digest_id).await.unwrap();
    assert_eq!(again["created"], false);

    let run = executor.run_agent(beat_id, RunKind::Check, None).await.unwrap();
    assert_eq!(run["emitted"].as_array().map(Vec::len), Some(1));

    let report = executor.propagate().await.unwrap();
    assert_eq!(report["events_delivered"], 1);
    assert_eq!(report["succeeded"], 1);

    let health = executor.agent_health(digest_id).await.unwrap();
    assert_eq!(health["working"], true);

    let listed = executor.list_agents(Some(user.0)).await.unwrap();
    assert_eq!(listed.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_embedded_errors_surface() {
    let executor = executor();
    let missing = AgentId::new().0;

    assert!(executor.get_agent(missing).await.is_err());
    assert!(executor.delete_link(missing, Uuid::new_v4()).await.is_err());

    let cleanup = executor.cleanup_events().await.unwrap();
    assert_eq!(cleanup["removed"], 0);
}

#[tokio::test]
async fn test_embedded_user_switches() {
    let executor = executor();
    let user = UserId::new();
    executor
        .create_agent(CreateAgentRequest::new(user, "beat", "heartbeat"))
        .await
        .unwrap();

    let body = executor.deactivate_user(user.0).await.unwrap();
    assert_eq!(body["agents"], 1);
    let agents = executor.list_agents(Some(user.0)).await.unwrap();
    assert_eq!(agents[0]["deactivated"], true);

    let body = executor.activate_user(user.0).await.unwrap();
    assert_eq!(body["agents"], 1);
}
