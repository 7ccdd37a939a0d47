// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on the storage backend
//! configured in `conduit-config.yaml`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select in-memory or PostgreSQL persistence at startup

use anyhow::Result;
use std::sync::Arc;

use crate::domain::repository::{
    AgentLogRepository, AgentRepository, EventRepository, LinkRepository, StorageBackend,
};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{
    InMemoryAgentLogRepository, InMemoryAgentRepository, InMemoryEventRepository, InMemoryLinkRepository,
    PostgresAgentLogRepository, PostgresAgentRepository, PostgresEventRepository, PostgresLinkRepository,
};

/// The four stores the engine runs against.
#[derive(Clone)]
pub struct Repositories {
    pub agents: Arc<dyn AgentRepository>,
    pub links: Arc<dyn LinkRepository>,
    pub events: Arc<dyn EventRepository>,
    pub logs: Arc<dyn AgentLogRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            agents: Arc::new(InMemoryAgentRepository::new()),
            links: Arc::new(InMemoryLinkRepository::new()),
            events: Arc::new(InMemoryEventRepository::new()),
            logs: Arc::new(InMemoryAgentLogRepository::new()),
        }
    }

    pub fn postgres(database: &Database) -> Self {
        let pool = database.get_pool().clone();
        Self {
            agents: Arc::new(PostgresAgentRepository::new(pool.clone())),
            links: Arc::new(PostgresLinkRepository::new(pool.clone())),
            events: Arc::new(PostgresEventRepository::new(pool.clone())),
            logs: Arc::new(PostgresAgentLogRepository::new(pool)),
        }
    }
}

/// Creates the repository set for the configured backend, connecting to
/// PostgreSQL when required.
pub async fn create_repositories(backend: &StorageBackend) -> Result<Repositories> {
    match backend {
        StorageBackend::InMemory => Ok(Repositories::in_memory()),
        StorageBackend::PostgreSQL(config) => {
            let database = Database::connect(config).await?;
            Ok(Repositories::postgres(&database))
        }
    }
}
