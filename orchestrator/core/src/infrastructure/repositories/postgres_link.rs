// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PostgreSQL `LinkRepository` over the `links` table. The composite primary
//! key `(source_id, receiver_id)` makes link creation idempotent.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::agent::AgentId;
use crate::domain::link::Link;
use crate::domain::repository::{LinkRepository, RepositoryError};

pub struct PostgresLinkRepository {
    pool: PgPool,
}

impl PostgresLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkRepository for PostgresLinkRepository {
    async fn create(&self, link: &Link) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO links (source_id, receiver_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (source_id, receiver_id) DO NOTHING
            "#,
        )
        .bind(link.source_id.0)
        .bind(link.receiver_id.0)
        .bind(link.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to create link: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, source_id: AgentId, receiver_id: AgentId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM links WHERE source_id = $1 AND receiver_id = $2")
            .bind(source_id.0)
            .bind(receiver_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn sources_of(&self, receiver_id: AgentId) -> Result<Vec<AgentId>, RepositoryError> {
        let rows = sqlx::query("SELECT source_id FROM links WHERE receiver_id = $1")
            .bind(receiver_id.0)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| AgentId(row.get("source_id"))).collect())
    }

    async fn receivers_of(&self, source_id: AgentId) -> Result<Vec<AgentId>, RepositoryError> {
        let rows = sqlx::query("SELECT receiver_id FROM links WHERE source_id = $1")
            .bind(source_id.0)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| AgentId(row.get("receiver_id"))).collect())
    }

    async fn list_all(&self) -> Result<Vec<Link>, RepositoryError> {
        let rows = sqlx::query("SELECT source_id, receiver_id, created_at FROM links ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| Link {
                source_id: AgentId(row.get("source_id")),
                receiver_id: AgentId(row.get("receiver_id")),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn delete_for_agent(&self, agent_id: AgentId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM links WHERE source_id = $1 OR receiver_id = $1")
            .bind(agent_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
