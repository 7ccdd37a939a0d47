// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PostgreSQL `AgentLogRepository` over the `agent_logs` table.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use super::postgres_agent::{event_id_from_db, event_id_to_db};
use crate::domain::agent::AgentId;
use crate::domain::agent_log::{AgentLog, LogLevel, NewAgentLog};
use crate::domain::repository::{AgentLogRepository, RepositoryError};

pub struct PostgresAgentLogRepository {
    pool: PgPool,
}

impl PostgresAgentLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_log(row: &PgRow) -> Result<AgentLog, RepositoryError> {
    let level: String = row.get("level");
    let level = LogLevel::parse(&level)
        .ok_or_else(|| RepositoryError::Serialization(format!("Unknown log level '{}'", level)))?;
    let id: i64 = row.get("id");

    Ok(AgentLog {
        id: id as u64,
        agent_id: AgentId(row.get("agent_id")),
        level,
        message: row.get("message"),
        inbound_event_id: event_id_from_db(row.get("inbound_event_id")),
        outbound_event_id: event_id_from_db(row.get("outbound_event_id")),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl AgentLogRepository for PostgresAgentLogRepository {
    async fn append(&self, log: NewAgentLog) -> Result<AgentLog, RepositoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO agent_logs (agent_id, level, message, inbound_event_id, outbound_event_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(log.agent_id.0)
        .bind(log.level.as_str())
        .bind(&log.message)
        .bind(event_id_to_db(log.inbound_event_id))
        .bind(event_id_to_db(log.outbound_event_id))
        .bind(log.created_at)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.get("id");
        Ok(log.into_log(id as u64))
    }

    async fn find_by_agent(&self, agent_id: AgentId, limit: usize) -> Result<Vec<AgentLog>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, agent_id, level, message, inbound_event_id, outbound_event_id, created_at
            FROM agent_logs
            WHERE agent_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(agent_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_log).collect()
    }

    async fn truncate(&self, agent_id: AgentId, keep: usize) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM agent_logs
            WHERE agent_id = $1
              AND id NOT IN (
                SELECT id FROM agent_logs WHERE agent_id = $1 ORDER BY id DESC LIMIT $2
              )
            "#,
        )
        .bind(agent_id.0)
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_for_agent(&self, agent_id: AgentId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM agent_logs WHERE agent_id = $1")
            .bind(agent_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
